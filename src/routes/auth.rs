//! Account routes exposed by the library itself. Login/logout routes are
//! the embedding server's, since it owns session transport.

use crate::handlers::auth::{me, register};
use crate::state::AppState;
use axum::{routing::get, routing::post, Router};

pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/me", get(me))
        .with_state(state)
}
