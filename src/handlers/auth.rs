//! Account handlers: self-registration and session introspection. Login
//! and logout live with the embedding server, which owns session transport.

use crate::auth::AuthService;
use crate::error::AppError;
use crate::extractors::Session;
use crate::response;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct RegisterBody {
    pub username: String,
    pub password: String,
}

/// POST /auth/register — open endpoint. New accounts get the reader role
/// and the next library card.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let user = AuthService::register(&state.pool, &body.username, &body.password, None).await?;
    Ok(response::success_one(user))
}

/// GET /auth/me — the caller's session as the server sees it.
pub async fn me(session: Session) -> impl axum::response::IntoResponse {
    response::success_one_ok(session)
}
