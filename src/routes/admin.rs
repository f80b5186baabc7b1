//! Table administration routes. Handlers receive the table name as a path
//! segment and run the full guard chain before touching it.

use crate::handlers::admin::{delete_row, insert_row, list_rows, row_form, tables, update_row};
use crate::state::AppState;
use axum::{routing::get, routing::put, Router};

pub fn admin_routes(state: AppState) -> Router {
    Router::new()
        .route("/tables", get(tables))
        .route("/tables/:table/rows", get(list_rows).post(insert_row))
        .route("/tables/:table/form", get(row_form))
        .route("/tables/:table/rows/:id", put(update_row).delete(delete_row))
        .with_state(state)
}
