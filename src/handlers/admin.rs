//! Table administration handlers: the registry listing and generic row
//! CRUD over registered tables.

use crate::catalog::PgCatalog;
use crate::error::AppError;
use crate::extractors::Session;
use crate::response;
use crate::service::RowService;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::collections::HashMap;

fn body_to_map(value: Value) -> Result<HashMap<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m.into_iter().collect()),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

/// GET /tables — every registered table with its label. Superadmin only;
/// other roles see per-table permissions, not the whole allow-list.
pub async fn tables(
    session: Session,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    session.require_superadmin()?;
    let entries: Vec<Value> = state
        .registry
        .entries()
        .map(|(name, label)| json!({ "name": name, "label": label }))
        .collect();
    Ok(response::success_many(entries))
}

/// GET /tables/:table/rows — all rows, ordered by primary key.
pub async fn list_rows(
    session: Session,
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let catalog = PgCatalog::new(state.pool.clone());
    let data = RowService::list(&state.pool, &catalog, &state.registry, &session, &table).await?;
    let count = data.rows.len() as u64;
    Ok(response::success_one_with_meta(data, json!({ "count": count })))
}

/// GET /tables/:table/form — editable columns plus foreign-key and enum
/// choice lists for building a row form.
pub async fn row_form(
    session: Session,
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let catalog = PgCatalog::new(state.pool.clone());
    let plan =
        RowService::form_plan(&state.pool, &catalog, &state.registry, &session, &table).await?;
    Ok(response::success_one_ok(plan))
}

/// POST /tables/:table/rows — insert one row from submitted fields.
pub async fn insert_row(
    session: Session,
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let fields = body_to_map(body)?;
    let catalog = PgCatalog::new(state.pool.clone());
    let id =
        RowService::insert(&state.pool, &catalog, &state.registry, &session, &table, &fields)
            .await?;
    Ok(response::success_one(json!({ "id": id })))
}

/// PUT /tables/:table/rows/:id — replace every editable column.
pub async fn update_row(
    session: Session,
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let fields = body_to_map(body)?;
    let catalog = PgCatalog::new(state.pool.clone());
    RowService::update(&state.pool, &catalog, &state.registry, &session, &table, &id, &fields)
        .await?;
    Ok(response::success_message("row updated"))
}

/// DELETE /tables/:table/rows/:id
pub async fn delete_row(
    session: Session,
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let catalog = PgCatalog::new(state.pool.clone());
    RowService::delete(&state.pool, &catalog, &state.registry, &session, &table, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
