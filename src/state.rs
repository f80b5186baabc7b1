//! Shared application state for all routes.

use crate::registry::TableRegistry;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Immutable after startup; reload means restart.
    pub registry: Arc<TableRegistry>,
}

impl AppState {
    pub fn new(pool: PgPool, registry: TableRegistry) -> Self {
        Self {
            pool,
            registry: Arc::new(registry),
        }
    }
}
