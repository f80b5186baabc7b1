//! Lectern: catalog-driven table administration for a library backend.
//!
//! Table shapes are introspected from PostgreSQL at request time; generic
//! row operations, form planning and role permissions all work off that
//! live shape, restricted to an allow-list of registered tables.

pub mod auth;
pub mod authz;
pub mod catalog;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod planner;
pub mod registry;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use auth::{AuthService, RegisteredUser};
pub use authz::{ensure_entity_access, superadmin_role_name, AccessLevel};
pub use catalog::{Catalog, ColumnDescriptor, PgCatalog, TableDescriptor};
pub use error::{AppError, ConfigError};
pub use extractors::Session;
pub use planner::{editable_columns, plan, FormPlan};
pub use registry::{registry_path, TableRegistry};
pub use response::{success_many, success_one};
pub use routes::{admin_routes, auth_routes, common_routes, common_routes_with_ready};
pub use service::{RowService, TableData};
pub use state::AppState;
pub use store::{
    clear_orphan_permissions, ensure_core_tables, ensure_database_exists, ensure_superadmin,
    sync_permissions,
};
