//! Router construction for the admin, account and common surfaces.

pub mod admin;
pub mod auth;
pub mod common;
pub use admin::admin_routes;
pub use auth::auth_routes;
pub use common::{common_routes, common_routes_with_ready};
