//! HTTP handlers for account endpoints and table administration.

pub mod admin;
pub mod auth;
pub use admin::*;
pub use auth::*;
