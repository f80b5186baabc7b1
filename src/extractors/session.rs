//! Extract the authenticated session from request extensions.
//!
//! The core never issues cookies or tokens: whoever embeds it authenticates
//! the request (however it likes) and inserts a `Session` extension before
//! the router runs. Handlers just declare a `Session` argument.

use crate::error::AppError;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};

/// Server-held identity established at login and cleared at logout. The
/// role id here is the only input to permission checks; nothing is ever
/// re-derived from client-supplied data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub user_id: i64,
    pub username: String,
    pub role_id: i64,
    /// Resolved against the configured superadmin role at login.
    pub is_superadmin: bool,
}

impl Session {
    /// Guard for superadmin-only surfaces. Runs after extraction, so a
    /// missing session is already a 401 by the time this can return 403.
    pub fn require_superadmin(&self) -> Result<(), AppError> {
        if self.is_superadmin {
            Ok(())
        } else {
            Err(AppError::Unauthorized("superadmin role required".into()))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Unauthenticated("login required".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRequestParts;
    use axum::http::Request;

    fn superadmin() -> Session {
        Session {
            user_id: 1,
            username: "root".into(),
            role_id: 1,
            is_superadmin: true,
        }
    }

    #[tokio::test]
    async fn missing_session_is_unauthenticated() {
        let (mut parts, _) = Request::builder().uri("/tables").body(()).unwrap().into_parts();
        let err = Session::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn present_session_extracts() {
        let (mut parts, _) = Request::builder()
            .uri("/tables")
            .extension(superadmin())
            .body(())
            .unwrap()
            .into_parts();
        let session = Session::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(session.username, "root");
    }

    #[test]
    fn superadmin_guard_rejects_plain_roles() {
        let mut session = superadmin();
        assert!(session.require_superadmin().is_ok());
        session.is_superadmin = false;
        assert!(matches!(
            session.require_superadmin(),
            Err(AppError::Unauthorized(_))
        ));
    }
}
