//! Role/permission evaluation: ordered access levels per entity, with a
//! configured superadmin role that bypasses explicit grants.

use crate::error::AppError;
use crate::extractors::Session;
use sqlx::PgPool;
use std::fmt;

pub const SUPERADMIN_ROLE_ENV: &str = "APP_SUPERADMIN_ROLE";
pub const DEFAULT_SUPERADMIN_ROLE: &str = "superadmin";

/// Name of the superadmin role, read from the environment at evaluation
/// time so a redeployment with a different role name needs no code change.
pub fn superadmin_role_name() -> String {
    std::env::var(SUPERADMIN_ROLE_ENV).unwrap_or_else(|_| DEFAULT_SUPERADMIN_ROLE.into())
}

/// Access levels, ordered exactly like the access_level_enum database type:
/// a grant at one level satisfies requests at that level or below.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    Read,
    Write,
}

impl AccessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(AccessLevel::Read),
            "write" => Some(AccessLevel::Write),
            _ => None,
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const IS_SUPERADMIN_ROLE_SQL: &str =
    "SELECT EXISTS(SELECT 1 FROM app_role WHERE id = $1 AND name = $2)";

const HAS_GRANT_SQL: &str = "SELECT EXISTS( \
        SELECT 1 FROM app_role_entity_permission rp \
        JOIN entity_permission p ON p.id = rp.permission_id \
        WHERE rp.role_id = $1 AND p.entity = $2 \
          AND p.access_level >= $3::access_level_enum)";

/// Whether the role is the configured superadmin role.
pub async fn is_superadmin_role(pool: &PgPool, role_id: i64) -> Result<bool, AppError> {
    let is_super = sqlx::query_scalar::<_, bool>(IS_SUPERADMIN_ROLE_SQL)
        .bind(role_id)
        .bind(superadmin_role_name())
        .fetch_one(pool)
        .await?;
    Ok(is_super)
}

/// Whether the role may act on the entity at the given level. The superadmin
/// role short-circuits without a grant lookup; otherwise a grant row with an
/// equal-or-higher level must exist.
pub async fn is_authorized(
    pool: &PgPool,
    role_id: i64,
    entity: &str,
    level: AccessLevel,
) -> Result<bool, AppError> {
    if is_superadmin_role(pool, role_id).await? {
        return Ok(true);
    }
    let granted = sqlx::query_scalar::<_, bool>(HAS_GRANT_SQL)
        .bind(role_id)
        .bind(entity)
        .bind(level.as_str())
        .fetch_one(pool)
        .await?;
    tracing::debug!(role_id, entity = %entity, level = %level, granted, "permission check");
    Ok(granted)
}

/// Guard form of `is_authorized` for a held session. The session's
/// superadmin flag was resolved at login; non-superadmin roles are
/// re-evaluated here so grant changes take effect immediately.
pub async fn ensure_entity_access(
    pool: &PgPool,
    session: &Session,
    entity: &str,
    level: AccessLevel,
) -> Result<(), AppError> {
    if session.is_superadmin {
        return Ok(());
    }
    if is_authorized(pool, session.role_id, entity, level).await? {
        return Ok(());
    }
    Err(AppError::Unauthorized(format!(
        "{} access to '{}' denied",
        level, entity
    )))
}
