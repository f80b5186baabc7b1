//! Account service: credential verification and registration.
//!
//! Produces `Session` values; transporting them (cookies, tokens) is the
//! embedding server's job.

use crate::authz;
use crate::error::AppError;
use crate::extractors::Session;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use password_hash::SaltString;
use rand_core::OsRng;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Row, Transaction};

/// Role assigned when registration does not name one. Reader-role users get
/// a library card.
pub const DEFAULT_ROLE: &str = "reader";

const USER_BY_NAME_SQL: &str =
    "SELECT id, username, password_hash, role_id, is_active FROM app_user WHERE username = $1";

const ROLE_ID_SQL: &str = "SELECT id FROM app_role WHERE name = $1";

const INSERT_USER_SQL: &str =
    "INSERT INTO app_user (username, password_hash, role_id) VALUES ($1, $2, $3) RETURNING id";

const LAST_CARD_SQL: &str =
    "SELECT library_card_number FROM reader ORDER BY library_card_number DESC LIMIT 1";

const INSERT_READER_SQL: &str =
    "INSERT INTO reader (library_card_number, user_id) VALUES ($1, $2)";

#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub user_id: i64,
    pub username: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_card_number: Option<String>,
}

pub struct AuthService;

impl AuthService {
    /// Hash a plaintext password with Argon2id + a random salt.
    pub fn hash_password(password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Validation(format!("password hash: {}", e)))?
            .to_string();
        Ok(hash)
    }

    /// Constant answer shape: an unparseable stored hash verifies as false,
    /// indistinguishable from a wrong password.
    pub fn verify_password(password: &str, stored_hash: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Verify credentials and build the session. Unknown users, inactive
    /// users and wrong passwords all fail identically.
    pub async fn login(pool: &PgPool, username: &str, password: &str) -> Result<Session, AppError> {
        let row = sqlx::query(USER_BY_NAME_SQL)
            .bind(username)
            .fetch_optional(pool)
            .await?;
        let Some(row) = row else {
            return Err(Self::invalid_credentials());
        };
        let is_active: bool = row.try_get("is_active")?;
        let stored_hash: String = row.try_get("password_hash")?;
        if !is_active || !Self::verify_password(password, &stored_hash) {
            return Err(Self::invalid_credentials());
        }
        let role_id: i64 = row.try_get("role_id")?;
        let is_superadmin = authz::is_superadmin_role(pool, role_id).await?;
        Ok(Session {
            user_id: row.try_get("id")?,
            username: row.try_get("username")?,
            role_id,
            is_superadmin,
        })
    }

    /// Create an account under the named role (default `reader`). Reader
    /// accounts get the next library card in the same transaction, so a
    /// failed card insert leaves no orphan user.
    pub async fn register(
        pool: &PgPool,
        username: &str,
        password: &str,
        role: Option<&str>,
    ) -> Result<RegisteredUser, AppError> {
        let username = username.trim();
        validate_credentials(username, password)?;
        let role = role.unwrap_or(DEFAULT_ROLE);
        let password_hash = Self::hash_password(password)?;

        let mut tx = pool.begin().await?;
        let role_id = sqlx::query_scalar::<_, i64>(ROLE_ID_SQL)
            .bind(role)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{}'", role)))?;
        let user_id = sqlx::query_scalar::<_, i64>(INSERT_USER_SQL)
            .bind(username)
            .bind(&password_hash)
            .bind(role_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::classify_db)?;
        let library_card_number = if role == DEFAULT_ROLE {
            let card = next_card_number(&mut tx).await?;
            sqlx::query(INSERT_READER_SQL)
                .bind(&card)
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .map_err(AppError::classify_db)?;
            Some(card)
        } else {
            None
        };
        tx.commit().await?;
        tracing::debug!(user = %username, role = %role, "registered account");
        Ok(RegisteredUser {
            user_id,
            username: username.to_string(),
            role: role.to_string(),
            library_card_number,
        })
    }

    fn invalid_credentials() -> AppError {
        AppError::Unauthenticated("invalid credentials".into())
    }
}

pub fn validate_credentials(username: &str, password: &str) -> Result<(), AppError> {
    if username.is_empty() {
        return Err(AppError::Validation("username must not be empty".into()));
    }
    if password.len() < 8 {
        return Err(AppError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

async fn next_card_number(tx: &mut Transaction<'_, Postgres>) -> Result<String, AppError> {
    let last = sqlx::query_scalar::<_, String>(LAST_CARD_SQL)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(next_card_after(last.as_deref()))
}

/// Library cards are a 15-digit zero-padded sequence, so lexicographic order
/// on the column matches numeric order.
fn next_card_after(last: Option<&str>) -> String {
    let n = last.and_then(|s| s.parse::<i64>().ok()).unwrap_or(0);
    format!("{:015}", n + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_produces_argon2_phc_string() {
        let hash = AuthService::hash_password("hunter2hunter2").unwrap();
        assert!(hash.starts_with("$argon2"), "got: {}", hash);
    }

    #[test]
    fn hash_is_salted_per_call() {
        let h1 = AuthService::hash_password("same-password").unwrap();
        let h2 = AuthService::hash_password("same-password").unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn verify_round_trips_and_rejects_wrong_password() {
        let hash = AuthService::hash_password("correct horse battery staple").unwrap();
        assert!(AuthService::verify_password("correct horse battery staple", &hash));
        assert!(!AuthService::verify_password("wrong", &hash));
    }

    #[test]
    fn corrupt_stored_hash_verifies_false() {
        assert!(!AuthService::verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn card_numbers_are_padded_and_sequential() {
        assert_eq!(next_card_after(None), "000000000000001");
        assert_eq!(next_card_after(Some("000000000000041")), "000000000000042");
        assert_eq!(next_card_after(Some("000000000000999")), "000000000001000");
        assert_eq!(next_card_after(None).len(), 15);
    }

    #[test]
    fn credential_validation() {
        assert!(validate_credentials("amy", "long-enough-pw").is_ok());
        assert!(matches!(
            validate_credentials("", "long-enough-pw"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_credentials("amy", "short"),
            Err(AppError::Validation(_))
        ));
    }
}
