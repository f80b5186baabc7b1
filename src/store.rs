//! Core-table DDL and account/permission bootstrap. Everything here is
//! idempotent so it can run on every boot.

use crate::auth::AuthService;
use crate::authz::superadmin_role_name;
use crate::catalog::Catalog;
use crate::error::AppError;
use crate::registry::TableRegistry;
use serde::Serialize;
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::str::FromStr;

const CREATE_ACCESS_LEVEL_ENUM: &str = "CREATE TYPE access_level_enum AS ENUM ('read', 'write')";

const CORE_TABLE_DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS app_role (
        id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
        name VARCHAR(64) NOT NULL UNIQUE,
        description VARCHAR(255)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS app_user (
        id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
        username VARCHAR(64) NOT NULL UNIQUE,
        password_hash VARCHAR(255) NOT NULL,
        role_id BIGINT NOT NULL REFERENCES app_role (id),
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS entity_permission (
        id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
        name VARCHAR(128) NOT NULL UNIQUE,
        entity VARCHAR(64) NOT NULL,
        access_level access_level_enum NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS app_role_entity_permission (
        role_id BIGINT NOT NULL REFERENCES app_role (id) ON DELETE CASCADE,
        permission_id BIGINT NOT NULL REFERENCES entity_permission (id) ON DELETE CASCADE,
        PRIMARY KEY (role_id, permission_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reader (
        library_card_number VARCHAR(15) PRIMARY KEY,
        user_id BIGINT NOT NULL UNIQUE REFERENCES app_user (id) ON DELETE CASCADE
    )
    "#,
];

/// Roles created on every boot. The superadmin role is not listed here; it
/// is created only when an account for it is provisioned.
const SEED_ROLES: &[(&str, &str)] = &[
    ("reader", "Self-registered library visitor"),
    ("worker", "Front-desk staff"),
    ("admin", "Catalog administrator"),
];

const INSERT_ROLE_SQL: &str =
    "INSERT INTO app_role (name, description) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING";

const UPSERT_SUPERADMIN_USER_SQL: &str = r#"
    INSERT INTO app_user (username, password_hash, role_id)
    VALUES ($1, $2, (SELECT id FROM app_role WHERE name = $3))
    ON CONFLICT (username) DO UPDATE
        SET password_hash = EXCLUDED.password_hash, role_id = EXCLUDED.role_id
"#;

const UPSERT_PERMISSION_SQL: &str = r#"
    INSERT INTO entity_permission (name, entity, access_level)
    VALUES ($1, $2, $3::access_level_enum)
    ON CONFLICT (name) DO UPDATE
        SET entity = EXCLUDED.entity, access_level = EXCLUDED.access_level
"#;

const ORPHAN_PERMISSIONS_SQL: &str = r#"
    SELECT id, name, entity, access_level::text
    FROM entity_permission
    WHERE NOT (entity = ANY($1)) OR NOT (access_level::text = ANY($2))
    ORDER BY entity, access_level
"#;

const DELETE_PERMISSIONS_SQL: &str = "DELETE FROM entity_permission WHERE id = ANY($1)";

/// Create the access-level enum, the account/permission tables and the seed
/// roles if they are not already present.
pub async fn ensure_core_tables(pool: &PgPool) -> Result<(), AppError> {
    // CREATE TYPE has no IF NOT EXISTS; on reboot the duplicate_object error
    // is ignored and the existing type is used as-is.
    let _ = sqlx::query(CREATE_ACCESS_LEVEL_ENUM).execute(pool).await;

    for ddl in CORE_TABLE_DDL {
        sqlx::query(ddl).execute(pool).await?;
    }
    for (name, description) in SEED_ROLES {
        sqlx::query(INSERT_ROLE_SQL)
            .bind(name)
            .bind(description)
            .execute(pool)
            .await?;
    }
    tracing::info!("core tables ready");
    Ok(())
}

/// Create or refresh the superadmin account: the role row (named from
/// `APP_SUPERADMIN_ROLE`) plus a user bound to it. An existing user with the
/// same name gets its password and role overwritten.
pub async fn ensure_superadmin(
    pool: &PgPool,
    username: &str,
    password: &str,
) -> Result<(), AppError> {
    let role = superadmin_role_name();
    let password_hash = AuthService::hash_password(password)?;

    let mut tx = pool.begin().await?;
    sqlx::query(INSERT_ROLE_SQL)
        .bind(&role)
        .bind("Unrestricted access")
        .execute(&mut *tx)
        .await?;
    sqlx::query(UPSERT_SUPERADMIN_USER_SQL)
        .bind(username)
        .bind(&password_hash)
        .bind(&role)
        .execute(&mut *tx)
        .await
        .map_err(AppError::classify_db)?;
    tx.commit().await?;
    tracing::info!(user = %username, role = %role, "superadmin account ensured");
    Ok(())
}

/// Upsert one permission row per (registered table x access level), named
/// "<Label> <Level>" (e.g. "Books Write"). Levels come from the database's
/// own enum, so adding a label there extends the grid on the next sync.
/// Returns the number of rows written.
pub async fn sync_permissions<C: Catalog>(
    pool: &PgPool,
    catalog: &C,
    registry: &TableRegistry,
) -> Result<u64, AppError> {
    let levels = catalog.enum_labels("access_level_enum").await?;
    if levels.is_empty() {
        tracing::warn!("access_level_enum has no labels; permission sync skipped");
        return Ok(0);
    }
    let mut count = 0u64;
    for (table, label) in registry.entries() {
        for level in &levels {
            sqlx::query(UPSERT_PERMISSION_SQL)
                .bind(permission_name(label, level))
                .bind(table)
                .bind(level)
                .execute(pool)
                .await?;
            count += 1;
        }
    }
    tracing::info!(count, "permission catalog synced");
    Ok(count)
}

/// Permission row left behind by a registry or enum change.
#[derive(Debug, Serialize)]
pub struct OrphanPermission {
    pub id: i64,
    pub name: String,
    pub entity: String,
    pub access_level: String,
}

/// Find permissions whose entity is no longer registered or whose level is
/// no longer an enum label, and delete them unless `dry_run`. Role links go
/// with them via ON DELETE CASCADE. Returns the affected rows either way.
/// Refuses to sweep when the registry or the enum comes back empty.
pub async fn clear_orphan_permissions<C: Catalog>(
    pool: &PgPool,
    catalog: &C,
    registry: &TableRegistry,
    dry_run: bool,
) -> Result<Vec<OrphanPermission>, AppError> {
    if registry.is_empty() {
        // A missing registry file loads as an empty registry, which would
        // mark every permission orphaned; refuse to sweep on that signal.
        tracing::warn!("table registry is empty; orphan sweep skipped");
        return Ok(Vec::new());
    }
    let levels = catalog.enum_labels("access_level_enum").await?;
    if levels.is_empty() {
        // A missing enum would mark every permission orphaned; refuse to
        // sweep on that signal.
        tracing::warn!("access_level_enum has no labels; orphan sweep skipped");
        return Ok(Vec::new());
    }
    let tables = registry.table_names();
    let rows: Vec<(i64, String, String, String)> = sqlx::query_as(ORPHAN_PERMISSIONS_SQL)
        .bind(&tables)
        .bind(&levels)
        .fetch_all(pool)
        .await?;
    let orphans: Vec<OrphanPermission> = rows
        .into_iter()
        .map(|(id, name, entity, access_level)| OrphanPermission {
            id,
            name,
            entity,
            access_level,
        })
        .collect();
    if orphans.is_empty() || dry_run {
        return Ok(orphans);
    }
    let ids: Vec<i64> = orphans.iter().map(|p| p.id).collect();
    sqlx::query(DELETE_PERMISSIONS_SQL)
        .bind(&ids)
        .execute(pool)
        .await?;
    tracing::info!(count = orphans.len(), "orphan permissions removed");
    Ok(orphans)
}

/// Human-facing permission name: registry label plus title-cased level.
fn permission_name(label: &str, level: &str) -> String {
    format!("{} {}", label, title_case(level))
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Ensure the database in `database_url` exists; create it if not. Connects
/// to the default `postgres` database to run CREATE DATABASE. Call before
/// creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await.map_err(AppError::Db)?;
    let exists: (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&db_name)
            .fetch_one(&mut conn)
            .await
            .map_err(AppError::Db)?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await
            .map_err(AppError::Db)?;
        tracing::info!(database = %db_name, "database created");
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = format!("{}postgres", base);
    Ok((admin_url, db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
