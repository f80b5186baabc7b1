//! Generic row operations over allow-listed tables.
//!
//! Every operation runs the same guard chain: the caller's session was
//! already extracted (missing session never gets this far), then the
//! permission check, then the registry allow-list, and only then does the
//! table name reach a query as an identifier.

use crate::authz::{self, AccessLevel};
use crate::catalog::{Catalog, ColumnDescriptor, PkKind, TableDescriptor};
use crate::error::AppError;
use crate::extractors::Session;
use crate::planner;
use crate::registry::TableRegistry;
use crate::sql::{self, PgBindValue};
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;

/// One table's rows plus enough shape to render them.
#[derive(Debug, Serialize)]
pub struct TableData {
    pub table: String,
    pub label: String,
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
}

pub struct RowService;

impl RowService {
    /// Full unfiltered listing, ordered by the primary key when one exists.
    pub async fn list<C: Catalog>(
        pool: &PgPool,
        catalog: &C,
        registry: &TableRegistry,
        session: &Session,
        table: &str,
    ) -> Result<TableData, AppError> {
        let desc = Self::guard(pool, catalog, registry, session, table, AccessLevel::Read).await?;
        let q = sql::select_rows(&desc);
        tracing::debug!(sql = %q.sql, "query");
        let rows = sqlx::query(&q.sql).fetch_all(pool).await?;
        Ok(TableData {
            table: desc.table.clone(),
            label: registry.label(table).unwrap_or(table).to_string(),
            columns: desc.columns.iter().map(|c| c.name.clone()).collect(),
            rows: rows.iter().map(sql::decode_row).collect(),
        })
    }

    /// Form plan for a table: editable columns plus choice lists. Guarded
    /// at read level, same as listing.
    pub async fn form_plan<C: Catalog>(
        pool: &PgPool,
        catalog: &C,
        registry: &TableRegistry,
        session: &Session,
        table: &str,
    ) -> Result<planner::FormPlan, AppError> {
        let desc = Self::guard(pool, catalog, registry, session, table, AccessLevel::Read).await?;
        planner::plan(pool, catalog, &desc).await
    }

    /// Insert one row from submitted field values. Blank values are dropped
    /// so column defaults apply; returns the new primary key value, or None
    /// for a table without one.
    pub async fn insert<C: Catalog>(
        pool: &PgPool,
        catalog: &C,
        registry: &TableRegistry,
        session: &Session,
        table: &str,
        fields: &HashMap<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        let desc = Self::guard(pool, catalog, registry, session, table, AccessLevel::Write).await?;
        let editable = planner::editable_columns(&desc);
        let values = retained_values(&editable, fields);
        let q = sql::insert(&desc, &values);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let query = bind_all(&q.sql, &q.params);
        if desc.primary_key.is_some() {
            let row = query.fetch_one(pool).await.map_err(AppError::classify_db)?;
            Ok(Some(sql::decode_cell(&row, 0)))
        } else {
            query.execute(pool).await.map_err(AppError::classify_db)?;
            Ok(None)
        }
    }

    /// Replace every editable column of one row in a single statement.
    /// Blank or missing fields become explicit NULL; forms post the full
    /// field set.
    pub async fn update<C: Catalog>(
        pool: &PgPool,
        catalog: &C,
        registry: &TableRegistry,
        session: &Session,
        table: &str,
        row_id: &str,
        fields: &HashMap<String, Value>,
    ) -> Result<(), AppError> {
        let desc = Self::guard(pool, catalog, registry, session, table, AccessLevel::Write).await?;
        let pk = require_pk(&desc)?;
        let id = parse_row_id(&desc, row_id)?;
        let editable = planner::editable_columns(&desc);
        let sets = full_row_values(&editable, fields);
        if sets.is_empty() {
            return Err(AppError::Validation(format!(
                "table '{}' has no editable columns",
                table
            )));
        }
        let q = sql::update_all(&desc, &pk, &sets, id);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let result = bind_all(&q.sql, &q.params)
            .execute(pool)
            .await
            .map_err(AppError::classify_db)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("row '{}' in '{}'", row_id, table)));
        }
        Ok(())
    }

    /// Delete one row by primary key. Related-row cleanup is the schema's
    /// cascade rules, not ours.
    pub async fn delete<C: Catalog>(
        pool: &PgPool,
        catalog: &C,
        registry: &TableRegistry,
        session: &Session,
        table: &str,
        row_id: &str,
    ) -> Result<(), AppError> {
        let desc = Self::guard(pool, catalog, registry, session, table, AccessLevel::Write).await?;
        let pk = require_pk(&desc)?;
        let id = parse_row_id(&desc, row_id)?;
        let q = sql::delete_by_pk(&desc, &pk, id);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let result = bind_all(&q.sql, &q.params)
            .execute(pool)
            .await
            .map_err(AppError::classify_db)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("row '{}' in '{}'", row_id, table)));
        }
        Ok(())
    }

    /// Shared guard chain: permission first (session holders get a clean
    /// 403), then the allow-list, then introspection. The permission query
    /// only ever binds the table name as a value.
    async fn guard<C: Catalog>(
        pool: &PgPool,
        catalog: &C,
        registry: &TableRegistry,
        session: &Session,
        table: &str,
        level: AccessLevel,
    ) -> Result<TableDescriptor, AppError> {
        authz::ensure_entity_access(pool, session, table, level).await?;
        if !registry.contains(table) {
            return Err(AppError::NotFound(format!("table '{}' is not registered", table)));
        }
        let desc = catalog.describe(table).await?;
        if desc.is_empty() {
            return Err(AppError::NotFound(format!("table '{}' does not exist", table)));
        }
        Ok(desc)
    }
}

fn bind_all<'q>(
    sql_text: &'q str,
    params: &'q [Value],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    let mut query = sqlx::query(sql_text);
    for p in params {
        query = query.bind(PgBindValue::from_json(p));
    }
    query
}

fn require_pk(desc: &TableDescriptor) -> Result<String, AppError> {
    desc.primary_key.clone().ok_or_else(|| {
        AppError::SchemaIntegrity(format!("table '{}' has no primary key", desc.table))
    })
}

fn parse_row_id(desc: &TableDescriptor, raw: &str) -> Result<Value, AppError> {
    match desc.pk_kind() {
        Some(PkKind::Int) => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| AppError::BadRequest(format!("invalid row id '{}'", raw))),
        Some(PkKind::Uuid) => uuid::Uuid::parse_str(raw.trim())
            .map(|u| Value::String(u.to_string()))
            .map_err(|_| AppError::BadRequest(format!("invalid row id '{}'", raw))),
        Some(PkKind::Text) | None => Ok(Value::String(raw.to_string())),
    }
}

/// Form blanks: JSON null or the empty string.
fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Insert shape: editable columns with a non-blank submitted value, in
/// column order. Keys outside the editable set are ignored.
fn retained_values(
    editable: &[ColumnDescriptor],
    fields: &HashMap<String, Value>,
) -> Vec<(String, Value)> {
    editable
        .iter()
        .filter_map(|c| {
            fields
                .get(&c.name)
                .filter(|v| !is_blank(v))
                .map(|v| (c.name.clone(), v.clone()))
        })
        .collect()
}

/// Update shape: every editable column, blanks and omissions as NULL.
fn full_row_values(
    editable: &[ColumnDescriptor],
    fields: &HashMap<String, Value>,
) -> Vec<(String, Value)> {
    editable
        .iter()
        .map(|c| {
            let v = fields
                .get(&c.name)
                .filter(|v| !is_blank(v))
                .cloned()
                .unwrap_or(Value::Null);
            (c.name.clone(), v)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_column;
    use serde_json::json;

    fn editable() -> Vec<ColumnDescriptor> {
        vec![
            test_column("title", "varchar", false),
            test_column("author_id", "int8", false),
            test_column("status", "book_status_enum", false),
        ]
    }

    #[test]
    fn blank_is_null_or_empty_string() {
        assert!(is_blank(&Value::Null));
        assert!(is_blank(&json!("")));
        assert!(!is_blank(&json!(" ")));
        assert!(!is_blank(&json!(0)));
        assert!(!is_blank(&json!(false)));
    }

    #[test]
    fn insert_values_drop_blanks_and_unknown_keys() {
        let mut fields = HashMap::new();
        fields.insert("title".to_string(), json!("Dune"));
        fields.insert("author_id".to_string(), json!(""));
        fields.insert("id".to_string(), json!(99));
        fields.insert("evil".to_string(), json!("x"));
        let values = retained_values(&editable(), &fields);
        assert_eq!(values, vec![("title".to_string(), json!("Dune"))]);
    }

    #[test]
    fn update_values_cover_all_editable_columns() {
        let mut fields = HashMap::new();
        fields.insert("title".to_string(), json!("Dune"));
        fields.insert("status".to_string(), json!(""));
        let values = full_row_values(&editable(), &fields);
        assert_eq!(
            values,
            vec![
                ("title".to_string(), json!("Dune")),
                ("author_id".to_string(), Value::Null),
                ("status".to_string(), Value::Null),
            ]
        );
    }

    #[test]
    fn row_ids_parse_by_pk_kind() {
        let int_desc = TableDescriptor {
            table: "book".into(),
            columns: vec![test_column("id", "int8", true)],
            primary_key: Some("id".into()),
            foreign_keys: HashMap::new(),
        };
        assert_eq!(parse_row_id(&int_desc, "7").unwrap(), json!(7));
        assert!(matches!(
            parse_row_id(&int_desc, "seven"),
            Err(AppError::BadRequest(_))
        ));

        let text_desc = TableDescriptor {
            table: "reader".into(),
            columns: vec![test_column("library_card_number", "varchar", false)],
            primary_key: Some("library_card_number".into()),
            foreign_keys: HashMap::new(),
        };
        assert_eq!(
            parse_row_id(&text_desc, "000000000000042").unwrap(),
            json!("000000000000042")
        );

        let uuid_desc = TableDescriptor {
            table: "loan".into(),
            columns: vec![test_column("id", "uuid", false)],
            primary_key: Some("id".into()),
            foreign_keys: HashMap::new(),
        };
        assert!(parse_row_id(&uuid_desc, "not-a-uuid").is_err());
        assert_eq!(
            parse_row_id(&uuid_desc, "4b6e7c2a-9df1-4c9a-8a6e-2f8d9f1b0c3d").unwrap(),
            json!("4b6e7c2a-9df1-4c9a-8a6e-2f8d9f1b0c3d")
        );
    }

    #[test]
    fn missing_pk_is_a_schema_integrity_error() {
        let desc = TableDescriptor {
            table: "audit_log".into(),
            columns: vec![test_column("note", "text", false)],
            primary_key: None,
            foreign_keys: HashMap::new(),
        };
        assert!(matches!(
            require_pk(&desc),
            Err(AppError::SchemaIntegrity(_))
        ));
    }
}
