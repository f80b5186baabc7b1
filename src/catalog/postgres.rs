//! PostgreSQL catalog backend: information_schema plus pg_catalog for the
//! pieces information_schema does not carry or gets wrong (pk introspection,
//! foreign-key targets, enum labels).

use crate::catalog::{Catalog, ColumnDescriptor, ForeignKeyRef};
use crate::error::AppError;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;

// information_schema exposes domain types (sql_identifier, yes_or_no, ...);
// everything is cast to text so decoding stays uniform.
const COLUMNS_SQL: &str = "SELECT column_name::text AS column_name, \
        data_type::text AS data_type, \
        is_nullable::text AS is_nullable, \
        column_default::text AS column_default, \
        udt_name::text AS udt_name, \
        is_identity::text AS is_identity \
     FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = $1::text \
     ORDER BY ordinal_position";

const PRIMARY_KEY_SQL: &str = "SELECT a.attname::text AS attname \
     FROM pg_index i \
     JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
     WHERE i.indrelid = to_regclass($1::text) AND i.indisprimary \
     ORDER BY a.attnum";

// Constraint names are only unique per table, so the information_schema
// constraint views cannot tell same-named constraints apart. pg_constraint
// keys on oids and has no such ambiguity; conkey/confkey pair the
// constrained columns with their referenced columns positionally.
const FOREIGN_KEYS_SQL: &str = "SELECT att.attname::text AS column_name, \
        ref_cl.relname::text AS ref_table, \
        ref_att.attname::text AS ref_column \
     FROM pg_constraint con \
     CROSS JOIN LATERAL unnest(con.conkey, con.confkey) AS cols(attnum, ref_attnum) \
     JOIN pg_attribute att \
       ON att.attrelid = con.conrelid AND att.attnum = cols.attnum \
     JOIN pg_class ref_cl ON ref_cl.oid = con.confrelid \
     JOIN pg_attribute ref_att \
       ON ref_att.attrelid = con.confrelid AND ref_att.attnum = cols.ref_attnum \
     WHERE con.contype = 'f' AND con.conrelid = to_regclass($1::text) \
     ORDER BY att.attname, con.conname";

const ENUM_LABELS_SQL: &str = "SELECT e.enumlabel::text AS enumlabel \
     FROM pg_enum e \
     JOIN pg_type t ON t.oid = e.enumtypid \
     WHERE t.typname = $1::text \
     ORDER BY e.enumsortorder";

#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, AppError> {
        let rows = sqlx::query(COLUMNS_SQL).bind(table).fetch_all(&self.pool).await?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push(ColumnDescriptor {
                name: row.try_get("column_name")?,
                data_type: row.try_get("data_type")?,
                is_nullable: row.try_get::<String, _>("is_nullable")? == "YES",
                default_expr: row.try_get::<Option<String>, _>("column_default")?,
                udt_name: row.try_get("udt_name")?,
                is_identity: row.try_get::<String, _>("is_identity")? == "YES",
            });
        }
        tracing::debug!(table = %table, count = columns.len(), "catalog columns");
        Ok(columns)
    }

    async fn primary_key(&self, table: &str) -> Result<Option<String>, AppError> {
        // to_regclass returns NULL for unknown tables, so this degrades to
        // "no primary key" instead of failing.
        let pk = sqlx::query_scalar::<_, String>(PRIMARY_KEY_SQL)
            .bind(table)
            .fetch_optional(&self.pool)
            .await?;
        Ok(pk)
    }

    async fn foreign_keys(&self, table: &str) -> Result<HashMap<String, ForeignKeyRef>, AppError> {
        let rows = sqlx::query(FOREIGN_KEYS_SQL).bind(table).fetch_all(&self.pool).await?;
        let mut fks: HashMap<String, ForeignKeyRef> = HashMap::new();
        for row in rows {
            let column: String = row.try_get("column_name")?;
            // First constraint wins when a column somehow carries several.
            fks.entry(column).or_insert(ForeignKeyRef {
                ref_table: row.try_get("ref_table")?,
                ref_column: row.try_get("ref_column")?,
            });
        }
        Ok(fks)
    }

    fn supports_enum_labels(&self) -> bool {
        true
    }

    async fn enum_labels(&self, type_name: &str) -> Result<Vec<String>, AppError> {
        let labels = sqlx::query_scalar::<_, String>(ENUM_LABELS_SQL)
            .bind(type_name)
            .fetch_all(&self.pool)
            .await?;
        Ok(labels)
    }
}
