//! Read-only view of the database catalog: table shapes discovered at
//! request time, never cached across requests.

pub mod postgres;

pub use postgres::PgCatalog;

use crate::error::AppError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    /// Default expression as reported by the catalog, when one exists.
    #[serde(rename = "default")]
    pub default_expr: Option<String>,
    /// Underlying type name; drives enum detection and value casts.
    pub udt_name: String,
    /// Database-generated column; never offered for editing.
    pub is_identity: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ForeignKeyRef {
    pub ref_table: String,
    pub ref_column: String,
}

/// Shape of one table at a point in time. Columns keep their physical
/// order; at most one primary-key column is tracked.
#[derive(Clone, Debug, Serialize)]
pub struct TableDescriptor {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: Option<String>,
    pub foreign_keys: HashMap<String, ForeignKeyRef>,
}

impl TableDescriptor {
    pub fn empty(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            primary_key: None,
            foreign_keys: HashMap::new(),
        }
    }

    /// True when the catalog knows nothing about the table.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn pk_column(&self) -> Option<&ColumnDescriptor> {
        self.primary_key.as_deref().and_then(|pk| self.column(pk))
    }

    pub fn pk_kind(&self) -> Option<PkKind> {
        self.pk_column().map(PkKind::infer)
    }
}

/// Primary key kind for parsing path ids into typed binds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkKind {
    Int,
    Uuid,
    Text,
}

impl PkKind {
    pub fn infer(col: &ColumnDescriptor) -> Self {
        match col.udt_name.as_str() {
            "int2" | "int4" | "int8" => PkKind::Int,
            "uuid" => PkKind::Uuid,
            _ => PkKind::Text,
        }
    }
}

/// Catalog access used by the planner, row operations and permission
/// seeding. Implementations must bind table names as values, never splice
/// them into query text.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, AppError>;

    async fn primary_key(&self, table: &str) -> Result<Option<String>, AppError>;

    async fn foreign_keys(&self, table: &str) -> Result<HashMap<String, ForeignKeyRef>, AppError>;

    /// Whether enum label lookup is available. Without it enum choices and
    /// enum-driven permission seeding degrade to empty.
    fn supports_enum_labels(&self) -> bool {
        false
    }

    async fn enum_labels(&self, _type_name: &str) -> Result<Vec<String>, AppError> {
        Ok(Vec::new())
    }

    /// Full shape of one table. Unknown tables yield an empty descriptor,
    /// not an error; callers decide whether that is reportable.
    async fn describe(&self, table: &str) -> Result<TableDescriptor, AppError> {
        let columns = self.table_columns(table).await?;
        if columns.is_empty() {
            return Ok(TableDescriptor::empty(table));
        }
        let primary_key = self.primary_key(table).await?;
        let foreign_keys = self.foreign_keys(table).await?;
        Ok(TableDescriptor {
            table: table.to_string(),
            columns,
            primary_key,
            foreign_keys,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_column(name: &str, udt: &str, identity: bool) -> ColumnDescriptor {
    let data_type = match udt {
        "int2" | "int4" | "int8" => "bigint",
        "varchar" => "character varying",
        "text" => "text",
        "bool" => "boolean",
        "uuid" => "uuid",
        "numeric" => "numeric",
        "timestamptz" => "timestamp with time zone",
        "date" => "date",
        _ => "USER-DEFINED",
    }
    .to_string();
    ColumnDescriptor {
        name: name.to_string(),
        data_type,
        is_nullable: !identity,
        default_expr: None,
        udt_name: udt.to_string(),
        is_identity: identity,
    }
}
