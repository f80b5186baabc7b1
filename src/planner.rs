//! Form planning: which columns a row form offers, and the choice lists
//! behind foreign-key and enum columns.

use crate::catalog::{Catalog, ColumnDescriptor, TableDescriptor};
use crate::error::AppError;
use crate::sql;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::BTreeMap;

/// Everything a client needs to render an add/edit form for one table.
/// Choice maps are keyed by column name; columns without choices are free
/// inputs.
#[derive(Debug, Serialize)]
pub struct FormPlan {
    pub editable: Vec<ColumnDescriptor>,
    pub fk_choices: BTreeMap<String, Vec<Value>>,
    pub enum_choices: BTreeMap<String, Vec<String>>,
}

/// Columns a form may set: everything except database-generated identity
/// columns, in physical order.
pub fn editable_columns(desc: &TableDescriptor) -> Vec<ColumnDescriptor> {
    desc.columns.iter().filter(|c| !c.is_identity).cloned().collect()
}

/// Build the plan for one table. Foreign-key choices are the live values of
/// the referenced column; enum choices are the type's labels in declared
/// order, skipped entirely when the catalog cannot enumerate them.
pub async fn plan<C: Catalog>(
    pool: &PgPool,
    catalog: &C,
    desc: &TableDescriptor,
) -> Result<FormPlan, AppError> {
    let editable = editable_columns(desc);
    let mut fk_choices = BTreeMap::new();
    let mut enum_choices = BTreeMap::new();
    for col in &editable {
        if let Some(fk) = desc.foreign_keys.get(&col.name) {
            // The referenced column's type decides whether its values need
            // a text cast to survive decoding.
            let ref_desc = catalog.describe(&fk.ref_table).await?;
            let q = sql::select_column_values(&ref_desc, &fk.ref_column);
            tracing::debug!(sql = %q.sql, "query");
            let rows = sqlx::query(&q.sql).fetch_all(pool).await?;
            let values: Vec<Value> = rows.iter().map(|r| sql::decode_cell(r, 0)).collect();
            fk_choices.insert(col.name.clone(), values);
        }
        if catalog.supports_enum_labels() {
            let labels = catalog.enum_labels(&col.udt_name).await?;
            if !labels.is_empty() {
                enum_choices.insert(col.name.clone(), labels);
            }
        }
    }
    Ok(FormPlan {
        editable,
        fk_choices,
        enum_choices,
    })
}
