//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from a table
//! descriptor. Identifiers come only from the registry (table names) and the
//! catalog (column and type names); every value is a bound parameter.

use crate::catalog::{ColumnDescriptor, TableDescriptor};
use serde_json::Value;

/// Quote identifier for PostgreSQL.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }
}

/// Placeholder with a cast to the column's underlying type, so text-bound
/// values land in enum/timestamp/numeric columns. Explicit casts from text
/// go through I/O conversion, which is exactly what form values need.
fn cast_placeholder(n: u32, udt: &str) -> String {
    if udt.is_empty() {
        format!("${}", n)
    } else {
        format!("${}::{}", n, quoted(udt))
    }
}

fn udt_of(desc: &TableDescriptor, column: &str) -> String {
    desc.column(column).map(|c| c.udt_name.clone()).unwrap_or_default()
}

/// Column reference for a SELECT list: types the row decoder cannot
/// represent (custom types, numeric, arrays) read as col::text.
fn casted_column(c: &ColumnDescriptor) -> String {
    let q = quoted(&c.name);
    match c.data_type.as_str() {
        "USER-DEFINED" | "numeric" | "ARRAY" => format!("{}::text", q),
        _ => q,
    }
}

fn select_column_list(desc: &TableDescriptor) -> String {
    desc.columns.iter().map(casted_column).collect::<Vec<_>>().join(", ")
}

/// Full table scan, ordered by the primary key when one exists.
pub fn select_rows(desc: &TableDescriptor) -> QueryBuf {
    let mut q = QueryBuf::new();
    let cols = select_column_list(desc);
    let order = desc
        .primary_key
        .as_deref()
        .map(|pk| format!(" ORDER BY {}", quoted(pk)))
        .unwrap_or_default();
    q.sql = format!("SELECT {} FROM {}{}", cols, quoted(&desc.table), order);
    q
}

/// Values of one column of the referenced table, for foreign-key choice
/// lists. Applies the same cast rule as the row listing; the ORDER BY is
/// table-qualified so it sorts the underlying value, not its text form.
pub fn select_column_values(desc: &TableDescriptor, column: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let expr = desc
        .column(column)
        .map(casted_column)
        .unwrap_or_else(|| quoted(column));
    q.sql = format!(
        "SELECT {} FROM {} ORDER BY {}.{}",
        expr,
        quoted(&desc.table),
        quoted(&desc.table),
        quoted(column)
    );
    q
}

/// INSERT of the given (column, value) pairs in order. Columns with no
/// surviving value are omitted entirely so database defaults apply; with
/// nothing to insert the statement falls back to DEFAULT VALUES. Returns the
/// primary key when the table has one.
pub fn insert(desc: &TableDescriptor, values: &[(String, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::with_capacity(values.len());
    let mut placeholders = Vec::with_capacity(values.len());
    for (name, value) in values {
        let n = q.push_param(value.clone());
        cols.push(quoted(name));
        placeholders.push(cast_placeholder(n, &udt_of(desc, name)));
    }
    let body = if cols.is_empty() {
        "DEFAULT VALUES".to_string()
    } else {
        format!("({}) VALUES ({})", cols.join(", "), placeholders.join(", "))
    };
    let returning = desc
        .primary_key
        .as_deref()
        .map(|pk| format!(" RETURNING {}", quoted(pk)))
        .unwrap_or_default();
    q.sql = format!("INSERT INTO {} {}{}", quoted(&desc.table), body, returning);
    q
}

/// UPDATE applying every given (column, value) pair, by primary key. The id
/// binds last.
pub fn update_all(desc: &TableDescriptor, pk: &str, sets: &[(String, Value)], id: Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut set_parts = Vec::with_capacity(sets.len());
    for (name, value) in sets {
        let n = q.push_param(value.clone());
        set_parts.push(format!("{} = {}", quoted(name), cast_placeholder(n, &udt_of(desc, name))));
    }
    let id_n = q.push_param(id);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        quoted(&desc.table),
        set_parts.join(", "),
        quoted(pk),
        cast_placeholder(id_n, &udt_of(desc, pk))
    );
    q
}

/// DELETE by primary key.
pub fn delete_by_pk(desc: &TableDescriptor, pk: &str, id: Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_n = q.push_param(id);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        quoted(&desc.table),
        quoted(pk),
        cast_placeholder(id_n, &udt_of(desc, pk))
    );
    q
}
