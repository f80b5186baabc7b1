//! Table allow-list: the closed set of tables the generic row operations
//! may touch, mapped to human-readable labels.
//!
//! Loaded once at startup from a JSON object file (`{"table_name": "Label"}`)
//! and passed around explicitly; a missing file is a valid empty registry.

use crate::error::ConfigError;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_REGISTRY_PATH: &str = "table_registry.json";

/// Path of the registry file, from `TABLE_REGISTRY_PATH` when set.
pub fn registry_path() -> String {
    std::env::var("TABLE_REGISTRY_PATH").unwrap_or_else(|_| DEFAULT_REGISTRY_PATH.into())
}

#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: BTreeMap<String, String>,
}

impl TableRegistry {
    /// Read the registry file. A missing file yields an empty registry so a
    /// fresh deployment starts with no tables exposed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "table registry file missing; no tables exposed");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let tables: BTreeMap<String, String> =
            serde_json::from_str(raw).map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::from_entries(tables)
    }

    pub fn from_entries(tables: BTreeMap<String, String>) -> Result<Self, ConfigError> {
        validate(&tables)?;
        Ok(Self { tables })
    }

    /// Label for an allow-listed table; `None` means the table is not
    /// registered and must not reach any query.
    pub fn label(&self, table: &str) -> Option<&str> {
        self.tables.get(table).map(String::as_str)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Registry entries double as SQL identifiers, so the names are held to a
/// strict shape; labels must be non-empty.
fn validate(tables: &BTreeMap<String, String>) -> Result<(), ConfigError> {
    let ident = Regex::new(r"^[a-z_][a-z0-9_]*$")
        .map_err(|e| ConfigError::Load(e.to_string()))?;
    for (name, label) in tables {
        if !ident.is_match(name) {
            return Err(ConfigError::InvalidTableName(name.clone()));
        }
        if label.trim().is_empty() {
            return Err(ConfigError::EmptyLabel(name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_object() {
        let reg = TableRegistry::from_json(r#"{"book": "Books", "app_role": "Roles"}"#).unwrap();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.label("book"), Some("Books"));
        assert!(reg.contains("app_role"));
        assert!(!reg.contains("widget"));
    }

    #[test]
    fn missing_file_is_empty_registry() {
        let reg = TableRegistry::load("/nonexistent/registry.json").unwrap();
        assert!(reg.is_empty());
        assert_eq!(reg.label("book"), None);
    }

    #[test]
    fn rejects_names_that_are_not_identifiers() {
        let err = TableRegistry::from_json(r#"{"book; drop table x": "Books"}"#).unwrap_err();
        match err {
            ConfigError::InvalidTableName(name) => assert!(name.starts_with("book;")),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(TableRegistry::from_json(r#"{"Book": "Books"}"#).is_err());
        assert!(TableRegistry::from_json(r#"{"book\"": "Books"}"#).is_err());
    }

    #[test]
    fn rejects_empty_labels() {
        let err = TableRegistry::from_json(r#"{"book": "  "}"#).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyLabel(_)));
    }

    #[test]
    fn entries_are_ordered_by_name() {
        let reg = TableRegistry::from_json(r#"{"reader": "Readers", "book": "Books"}"#).unwrap();
        let names: Vec<&str> = reg.entries().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["book", "reader"]);
    }
}
