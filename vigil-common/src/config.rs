//! Configuration loading
//!
//! Two layers:
//! - [`ConfigDocument`]: the per-filter JSON configuration consumed by a generator's
//!   `load_config`. Required fields fail with a distinct error for "missing" and for
//!   "wrong type"; optional fields fall back to a default and log that they did.
//! - [`TomlSettings`]: optional process settings file. Command-line values take
//!   priority over it, and it takes priority over compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

/// Alert threshold used when neither the command line nor the settings file sets one
pub const DEFAULT_THRESHOLD: u32 = 80;

/// Result cache capacity used when unset (0 disables the cache)
pub const DEFAULT_CACHE_SIZE: usize = 0;

/// Validated view over a filter's JSON configuration document
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    fields: Map<String, Value>,
}

impl ConfigDocument {
    /// Wrap an already parsed document; the top level must be an object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(Error::Config(
                "configuration document is not a JSON object".to_string(),
            )),
        }
    }

    /// Parse a document from JSON text
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Read and parse a document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Resource(format!(
                "cannot read configuration {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&text)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Required string field
    pub fn require_str(&self, key: &str) -> Result<&str> {
        match self.fields.get(key) {
            None => Err(Error::MissingField(key.to_string())),
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(_) => Err(Error::InvalidField {
                field: key.to_string(),
                expected: "a string",
            }),
        }
    }

    /// Optional string field; absent yields `None`, present with another type is an error
    pub fn optional_str(&self, key: &str) -> Result<Option<&str>> {
        match self.fields.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(Error::InvalidField {
                field: key.to_string(),
                expected: "a string",
            }),
        }
    }

    /// Optional string field with a logged fallback
    pub fn str_or_default(&self, key: &str, default: &str) -> Result<String> {
        match self.optional_str(key)? {
            Some(value) => Ok(value.to_string()),
            None => {
                info!(field = key, default, "Parameter not provided, using default");
                Ok(default.to_string())
            }
        }
    }

    /// Optional unsigned field with a logged fallback
    ///
    /// Negative numbers, floats, strings and values above `u32::MAX` are rejected.
    pub fn u32_or_default(&self, key: &str, default: u32) -> Result<u32> {
        match self.fields.get(key) {
            None => {
                info!(field = key, default, "Parameter not provided, using default");
                Ok(default)
            }
            Some(value) => value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| Error::InvalidField {
                    field: key.to_string(),
                    expected: "an unsigned integer",
                }),
        }
    }
}

/// Process settings file
///
/// Every field is optional; a missing file is not an error for callers that use
/// [`TomlSettings::load_or_default`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlSettings {
    pub filter: Option<String>,
    pub socket: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub cache_size: Option<usize>,
    pub threshold: Option<u32>,
    pub tags: Option<String>,
    pub monitor: Option<String>,
    pub log_level: Option<String>,
}

impl TomlSettings {
    /// Parse a settings file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Parse a settings file when a path is given, otherwise use empty settings
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_and_wrong_type_are_distinct() {
        let doc = ConfigDocument::from_value(json!({"database": 12})).unwrap();

        match doc.require_str("database") {
            Err(Error::InvalidField { field, expected }) => {
                assert_eq!(field, "database");
                assert_eq!(expected, "a string");
            }
            other => panic!("expected InvalidField, got {:?}", other),
        }

        match doc.require_str("db_type") {
            Err(Error::MissingField(field)) => assert_eq!(field, "db_type"),
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_str_or_default() {
        let doc = ConfigDocument::from_value(json!({"db_type": "json"})).unwrap();
        assert_eq!(doc.str_or_default("db_type", "text").unwrap(), "json");

        let doc = ConfigDocument::from_value(json!({})).unwrap();
        assert_eq!(doc.str_or_default("db_type", "text").unwrap(), "text");

        let doc = ConfigDocument::from_value(json!({"db_type": false})).unwrap();
        assert!(doc.str_or_default("db_type", "text").is_err());
    }

    #[test]
    fn test_u32_or_default() {
        let doc = ConfigDocument::from_value(json!({})).unwrap();
        assert_eq!(doc.u32_or_default("max_tokens", 75).unwrap(), 75);

        let doc = ConfigDocument::from_value(json!({"max_tokens": 120})).unwrap();
        assert_eq!(doc.u32_or_default("max_tokens", 75).unwrap(), 120);

        for bad in [json!(-1), json!(1.5), json!("50"), json!(u64::MAX)] {
            let doc = ConfigDocument::from_value(json!({ "max_tokens": bad })).unwrap();
            assert!(doc.u32_or_default("max_tokens", 75).is_err());
        }
    }

    #[test]
    fn test_top_level_must_be_object() {
        assert!(ConfigDocument::parse("[1, 2]").is_err());
        assert!(ConfigDocument::parse("not json").is_err());
    }
}
