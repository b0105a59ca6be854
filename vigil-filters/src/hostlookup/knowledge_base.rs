//! Knowledge base loader
//!
//! Parses a host database into an in-memory table of
//! `key -> (auxiliary value, score)` plus the feed name used to qualify the
//! alert rule. Three on-disk formats are supported:
//!
//! - `text`: one key per line, score 100, feed name from the file name
//! - `json`: `{"feed_name": .., "data": [{"entry": .., "score"?: ..}]}`
//! - `rsyslog`: `{"table": [{"index": .., "value": string | int}]}`, feed name
//!   from the file name
//!
//! Individual malformed records are skipped; a load that ends up with no usable
//! entry fails (except plain text, where an empty file is accepted).

use crate::error::{FilterError, FilterResult};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, error, warn};

/// Score given to entries that carry none
pub const DEFAULT_SCORE: i32 = 100;

/// On-disk database format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Text,
    Json,
    Rsyslog,
}

impl DbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Text => "text",
            DbType::Json => "json",
            DbType::Rsyslog => "rsyslog",
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbType {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(DbType::Text),
            "json" => Ok(DbType::Json),
            "rsyslog" => Ok(DbType::Rsyslog),
            other => Err(FilterError::KnowledgeBase(format!(
                "Unknown 'db_type': {}",
                other
            ))),
        }
    }
}

/// Value stored for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KbEntry {
    pub aux: String,
    pub score: i32,
}

/// Loaded, read-only host database
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    feed_name: String,
    entries: HashMap<String, KbEntry>,
}

impl KnowledgeBase {
    /// Load `path` in the given format
    pub fn load(path: &Path, db_type: DbType) -> FilterResult<Self> {
        debug!(path = %path.display(), db_type = %db_type, "Loading host database");
        let kb = match db_type {
            DbType::Text => Self::load_text(path)?,
            DbType::Json => Self::load_json(&read_json_object(path)?)?,
            DbType::Rsyslog => {
                let mut kb = Self::load_rsyslog(&read_json_object(path)?)?;
                kb.feed_name = feed_name_from_path(path);
                kb
            }
        };
        debug!(feed = %kb.feed_name, entries = kb.len(), "Host database loaded");
        Ok(kb)
    }

    /// Plain text: every non-blank line is a key with the default score
    pub fn load_text(path: &Path) -> FilterResult<Self> {
        let content = std::fs::read(path).map_err(|e| {
            error!(path = %path.display(), "Cannot open host database: {}", e);
            FilterError::KnowledgeBase(format!("Cannot open host database: {}", e))
        })?;

        let mut kb = Self::parse_text(&content);
        kb.feed_name = feed_name_from_path(path);
        if kb.is_empty() {
            warn!(path = %path.display(), "Host database contains no entry");
        }
        Ok(kb)
    }

    /// Parse plain-text content; feed name is left empty
    ///
    /// Keys are stored as written, minus the line terminator. Bytes that are
    /// not valid UTF-8 are replaced rather than failing the load.
    pub fn parse_text(content: &[u8]) -> Self {
        let mut kb = Self::default();
        for (number, line) in content.split(|byte| *byte == b'\n').enumerate() {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let key = String::from_utf8_lossy(line);
            if key.trim().is_empty() {
                continue;
            }
            if matches!(key, Cow::Owned(_)) {
                warn!(line = number + 1, "Host entry is not valid UTF-8, invalid bytes replaced");
            }
            kb.insert(&key, String::new(), DEFAULT_SCORE);
        }
        kb
    }

    /// Structured document: feed name and a non-empty `data` array
    pub fn load_json(document: &Map<String, Value>) -> FilterResult<Self> {
        let feed_name = match document.get("feed_name") {
            Some(Value::String(name)) => name.clone(),
            _ => {
                error!("No proper feed name provided in the database");
                return Err(FilterError::KnowledgeBase(
                    "No proper feed name provided in the database".to_string(),
                ));
            }
        };

        let entries = match document.get("data") {
            Some(Value::Array(entries)) => entries,
            _ => {
                error!(feed = %feed_name, "No or ill formatted entries in the database");
                return Err(FilterError::KnowledgeBase(
                    "No or ill formatted entries in the database".to_string(),
                ));
            }
        };
        if entries.is_empty() {
            error!(feed = %feed_name, "No entry in the database. Stopping.");
            return Err(FilterError::KnowledgeBase(
                "No entry in the database".to_string(),
            ));
        }

        let mut kb = Self {
            feed_name,
            entries: HashMap::with_capacity(entries.len()),
        };
        for entry in entries {
            kb.load_json_entry(entry);
        }

        if kb.is_empty() {
            error!(feed = %kb.feed_name, "No usable entry in the database. Stopping.");
            return Err(FilterError::KnowledgeBase(
                "No usable entry in the database".to_string(),
            ));
        }
        Ok(kb)
    }

    fn load_json_entry(&mut self, entry: &Value) -> bool {
        let Some(object) = entry.as_object() else {
            warn!("Database entry is not a JSON object. Ignoring.");
            return false;
        };
        let Some(key) = object.get("entry").and_then(Value::as_str) else {
            warn!("Entry is not a string. Ignoring.");
            return false;
        };

        let mut score = DEFAULT_SCORE;
        if let Some(value) = object.get("score").and_then(as_i32) {
            score = value;
            if !(0..=100).contains(&score) {
                warn!(
                    feed = %self.feed_name,
                    score,
                    "Found score not between 0 and 100 in database, setting to 100"
                );
                score = DEFAULT_SCORE;
            }
        }

        self.insert(key, String::new(), score);
        true
    }

    /// Tabular document: a `table` array of index/value records
    ///
    /// Feed name is not part of the document; [`KnowledgeBase::load`] takes it
    /// from the file name.
    pub fn load_rsyslog(document: &Map<String, Value>) -> FilterResult<Self> {
        let entries = match document.get("table") {
            Some(Value::Array(entries)) => entries,
            _ => {
                error!("No table provided in the database");
                return Err(FilterError::KnowledgeBase(
                    "No table provided in the database".to_string(),
                ));
            }
        };

        let mut kb = Self::default();
        let mut skipped = 0usize;
        for entry in entries {
            if !kb.load_rsyslog_entry(entry) {
                skipped += 1;
            }
        }
        if skipped > 0 {
            debug!(skipped, "Ignored malformed table records");
        }

        if kb.is_empty() {
            error!("No usable entry in the database. Stopping.");
            return Err(FilterError::KnowledgeBase(
                "No usable entry in the database".to_string(),
            ));
        }
        Ok(kb)
    }

    fn load_rsyslog_entry(&mut self, entry: &Value) -> bool {
        let Some(object) = entry.as_object() else {
            return false;
        };
        let Some(key) = object.get("index").and_then(Value::as_str) else {
            return false;
        };

        match object.get("value") {
            Some(Value::String(aux)) => {
                self.insert(key, aux.clone(), DEFAULT_SCORE);
                true
            }
            Some(value) => match as_i32(value) {
                Some(score) => {
                    self.insert(key, String::new(), score);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    fn insert(&mut self, key: &str, aux: String, score: i32) {
        self.entries.insert(key.to_string(), KbEntry { aux, score });
    }

    pub fn get(&self, key: &str) -> Option<&KbEntry> {
        self.entries.get(key)
    }

    pub fn feed_name(&self) -> &str {
        &self.feed_name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// File name without its last extension
pub fn feed_name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_json_object(path: &Path) -> FilterResult<Map<String, Value>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        error!(path = %path.display(), "Cannot open host database: {}", e);
        FilterError::KnowledgeBase(format!("Cannot open host database: {}", e))
    })?;
    debug!(path = %path.display(), "Parsing database...");

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) | Err(_) => {
            error!(path = %path.display(), "Database is not a JSON object");
            Err(FilterError::KnowledgeBase(
                "Database is not a JSON object".to_string(),
            ))
        }
    }
}

/// Integer that fits a 32-bit signed score
fn as_i32(value: &Value) -> Option<i32> {
    value.as_i64().and_then(|v| i32::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_text_skips_blank_lines() {
        let kb = KnowledgeBase::parse_text(b"a.com\n\nb.com\r\n   \nc.com");
        assert_eq!(kb.len(), 3);
        for key in ["a.com", "b.com", "c.com"] {
            assert_eq!(
                kb.get(key),
                Some(&KbEntry {
                    aux: String::new(),
                    score: 100
                })
            );
        }
    }

    #[test]
    fn test_text_keys_kept_as_written() {
        let kb = KnowledgeBase::parse_text(b" padded.com \nplain.com\r\n");
        assert_eq!(kb.len(), 2);
        assert!(kb.get(" padded.com ").is_some());
        assert!(kb.get("padded.com").is_none());
        assert!(kb.get("plain.com").is_some());
    }

    #[test]
    fn test_text_invalid_utf8_line_does_not_fail_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hosts.txt");
        std::fs::write(&path, b"good.com\ncaf\xe9.example\nother.com\n").unwrap();

        let kb = KnowledgeBase::load(&path, DbType::Text).unwrap();
        assert_eq!(kb.len(), 3);
        assert!(kb.get("good.com").is_some());
        assert!(kb.get("other.com").is_some());
        assert!(kb.get("caf\u{fffd}.example").is_some());
        assert_eq!(kb.feed_name(), "hosts");
    }

    #[test]
    fn test_json_end_to_end_example() {
        let kb = KnowledgeBase::load_json(&object(json!({
            "feed_name": "f1",
            "data": [{"entry": "a.com", "score": 50}, {"entry": "b.com"}]
        })))
        .unwrap();

        assert_eq!(kb.feed_name(), "f1");
        assert_eq!(kb.get("a.com").unwrap().score, 50);
        assert_eq!(kb.get("b.com").unwrap().score, 100);
    }

    #[test]
    fn test_json_out_of_range_score_clamped_to_max() {
        let kb = KnowledgeBase::load_json(&object(json!({
            "feed_name": "f",
            "data": [{"entry": "neg", "score": -5}, {"entry": "big", "score": 250}]
        })))
        .unwrap();

        assert_eq!(kb.get("neg").unwrap().score, 100);
        assert_eq!(kb.get("big").unwrap().score, 100);
    }

    #[test]
    fn test_json_non_integer_score_uses_default() {
        let kb = KnowledgeBase::load_json(&object(json!({
            "feed_name": "f",
            "data": [{"entry": "x", "score": "10"}, {"entry": "y", "score": 2.5}]
        })))
        .unwrap();

        assert_eq!(kb.get("x").unwrap().score, 100);
        assert_eq!(kb.get("y").unwrap().score, 100);
    }

    #[test]
    fn test_json_malformed_entries_skipped() {
        let kb = KnowledgeBase::load_json(&object(json!({
            "feed_name": "f",
            "data": ["bare", {"entry": 12}, {"score": 3}, {"entry": "ok.com", "score": 7}]
        })))
        .unwrap();

        assert_eq!(kb.len(), 1);
        assert_eq!(kb.get("ok.com").unwrap().score, 7);
    }

    #[test]
    fn test_json_only_malformed_entry_fails() {
        let result = KnowledgeBase::load_json(&object(json!({
            "feed_name": "f",
            "data": [{"entry": 1}]
        })));
        assert!(matches!(result, Err(FilterError::KnowledgeBase(_))));
    }

    #[test]
    fn test_json_structure_failures() {
        for doc in [
            json!({"data": [{"entry": "a"}]}),
            json!({"feed_name": 3, "data": [{"entry": "a"}]}),
            json!({"feed_name": "f"}),
            json!({"feed_name": "f", "data": {"entry": "a"}}),
            json!({"feed_name": "f", "data": []}),
        ] {
            assert!(KnowledgeBase::load_json(&object(doc)).is_err());
        }
    }

    #[test]
    fn test_json_duplicate_last_write_wins() {
        let kb = KnowledgeBase::load_json(&object(json!({
            "feed_name": "f",
            "data": [{"entry": "a", "score": 10}, {"entry": "a", "score": 20}]
        })))
        .unwrap();
        assert_eq!(kb.len(), 1);
        assert_eq!(kb.get("a").unwrap().score, 20);
    }

    #[test]
    fn test_rsyslog_value_shapes() {
        let kb = KnowledgeBase::load_rsyslog(&object(json!({
            "table": [
                {"index": "a.com", "value": "malware"},
                {"index": "b.com", "value": 42},
                {"index": "c.com", "value": 300},
                {"index": "d.com", "value": [1, 2]},
                {"index": "e.com", "value": 1.5},
                {"index": "f.com"},
                {"value": "orphan"},
                "not an object"
            ]
        })))
        .unwrap();

        assert_eq!(kb.len(), 3);
        assert_eq!(
            kb.get("a.com"),
            Some(&KbEntry {
                aux: "malware".to_string(),
                score: 100
            })
        );
        assert_eq!(
            kb.get("b.com"),
            Some(&KbEntry {
                aux: String::new(),
                score: 42
            })
        );
        // Integer values are taken as-is on this path
        assert_eq!(kb.get("c.com").unwrap().score, 300);
        assert!(kb.get("d.com").is_none());
        assert!(kb.get("e.com").is_none());
    }

    #[test]
    fn test_rsyslog_duplicate_replaces_aux_and_score() {
        let kb = KnowledgeBase::load_rsyslog(&object(json!({
            "table": [
                {"index": "a", "value": "first"},
                {"index": "a", "value": 5}
            ]
        })))
        .unwrap();
        assert_eq!(
            kb.get("a"),
            Some(&KbEntry {
                aux: String::new(),
                score: 5
            })
        );
    }

    #[test]
    fn test_rsyslog_empty_fails() {
        assert!(KnowledgeBase::load_rsyslog(&object(json!({"table": []}))).is_err());
        assert!(KnowledgeBase::load_rsyslog(&object(json!({"table": [{"index": "a"}]}))).is_err());
        assert!(KnowledgeBase::load_rsyslog(&object(json!({"rows": []}))).is_err());
    }

    #[test]
    fn test_db_type_parse() {
        assert_eq!("text".parse::<DbType>().unwrap(), DbType::Text);
        assert_eq!("json".parse::<DbType>().unwrap(), DbType::Json);
        assert_eq!("rsyslog".parse::<DbType>().unwrap(), DbType::Rsyslog);
        assert!("csv".parse::<DbType>().is_err());
    }

    #[test]
    fn test_feed_name_strips_extension() {
        assert_eq!(feed_name_from_path(Path::new("/etc/feeds/bad_hosts.txt")), "bad_hosts");
        assert_eq!(feed_name_from_path(Path::new("list.v2.json")), "list.v2");
        assert_eq!(feed_name_from_path(Path::new("plain")), "plain");
    }
}
