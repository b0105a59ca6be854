//! Host lookup filter
//!
//! Static knowledge-base backend: hostnames are scored against a feed loaded
//! once at startup from a text, json or rsyslog-table database.

pub mod generator;
pub mod knowledge_base;
pub mod task;

pub use generator::Generator;
pub use knowledge_base::{DbType, KbEntry, KnowledgeBase};
pub use task::HostLookupTask;

pub const FILTER_NAME: &str = "hostlookup";
pub const ALERT_RULE_NAME: &str = "Hostlookup_";
pub const ALERT_TAGS: &[&str] = &["attack.command_and_control", "attack.t1071"];
pub const DEFAULT_DB_TYPE: &str = "text";
