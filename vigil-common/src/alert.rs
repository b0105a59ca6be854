//! Alert manager
//!
//! Holds the filter/rule/tag identity configured at startup and turns scored
//! entries into [`Alert`] records handed to an [`AlertSink`]. Delivery transport
//! is the sink's business; this module only builds and forwards records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

/// Certitude at or above which an alert is rated "high"
const HIGH_LEVEL_CERTITUDE: u32 = 80;

/// One alert record
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Alert {
    pub alert_type: String,
    pub alert_subtype: String,
    pub alert_time: DateTime<Utc>,
    pub level: String,
    pub rule_name: String,
    pub tags: Vec<String>,
    pub entry: String,
    pub score: u32,
    pub evt_id: Option<String>,
    pub details: Value,
}

/// Destination for alert records
pub trait AlertSink: Send + Sync {
    fn emit(&self, alert: &Alert);
}

/// Writes alerts as JSON on the `vigil::alert` tracing target
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn emit(&self, alert: &Alert) {
        match serde_json::to_string(alert) {
            Ok(json) => warn!(target: "vigil::alert", "{}", json),
            Err(e) => warn!(target: "vigil::alert", "Unable to serialize alert: {}", e),
        }
    }
}

/// Keeps alerts in memory
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every alert received so far
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl AlertSink for MemoryAlertSink {
    fn emit(&self, alert: &Alert) {
        self.alerts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(alert.clone());
    }
}

#[derive(Debug, Default, Clone)]
struct AlertIdentity {
    filter_name: String,
    rule_name: String,
    tags: Vec<String>,
}

/// Filter-scoped alert manager
pub struct AlertManager {
    identity: RwLock<AlertIdentity>,
    sink: Arc<dyn AlertSink>,
}

impl AlertManager {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self {
            identity: RwLock::new(AlertIdentity::default()),
            sink,
        }
    }

    /// Set filter name, rule name and tags
    ///
    /// `tags` is the caller-supplied comma-separated list; when empty the
    /// `default_tags` are installed instead.
    pub fn configure(&self, filter_name: &str, rule_name: &str, tags: &str, default_tags: &[&str]) {
        let tags: Vec<String> = if tags.trim().is_empty() {
            debug!(filter = filter_name, "No alert tags provided in the configuration. Using default.");
            default_tags.iter().map(|t| t.to_string()).collect()
        } else {
            parse_tags(tags)
        };

        let mut identity = self
            .identity
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        identity.filter_name = filter_name.to_string();
        identity.rule_name = rule_name.to_string();
        identity.tags = tags;
    }

    pub fn filter_name(&self) -> String {
        self.read_identity().filter_name
    }

    pub fn rule_name(&self) -> String {
        self.read_identity().rule_name
    }

    pub fn tags(&self) -> Vec<String> {
        self.read_identity().tags
    }

    /// Build an alert record for `entry` and forward it to the sink
    pub fn alert(&self, entry: &str, certitude: u32, evt_id: Option<&str>, details: Value) {
        let identity = self.read_identity();
        let alert = Alert {
            alert_type: "vigil".to_string(),
            alert_subtype: identity.filter_name,
            alert_time: Utc::now(),
            level: alert_level(certitude).to_string(),
            rule_name: identity.rule_name,
            tags: identity.tags,
            entry: entry.to_string(),
            score: certitude,
            evt_id: evt_id.map(str::to_string),
            details,
        };
        self.sink.emit(&alert);
    }

    fn read_identity(&self) -> AlertIdentity {
        self.identity
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

fn alert_level(certitude: u32) -> &'static str {
    if certitude >= HIGH_LEVEL_CERTITUDE {
        "high"
    } else {
        "medium"
    }
}

fn parse_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_tags_when_empty() {
        let manager = AlertManager::new(Arc::new(MemoryAlertSink::new()));
        manager.configure("hostlookup", "Hostlookup_feed", "", &["a", "b"]);

        assert_eq!(manager.filter_name(), "hostlookup");
        assert_eq!(manager.rule_name(), "Hostlookup_feed");
        assert_eq!(manager.tags(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_caller_tags_verbatim() {
        let manager = AlertManager::new(Arc::new(MemoryAlertSink::new()));
        manager.configure("sofa", "Sofa", "custom.one, custom.two", &["default"]);

        assert_eq!(
            manager.tags(),
            vec!["custom.one".to_string(), "custom.two".to_string()]
        );
    }

    #[test]
    fn test_alert_reaches_sink() {
        let sink = Arc::new(MemoryAlertSink::new());
        let manager = AlertManager::new(sink.clone());
        manager.configure("user_agent", "User-Agent", "", &["attack.initial_access"]);

        manager.alert("curl/7.1", 90, Some("evt-1"), json!({"model": "ua"}));
        manager.alert("Mozilla/5.0", 40, None, Value::Null);

        let alerts = sink.alerts();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].level, "high");
        assert_eq!(alerts[0].evt_id.as_deref(), Some("evt-1"));
        assert_eq!(alerts[0].alert_subtype, "user_agent");
        assert_eq!(alerts[1].level, "medium");
        assert_eq!(alerts[1].score, 40);
    }
}
