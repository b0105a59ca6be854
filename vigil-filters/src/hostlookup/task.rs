//! Host lookup task: score hostnames against the loaded knowledge base

use super::knowledge_base::KnowledgeBase;
use super::FILTER_NAME;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;
use vigil_common::context::{ERROR_CERTITUDE, MAX_CERTITUDE};
use vigil_common::protocol::FilterRequest;
use vigil_common::{CachedResult, FilterContext, Fingerprint, ResultCache};

pub struct HostLookupTask {
    database: Arc<KnowledgeBase>,
}

impl HostLookupTask {
    pub fn new(database: Arc<KnowledgeBase>) -> Self {
        Self { database }
    }

    pub fn evaluate(
        &self,
        ctx: &FilterContext,
        cache: &ResultCache,
        request: &FilterRequest,
    ) -> Vec<u32> {
        request
            .data
            .iter()
            .map(|item| self.evaluate_item(ctx, cache, item, request.evt_id.as_deref()))
            .collect()
    }

    fn evaluate_item(
        &self,
        ctx: &FilterContext,
        cache: &ResultCache,
        item: &Value,
        evt_id: Option<&str>,
    ) -> u32 {
        let Some(host) = host_of(item) else {
            warn!("Invalid host entry, expected a string");
            return ERROR_CERTITUDE;
        };

        let key = Fingerprint::of_str(FILTER_NAME, host);
        let (certitude, aux) = match cache.lookup(&key) {
            Some(hit) => {
                let aux = hit
                    .payload
                    .as_ref()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                (hit.certitude, aux)
            }
            None => {
                let (certitude, aux) = self.lookup(host);
                cache.insert(
                    key,
                    CachedResult::with_payload(certitude, Value::String(aux.clone())),
                );
                (certitude, aux)
            }
        };

        if ctx.should_alert(certitude) {
            ctx.alerts().alert(
                host,
                certitude,
                evt_id,
                json!({"feed_name": self.database.feed_name(), "aux": aux}),
            );
        }
        certitude
    }

    /// Certitude and auxiliary value for `host`; unknown hosts score 0
    pub fn lookup(&self, host: &str) -> (u32, String) {
        match self.database.get(host) {
            Some(entry) => (
                entry.score.clamp(0, MAX_CERTITUDE as i32) as u32,
                entry.aux.clone(),
            ),
            None => (0, String::new()),
        }
    }
}

/// A bare string, or the first element of an array
fn host_of(item: &Value) -> Option<&str> {
    match item {
        Value::String(host) => Some(host),
        Value::Array(values) => values.first().and_then(Value::as_str),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of_shapes() {
        assert_eq!(host_of(&json!("a.com")), Some("a.com"));
        assert_eq!(host_of(&json!(["a.com", "extra"])), Some("a.com"));
        assert_eq!(host_of(&json!(12)), None);
        assert_eq!(host_of(&json!([])), None);
    }

    #[test]
    fn test_lookup_clamps_tabular_scores() {
        let mut doc = serde_json::Map::new();
        doc.insert(
            "table".to_string(),
            json!([{"index": "hi", "value": 300}, {"index": "lo", "value": -3}]),
        );
        let kb = KnowledgeBase::load_rsyslog(&doc).unwrap();
        let task = HostLookupTask::new(Arc::new(kb));

        assert_eq!(task.lookup("hi").0, 100);
        assert_eq!(task.lookup("lo").0, 0);
        assert_eq!(task.lookup("missing"), (0, String::new()));
    }
}
