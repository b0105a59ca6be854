//! User agent task: score user-agent strings with the inference session

use super::inference::SessionHandle;
use super::token_map::TokenMap;
use super::FILTER_NAME;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, warn};
use vigil_common::context::{ERROR_CERTITUDE, MAX_CERTITUDE};
use vigil_common::protocol::FilterRequest;
use vigil_common::{CachedResult, FilterContext, Fingerprint, ResultCache};

pub struct UserAgentTask {
    token_map: Arc<TokenMap>,
    session: Arc<SessionHandle>,
    max_tokens: usize,
}

struct Miss {
    index: usize,
    key: Fingerprint,
    ids: Vec<u32>,
}

impl UserAgentTask {
    pub fn new(token_map: Arc<TokenMap>, session: Arc<SessionHandle>, max_tokens: usize) -> Self {
        Self {
            token_map,
            session,
            max_tokens,
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub async fn evaluate(
        &self,
        ctx: &FilterContext,
        cache: &ResultCache,
        request: &FilterRequest,
    ) -> Vec<u32> {
        let mut certitudes = vec![ERROR_CERTITUDE; request.data.len()];
        let mut misses = Vec::new();

        for (index, item) in request.data.iter().enumerate() {
            let Some(user_agent) = user_agent_of(item) else {
                warn!("Invalid user agent entry at index {}, expected a string", index);
                continue;
            };
            let key = Fingerprint::of_str(FILTER_NAME, user_agent);
            match cache.lookup(&key) {
                Some(hit) => certitudes[index] = hit.certitude,
                None => misses.push(Miss {
                    index,
                    key,
                    ids: self.token_map.encode(user_agent, self.max_tokens),
                }),
            }
        }

        if !misses.is_empty() {
            let session = Arc::clone(&self.session);
            let inputs: Vec<Vec<u32>> = misses.iter().map(|miss| miss.ids.clone()).collect();
            let scored = tokio::task::spawn_blocking(move || {
                inputs
                    .iter()
                    .map(|ids| session.run(ids).map(certitude_of))
                    .collect::<Vec<_>>()
            })
            .await;

            match scored {
                Ok(scored) => {
                    for (miss, result) in misses.into_iter().zip(scored) {
                        match result {
                            Ok(certitude) => {
                                cache.insert(miss.key, CachedResult::certitude(certitude));
                                certitudes[miss.index] = certitude;
                            }
                            Err(e) => error!("Inference failed: {}", e),
                        }
                    }
                }
                Err(e) => error!("Inference worker failed: {}", e),
            }
        }

        for (item, certitude) in request.data.iter().zip(&certitudes) {
            if ctx.should_alert(*certitude) {
                if let Some(user_agent) = user_agent_of(item) {
                    ctx.alerts().alert(
                        user_agent,
                        *certitude,
                        request.evt_id.as_deref(),
                        json!({}),
                    );
                }
            }
        }
        certitudes
    }
}

/// Probability to certitude: rounded percentage, at most 100
pub fn certitude_of(probability: f32) -> u32 {
    if probability.is_nan() || probability <= 0.0 {
        return 0;
    }
    ((probability * 100.0).round() as u32).min(MAX_CERTITUDE)
}

fn user_agent_of(item: &Value) -> Option<&str> {
    match item {
        Value::String(ua) => Some(ua),
        Value::Array(values) => values.first().and_then(Value::as_str),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certitude_of() {
        assert_eq!(certitude_of(0.0), 0);
        assert_eq!(certitude_of(0.494), 49);
        assert_eq!(certitude_of(0.496), 50);
        assert_eq!(certitude_of(1.0), 100);
        assert_eq!(certitude_of(1.7), 100);
        assert_eq!(certitude_of(-0.2), 0);
        assert_eq!(certitude_of(f32::NAN), 0);
    }

    #[test]
    fn test_user_agent_of() {
        assert_eq!(user_agent_of(&json!("curl/8.0")), Some("curl/8.0"));
        assert_eq!(user_agent_of(&json!(["curl/8.0"])), Some("curl/8.0"));
        assert_eq!(user_agent_of(&json!({"ua": "x"})), None);
    }
}
