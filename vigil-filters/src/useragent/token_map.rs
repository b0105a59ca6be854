//! Token map: `token,index` lines mapping user-agent tokens to model input ids

use crate::error::{FilterError, FilterResult};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Immutable token → id table, shared read-only by every task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMap {
    ids: HashMap<String, u32>,
}

impl TokenMap {
    pub fn load(path: &Path) -> FilterResult<Self> {
        debug!(path = %path.display(), "Loading token map...");
        let content = std::fs::read_to_string(path).map_err(|e| {
            FilterError::TokenMap(format!(
                "could not open the token map file {}: {}",
                path.display(),
                e
            ))
        })?;
        let map = Self::parse(&content)?;
        debug!(tokens = map.len(), "Token map loaded");
        Ok(map)
    }

    /// Parse `token,index` lines; blank lines are skipped, anything else malformed is fatal
    pub fn parse(content: &str) -> FilterResult<Self> {
        let mut ids = HashMap::new();
        for (number, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let malformed = || {
                FilterError::TokenMap(format!("malformed line {}: '{}'", number + 1, line))
            };
            let (token, index) = line.rsplit_once(',').ok_or_else(malformed)?;
            if token.is_empty() {
                return Err(malformed());
            }
            let index: u32 = index.trim().parse().map_err(|_| malformed())?;
            ids.insert(token.to_string(), index);
        }

        if ids.is_empty() {
            return Err(FilterError::TokenMap("token map is empty".to_string()));
        }
        Ok(Self { ids })
    }

    pub fn get(&self, token: &str) -> Option<u32> {
        self.ids.get(token).copied()
    }

    /// Largest id plus one: the embedding table size the model must accept
    pub fn vocab_size(&self) -> usize {
        self.ids.values().max().map_or(0, |max| *max as usize + 1)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Model input for `user_agent`
    ///
    /// Alphanumeric runs are looked up, unknown tokens dropped, the first
    /// `max_tokens` ids kept and the sequence left-padded with 0.
    pub fn encode(&self, user_agent: &str, max_tokens: usize) -> Vec<u32> {
        let ids: Vec<u32> = user_agent
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .filter_map(|token| self.get(token))
            .take(max_tokens)
            .collect();

        let mut encoded = vec![0; max_tokens - ids.len()];
        encoded.extend(ids);
        encoded
    }
}
