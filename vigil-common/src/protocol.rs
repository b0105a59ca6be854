//! Line framing used by the bundled connection loop
//!
//! One JSON object per line in each direction. Requests carry a batch of items;
//! responses carry one certitude per item in request order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One request line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evt_id: Option<String>,
    pub data: Vec<Value>,
}

/// One response line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterResponse {
    Certitudes {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        evt_id: Option<String>,
        certitudes: Vec<u32>,
    },
    Error {
        error: String,
    },
}

impl FilterResponse {
    /// Serialize to a newline-terminated frame
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self)
            .unwrap_or_else(|e| format!("{{\"error\":\"unable to encode response: {}\"}}", e));
        line.push('\n');
        line
    }
}
