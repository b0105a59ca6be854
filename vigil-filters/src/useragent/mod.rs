//! User agent filter
//!
//! Inference backend: user-agent strings are tokenised through a token map and
//! scored by a classifier session loaded once at startup.

pub mod generator;
pub mod inference;
#[cfg(feature = "burn")]
pub mod neural;
pub mod task;
pub mod token_map;

pub use generator::Generator;
pub use inference::{InferenceRuntime, InferenceSession, SessionHandle, UnavailableInference};
pub use task::UserAgentTask;
pub use token_map::TokenMap;

pub const FILTER_NAME: &str = "user_agent";
pub const ALERT_RULE_NAME: &str = "User-Agent";
pub const ALERT_TAGS: &[&str] = &["attack.initial_access"];
pub const DEFAULT_MAX_TOKENS: u32 = 75;
/// Largest accepted `max_tokens`; every request allocates this many ids per item
pub const MAX_TOKENS_LIMIT: u32 = 4096;
