//! # Vigil Common Library
//!
//! Shared code for vigil filter processes including:
//! - Error types
//! - Configuration document access and process settings
//! - Alert manager and sinks
//! - Filter context passed into generator and task operations
//! - Result cache and input fingerprints
//! - Session tracking for connection draining
//! - Line framing types

pub mod alert;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod protocol;
pub mod session;

pub use cache::{CachedResult, Fingerprint, ResultCache};
pub use context::FilterContext;
pub use error::{Error, Result};
