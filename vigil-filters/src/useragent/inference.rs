//! Inference engine boundary
//!
//! A session is loaded once from a model file and run for every uncached user
//! agent. [`SessionHandle`] owns it for the generator's lifecycle wrapper and
//! refuses to run once closed.

use crate::error::EngineError;
use crate::lifecycle::ManagedResource;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Loads inference sessions
pub trait InferenceRuntime: Send + Sync {
    /// Load the model at `model_path` for inputs of `max_tokens` ids below `vocab_size`
    fn load(
        &self,
        model_path: &Path,
        vocab_size: usize,
        max_tokens: usize,
    ) -> Result<Box<dyn InferenceSession>, EngineError>;
}

/// Loaded model
pub trait InferenceSession: Send + Sync {
    /// Probability that the encoded input is malicious
    fn run(&self, ids: &[u32]) -> Result<f32, EngineError>;

    fn close(&self) -> Result<(), EngineError>;
}

/// Managed owner of one session
pub struct SessionHandle {
    session: Box<dyn InferenceSession>,
    closed: AtomicBool,
}

impl SessionHandle {
    pub fn new(session: Box<dyn InferenceSession>) -> Self {
        Self {
            session,
            closed: AtomicBool::new(false),
        }
    }

    pub fn run(&self, ids: &[u32]) -> Result<f32, EngineError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::new("inference session is closed"));
        }
        self.session.run(ids)
    }
}

impl ManagedResource for SessionHandle {
    fn release(&self) -> Result<(), EngineError> {
        self.closed.store(true, Ordering::Release);
        self.session.close()
    }
}

/// Runtime used when the binary is built without an inference engine
#[derive(Debug, Default)]
pub struct UnavailableInference;

impl InferenceRuntime for UnavailableInference {
    fn load(
        &self,
        _model_path: &Path,
        _vocab_size: usize,
        _max_tokens: usize,
    ) -> Result<Box<dyn InferenceSession>, EngineError> {
        Err(EngineError::new(
            "inference support not compiled in (enable the `burn` feature)",
        ))
    }
}

/// Inference engine compiled into this binary
pub fn default_runtime() -> Arc<dyn InferenceRuntime> {
    #[cfg(feature = "burn")]
    {
        Arc::new(super::neural::BurnRuntime)
    }
    #[cfg(not(feature = "burn"))]
    {
        Arc::new(UnavailableInference)
    }
}
