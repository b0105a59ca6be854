//! Error types for vigil-filters
//!
//! Configuration errors come from `vigil-common`; everything a backend can fail
//! on while loading is classified here so the startup log names the cause.

use std::fmt;
use thiserror::Error;

/// Step of interpreter bring-up that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterStage {
    Initialize,
    ImportModule,
    ResolveFunction,
}

impl fmt::Display for InterpreterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InterpreterStage::Initialize => "interpreter initialization",
            InterpreterStage::ImportModule => "module import",
            InterpreterStage::ResolveFunction => "function lookup",
        };
        f.write_str(text)
    }
}

/// Diagnostic text reported by an external runtime (interpreter or inference engine)
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Filter error type
#[derive(Debug, Error)]
pub enum FilterError {
    /// Missing or mis-typed configuration field
    #[error(transparent)]
    Config(#[from] vigil_common::Error),

    /// Knowledge base unreadable, malformed, or empty
    #[error("Knowledge base error: {0}")]
    KnowledgeBase(String),

    /// Token map unreadable or malformed
    #[error("Token map error: {0}")]
    TokenMap(String),

    /// Interpreter bring-up failed at `stage`
    #[error("Could not initialize generator: {stage} went wrong: {source}")]
    Interpreter {
        stage: InterpreterStage,
        #[source]
        source: EngineError,
    },

    /// Model load or session construction failed
    #[error("Inference engine error: {0}")]
    Inference(#[source] EngineError),

    /// Backend failure while serving a request
    #[error("Invocation error: {0}")]
    Invocation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for filter operations
pub type FilterResult<T> = Result<T, FilterError>;
