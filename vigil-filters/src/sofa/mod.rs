//! Sofa filter
//!
//! Interpreter backend: batches of log rows are handed to a function of a
//! script module through scratch CSV/JSON files.

pub mod generator;
pub mod interpreter;
#[cfg(feature = "python")]
pub mod python;
pub mod task;

pub use generator::Generator;
pub use interpreter::{
    InterpreterContext, InterpreterHandle, InterpreterRuntime, InterpreterSettings,
    ScriptFunction, ScriptModule, UnavailableInterpreter,
};
pub use task::{ScratchFiles, SofaTask};

pub const FILTER_NAME: &str = "sofa";
pub const ALERT_RULE_NAME: &str = "Sofa";
pub const ALERT_TAGS: &[&str] = &["attack.discovery"];
