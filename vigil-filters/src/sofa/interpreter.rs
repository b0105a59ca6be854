//! Embedded interpreter boundary
//!
//! The sofa backend calls one function of a script module for every batch. The
//! interpreter itself sits behind [`InterpreterRuntime`]; bring-up happens in
//! three steps (initialize, import module, resolve function), each failing with
//! its own diagnosis. A failure after initialization finalizes the context
//! before returning, so no half-built context is ever reachable.

use crate::error::{EngineError, FilterError, FilterResult, InterpreterStage};
use crate::lifecycle::ManagedResource;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Entry point into an interpreter implementation
pub trait InterpreterRuntime: Send + Sync {
    /// Start a long-lived execution context using the environment at
    /// `env_path`, with `custom_path` searched first when given
    fn initialize(
        &self,
        env_path: &Path,
        custom_path: Option<&Path>,
    ) -> Result<Box<dyn InterpreterContext>, EngineError>;
}

/// Live execution context
pub trait InterpreterContext: Send + Sync {
    fn import_module(&self, module: &str) -> Result<Box<dyn ScriptModule>, EngineError>;

    /// Tear the context down
    fn finalize(&self) -> Result<(), EngineError>;
}

/// Imported module
pub trait ScriptModule: Send + Sync {
    fn function(&self, name: &str) -> Result<Box<dyn ScriptFunction>, EngineError>;
}

/// Resolved callable
pub trait ScriptFunction: Send + Sync {
    /// Call with string arguments; the result is the callable's truthiness
    fn call(&self, args: &[String]) -> Result<bool, EngineError>;
}

/// What to load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterSettings {
    pub env_path: PathBuf,
    pub custom_path: Option<PathBuf>,
    pub module: String,
    pub function: String,
}

/// Context, module and callable bundled as one managed resource
pub struct InterpreterHandle {
    // Field order is drop order: callable first, context last.
    function: Box<dyn ScriptFunction>,
    module: Box<dyn ScriptModule>,
    context: Box<dyn InterpreterContext>,
    function_name: String,
    released: AtomicBool,
}

impl InterpreterHandle {
    /// Initialize, import and resolve
    pub fn open(
        runtime: &dyn InterpreterRuntime,
        settings: &InterpreterSettings,
    ) -> FilterResult<Self> {
        let context = runtime
            .initialize(&settings.env_path, settings.custom_path.as_deref())
            .map_err(|source| stage_error(InterpreterStage::Initialize, source))?;
        debug!(env = %settings.env_path.display(), "Interpreter context initialized");

        let module = match context.import_module(&settings.module) {
            Ok(module) => module,
            Err(source) => {
                finalize_after_failure(context.as_ref());
                return Err(stage_error(InterpreterStage::ImportModule, source));
            }
        };

        let function = match module.function(&settings.function) {
            Ok(function) => function,
            Err(source) => {
                drop(module);
                finalize_after_failure(context.as_ref());
                return Err(stage_error(InterpreterStage::ResolveFunction, source));
            }
        };
        debug!(
            module = %settings.module,
            function = %settings.function,
            "Interpreter function resolved"
        );

        Ok(Self {
            function,
            module,
            context,
            function_name: settings.function.clone(),
            released: AtomicBool::new(false),
        })
    }

    /// Invoke the resolved callable
    pub fn call(&self, args: &[String]) -> FilterResult<bool> {
        if self.released.load(Ordering::Acquire) {
            return Err(FilterError::Invocation(format!(
                "'{}' called after interpreter release",
                self.function_name
            )));
        }
        self.function
            .call(args)
            .map_err(|e| FilterError::Invocation(format!("'{}' failed: {}", self.function_name, e)))
    }

    pub fn module(&self) -> &dyn ScriptModule {
        self.module.as_ref()
    }
}

impl ManagedResource for InterpreterHandle {
    fn release(&self) -> Result<(), EngineError> {
        self.released.store(true, Ordering::Release);
        self.context.finalize()
    }
}

fn stage_error(stage: InterpreterStage, source: EngineError) -> FilterError {
    FilterError::Interpreter { stage, source }
}

fn finalize_after_failure(context: &dyn InterpreterContext) {
    if let Err(e) = context.finalize() {
        warn!("Unable to finalize interpreter after failed load: {}", e);
    }
}

/// Runtime used when the binary is built without an interpreter
#[derive(Debug, Default)]
pub struct UnavailableInterpreter;

impl InterpreterRuntime for UnavailableInterpreter {
    fn initialize(
        &self,
        _env_path: &Path,
        _custom_path: Option<&Path>,
    ) -> Result<Box<dyn InterpreterContext>, EngineError> {
        Err(EngineError::new(
            "interpreter support not compiled in (enable the `python` feature)",
        ))
    }
}

/// Interpreter compiled into this binary
pub fn default_runtime() -> Arc<dyn InterpreterRuntime> {
    #[cfg(feature = "python")]
    {
        Arc::new(super::python::PythonRuntime::new())
    }
    #[cfg(not(feature = "python"))]
    {
        Arc::new(UnavailableInterpreter)
    }
}
