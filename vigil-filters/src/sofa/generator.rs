//! Sofa generator

use super::interpreter::{
    default_runtime, InterpreterHandle, InterpreterRuntime, InterpreterSettings,
};
use super::task::{ScratchFiles, SofaTask};
use super::{ALERT_RULE_NAME, ALERT_TAGS, FILTER_NAME};
use crate::error::{FilterError, FilterResult};
use crate::lifecycle::{Lifecycle, ManagedResource};
use crate::task::{Evaluator, Task};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use vigil_common::config::ConfigDocument;
use vigil_common::session::SessionManager;
use vigil_common::{FilterContext, ResultCache};

pub struct Generator {
    ctx: FilterContext,
    cache: Arc<ResultCache>,
    runtime: Arc<dyn InterpreterRuntime>,
    interpreter: Lifecycle<InterpreterHandle>,
    scratch_dir: PathBuf,
}

impl Generator {
    /// Generator using the interpreter compiled into this binary
    pub fn new(ctx: FilterContext, cache_size: usize) -> Self {
        Self::with_runtime(ctx, cache_size, default_runtime())
    }

    pub fn with_runtime(
        ctx: FilterContext,
        cache_size: usize,
        runtime: Arc<dyn InterpreterRuntime>,
    ) -> Self {
        Self {
            ctx,
            cache: Arc::new(ResultCache::new(cache_size)),
            runtime,
            interpreter: Lifecycle::new("interpreter"),
            scratch_dir: std::env::temp_dir(),
        }
    }

    pub fn configure_alerting(&self, tags: &str) -> FilterResult<()> {
        let _span = self.ctx.span().enter();
        debug!("Configuring alerting");
        self.ctx
            .alerts()
            .configure(FILTER_NAME, ALERT_RULE_NAME, tags, ALERT_TAGS);
        Ok(())
    }

    /// Read the interpreter settings and bring the interpreter up
    ///
    /// Required: `python_env_path`, `module`, `function`. Optional:
    /// `custom_python_path`, `scratch_dir`.
    pub fn load_config(&mut self, config: &ConfigDocument) -> FilterResult<()> {
        let _span = self.ctx.span().enter();
        debug!("Loading interpreter configuration...");

        let settings = InterpreterSettings {
            env_path: PathBuf::from(config.require_str("python_env_path")?),
            module: config.require_str("module")?.to_string(),
            function: config.require_str("function")?.to_string(),
            custom_path: config.optional_str("custom_python_path")?.map(PathBuf::from),
        };
        if let Some(dir) = config.optional_str("scratch_dir")? {
            self.scratch_dir = PathBuf::from(dir);
        }

        let handle = Arc::new(InterpreterHandle::open(self.runtime.as_ref(), &settings)?);
        if let Err(handle) = self.interpreter.acquire(handle) {
            if let Err(e) = handle.release() {
                debug!("Releasing duplicate interpreter: {}", e);
            }
            return Err(FilterError::Invocation(
                "interpreter already loaded for this generator".to_string(),
            ));
        }
        info!(
            module = %settings.module,
            function = %settings.function,
            "Interpreter ready"
        );
        Ok(())
    }

    /// Build a task for `connection` with fresh scratch paths
    ///
    /// Precondition: `load_config` succeeded. Otherwise the task answers every
    /// item with the error certitude.
    pub fn create_task<C>(&self, connection: C, manager: Arc<SessionManager>) -> Task<C> {
        let evaluator = match self.interpreter.get() {
            Some(interpreter) => Evaluator::Sofa(SofaTask::new(
                interpreter,
                ScratchFiles::generate(&self.scratch_dir),
            )),
            None => Evaluator::Unloaded,
        };
        Task::new(
            connection,
            manager,
            self.ctx.clone(),
            Arc::clone(&self.cache),
            evaluator,
        )
    }

    /// Release the interpreter; a no-op when it was never loaded
    pub fn teardown(&mut self) {
        self.interpreter.release();
    }

    pub fn is_loaded(&self) -> bool {
        self.interpreter.is_held()
    }

    pub fn scratch_dir(&self) -> &PathBuf {
        &self.scratch_dir
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }
}
