//! User agent generator

use super::inference::{default_runtime, InferenceRuntime, SessionHandle};
use super::task::UserAgentTask;
use super::token_map::TokenMap;
use super::{ALERT_RULE_NAME, ALERT_TAGS, DEFAULT_MAX_TOKENS, FILTER_NAME, MAX_TOKENS_LIMIT};
use crate::error::{FilterError, FilterResult};
use crate::lifecycle::{Lifecycle, ManagedResource};
use crate::task::{Evaluator, Task};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use vigil_common::config::ConfigDocument;
use vigil_common::session::SessionManager;
use vigil_common::{FilterContext, ResultCache};

pub struct Generator {
    ctx: FilterContext,
    cache: Arc<ResultCache>,
    runtime: Arc<dyn InferenceRuntime>,
    session: Lifecycle<SessionHandle>,
    token_map: Option<Arc<TokenMap>>,
    max_tokens: usize,
}

impl Generator {
    /// Generator using the inference engine compiled into this binary
    pub fn new(ctx: FilterContext, cache_size: usize) -> Self {
        Self::with_runtime(ctx, cache_size, default_runtime())
    }

    pub fn with_runtime(
        ctx: FilterContext,
        cache_size: usize,
        runtime: Arc<dyn InferenceRuntime>,
    ) -> Self {
        Self {
            ctx,
            cache: Arc::new(ResultCache::new(cache_size)),
            runtime,
            session: Lifecycle::new("inference session"),
            token_map: None,
            max_tokens: DEFAULT_MAX_TOKENS as usize,
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

    /// Read `token_map_path`, `model_path` (required) and `max_tokens`, then
    /// load the token map and the model
    pub fn load_config(&mut self, config: &ConfigDocument) -> FilterResult<()> {
        let _span = self.ctx.span().enter();
        debug!("Loading classifier...");

        let token_map_path = config.require_str("token_map_path")?;
        let model_path = config.require_str("model_path")?;
        let max_tokens = config.u32_or_default("max_tokens", DEFAULT_MAX_TOKENS)?;
        if !(1..=MAX_TOKENS_LIMIT).contains(&max_tokens) {
            return Err(vigil_common::Error::InvalidField {
                field: "max_tokens".to_string(),
                expected: "an integer between 1 and 4096",
            }
            .into());
        }
        let max_tokens = max_tokens as usize;

        let token_map = TokenMap::load(Path::new(token_map_path))?;
        let session = self
            .runtime
            .load(Path::new(model_path), token_map.vocab_size(), max_tokens)
            .map_err(FilterError::Inference)?;

        let handle = Arc::new(SessionHandle::new(session));
        if let Err(handle) = self.session.acquire(handle) {
            if let Err(e) = handle.release() {
                debug!("Closing duplicate session: {}", e);
            }
            return Err(FilterError::Invocation(
                "inference session already loaded for this generator".to_string(),
            ));
        }

        self.token_map = Some(Arc::new(token_map));
        self.max_tokens = max_tokens;
        info!(max_tokens, "Classifier ready");
        Ok(())
    }

    /// Build a task for `connection`
    ///
    /// Precondition: `load_config` succeeded. Otherwise the task answers every
    /// item with the error certitude.
    pub fn create_task<C>(&self, connection: C, manager: Arc<SessionManager>) -> Task<C> {
        let evaluator = match (&self.token_map, self.session.get()) {
            (Some(token_map), Some(session)) => Evaluator::UserAgent(UserAgentTask::new(
                Arc::clone(token_map),
                session,
                self.max_tokens,
            )),
            _ => Evaluator::Unloaded,
        };
        Task::new(
            connection,
            manager,
            self.ctx.clone(),
            Arc::clone(&self.cache),
            evaluator,
        )
    }

    /// Close the inference session; a no-op when it was never loaded
    pub fn teardown(&mut self) {
        self.session.release();
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_held()
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn token_map(&self) -> Option<&Arc<TokenMap>> {
        self.token_map.as_ref()
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }
}
