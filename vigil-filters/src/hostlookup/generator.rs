//! Host lookup generator

use super::knowledge_base::{DbType, KnowledgeBase};
use super::task::HostLookupTask;
use super::{ALERT_RULE_NAME, ALERT_TAGS, DEFAULT_DB_TYPE, FILTER_NAME};
use crate::error::{FilterError, FilterResult};
use crate::task::{Evaluator, Task};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use vigil_common::config::ConfigDocument;
use vigil_common::session::SessionManager;
use vigil_common::{FilterContext, ResultCache};

pub struct Generator {
    ctx: FilterContext,
    cache: Arc<ResultCache>,
    database: Option<Arc<KnowledgeBase>>,
}

impl Generator {
    pub fn new(ctx: FilterContext, cache_size: usize) -> Self {
        Self {
            ctx,
            cache: Arc::new(ResultCache::new(cache_size)),
            database: None,
        }
    }

    /// Rule name is suffixed with the loaded feed name
    pub fn configure_alerting(&self, tags: &str) -> FilterResult<()> {
        let _span = self.ctx.span().enter();
        debug!("Configuring alerting");
        let rule_name = format!("{}{}", ALERT_RULE_NAME, self.feed_name());
        self.ctx
            .alerts()
            .configure(FILTER_NAME, &rule_name, tags, ALERT_TAGS);
        Ok(())
    }

    /// Read `database` (required) and `db_type` (default `text`), then load the database
    ///
    /// A generator holds one database; a second load is refused and the
    /// loaded table is kept.
    pub fn load_config(&mut self, config: &ConfigDocument) -> FilterResult<()> {
        let _span = self.ctx.span().enter();
        if self.database.is_some() {
            return Err(FilterError::Invocation(
                "host database already loaded for this generator".to_string(),
            ));
        }
        debug!("Loading host database configuration...");

        let database = config.require_str("database")?;
        let db_type: DbType = config
            .str_or_default("db_type", DEFAULT_DB_TYPE)?
            .parse()?;

        let kb = KnowledgeBase::load(Path::new(database), db_type)?;
        self.database = Some(Arc::new(kb));
        Ok(())
    }

    /// Build a task for `connection`
    ///
    /// Precondition: `load_config` succeeded. Otherwise the task answers every
    /// item with the error certitude.
    pub fn create_task<C>(&self, connection: C, manager: Arc<SessionManager>) -> Task<C> {
        let evaluator = match &self.database {
            Some(database) => Evaluator::HostLookup(HostLookupTask::new(Arc::clone(database))),
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

    /// Nothing external to release; the table is dropped with the generator
    pub fn teardown(&mut self) {}

    /// Feed name of the loaded database, empty before load
    pub fn feed_name(&self) -> &str {
        self.database
            .as_deref()
            .map(KnowledgeBase::feed_name)
            .unwrap_or_default()
    }

    pub fn database(&self) -> Option<&Arc<KnowledgeBase>> {
        self.database.as_ref()
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }
}
