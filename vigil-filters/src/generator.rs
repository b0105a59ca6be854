//! Generator dispatch
//!
//! One generator per filter process. The backend is picked at startup by
//! [`FilterKind`]; every generator exposes the same operations: load the
//! configuration, configure alerting, create a task per connection, tear down.

use crate::error::FilterResult;
use crate::task::Task;
use crate::{hostlookup, sofa, useragent};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};
use vigil_common::config::ConfigDocument;
use vigil_common::session::SessionManager;
use vigil_common::{FilterContext, ResultCache};

/// Detection backend of a filter process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    HostLookup,
    Sofa,
    UserAgent,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::HostLookup => hostlookup::FILTER_NAME,
            FilterKind::Sofa => sofa::FILTER_NAME,
            FilterKind::UserAgent => useragent::FILTER_NAME,
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hostlookup" => Ok(FilterKind::HostLookup),
            "sofa" => Ok(FilterKind::Sofa),
            "user_agent" | "useragent" => Ok(FilterKind::UserAgent),
            other => Err(format!(
                "unknown filter '{}' (expected hostlookup, sofa or user_agent)",
                other
            )),
        }
    }
}

/// Backend-specific generator
pub enum Generator {
    HostLookup(hostlookup::Generator),
    Sofa(sofa::Generator),
    UserAgent(useragent::Generator),
}

impl Generator {
    /// Generator for `kind` using the runtimes compiled into this binary
    pub fn new(kind: FilterKind, ctx: FilterContext, cache_size: usize) -> Self {
        match kind {
            FilterKind::HostLookup => {
                Generator::HostLookup(hostlookup::Generator::new(ctx, cache_size))
            }
            FilterKind::Sofa => Generator::Sofa(sofa::Generator::new(ctx, cache_size)),
            FilterKind::UserAgent => {
                Generator::UserAgent(useragent::Generator::new(ctx, cache_size))
            }
        }
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            Generator::HostLookup(_) => FilterKind::HostLookup,
            Generator::Sofa(_) => FilterKind::Sofa,
            Generator::UserAgent(_) => FilterKind::UserAgent,
        }
    }

    /// Load the backend; failures are logged once here and returned
    pub fn load_config(&mut self, config: &ConfigDocument) -> FilterResult<()> {
        let kind = self.kind();
        let result = match self {
            Generator::HostLookup(g) => g.load_config(config),
            Generator::Sofa(g) => g.load_config(config),
            Generator::UserAgent(g) => g.load_config(config),
        };
        match &result {
            Ok(()) => info!(filter = %kind, "Configuration loaded"),
            Err(e) => error!(filter = %kind, "Unable to load configuration: {}", e),
        }
        result
    }

    pub fn configure_alerting(&self, tags: &str) -> FilterResult<()> {
        match self {
            Generator::HostLookup(g) => g.configure_alerting(tags),
            Generator::Sofa(g) => g.configure_alerting(tags),
            Generator::UserAgent(g) => g.configure_alerting(tags),
        }
    }

    pub fn create_task<C>(&self, connection: C, manager: Arc<SessionManager>) -> Task<C> {
        match self {
            Generator::HostLookup(g) => g.create_task(connection, manager),
            Generator::Sofa(g) => g.create_task(connection, manager),
            Generator::UserAgent(g) => g.create_task(connection, manager),
        }
    }

    pub fn teardown(&mut self) {
        match self {
            Generator::HostLookup(g) => g.teardown(),
            Generator::Sofa(g) => g.teardown(),
            Generator::UserAgent(g) => g.teardown(),
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        match self {
            Generator::HostLookup(g) => g.cache(),
            Generator::Sofa(g) => g.cache(),
            Generator::UserAgent(g) => g.cache(),
        }
    }
}

impl From<hostlookup::Generator> for Generator {
    fn from(generator: hostlookup::Generator) -> Self {
        Generator::HostLookup(generator)
    }
}

impl From<sofa::Generator> for Generator {
    fn from(generator: sofa::Generator) -> Self {
        Generator::Sofa(generator)
    }
}

impl From<useragent::Generator> for Generator {
    fn from(generator: useragent::Generator) -> Self {
        Generator::UserAgent(generator)
    }
}
