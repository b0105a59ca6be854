//! Filter context
//!
//! Carries the logging span and alert manager into every generator and task
//! operation instead of relying on process-wide state.

use crate::alert::{AlertManager, AlertSink};
use std::sync::Arc;
use tracing::Span;

/// Certitude reported for an item whose evaluation failed
pub const ERROR_CERTITUDE: u32 = 101;

/// Highest certitude a backend can produce
pub const MAX_CERTITUDE: u32 = 100;

/// Explicit per-filter context
#[derive(Clone)]
pub struct FilterContext {
    span: Span,
    alerts: Arc<AlertManager>,
    threshold: u32,
}

impl FilterContext {
    /// Create a context for the filter instance `name`
    pub fn new(name: &str, sink: Arc<dyn AlertSink>, threshold: u32) -> Self {
        Self {
            span: tracing::info_span!("filter", name = %name),
            alerts: Arc::new(AlertManager::new(sink)),
            threshold,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Whether `certitude` must raise an alert
    ///
    /// Error certitudes never alert.
    pub fn should_alert(&self, certitude: u32) -> bool {
        certitude >= self.threshold && certitude <= MAX_CERTITUDE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::MemoryAlertSink;

    #[test]
    fn test_should_alert_bounds() {
        let ctx = FilterContext::new("test", Arc::new(MemoryAlertSink::new()), 80);
        assert!(!ctx.should_alert(79));
        assert!(ctx.should_alert(80));
        assert!(ctx.should_alert(100));
        assert!(!ctx.should_alert(ERROR_CERTITUDE));
    }
}
