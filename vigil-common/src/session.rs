//! Session manager
//!
//! Tracks every spawned connection task so the process can stop accepting,
//! signal shutdown, and wait for in-flight work to finish before backend
//! handles are released.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Owner of the per-connection task set
#[derive(Debug, Default)]
pub struct SessionManager {
    tracker: TaskTracker,
    shutdown: CancellationToken,
    total: AtomicU64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a connection task and track it until completion
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(session = id, "Session started");
        self.tracker.spawn(future);
    }

    /// Token cancelled once shutdown begins; tasks stop reading new requests
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn active_sessions(&self) -> usize {
        self.tracker.len()
    }

    pub fn total_sessions(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Signal shutdown and wait until every tracked session has returned
    pub async fn drain(&self) {
        info!(active = self.tracker.len(), "Draining sessions");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("All sessions finished");
    }
}
