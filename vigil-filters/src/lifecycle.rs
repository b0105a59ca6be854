//! Resource lifecycle wrapper
//!
//! Holds one long-lived external handle (interpreter context, inference
//! session) for the lifetime of a generator. The handle is acquired once after a
//! successful load, shared with tasks as an `Arc`, and released exactly once:
//! by an explicit [`Lifecycle::release`] at teardown or, failing that, on drop.
//! Releasing a wrapper that never acquired anything is a no-op.

use crate::error::EngineError;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error};

/// External handle with a single release operation
pub trait ManagedResource: Send + Sync {
    /// Release the underlying handle. Called at most once per acquisition.
    fn release(&self) -> Result<(), EngineError>;
}

enum Slot<R: ?Sized> {
    Empty,
    Held(Arc<R>),
    Released,
}

/// Exactly-once owner of a [`ManagedResource`]
pub struct Lifecycle<R: ?Sized + ManagedResource> {
    name: &'static str,
    slot: Mutex<Slot<R>>,
}

impl<R: ?Sized + ManagedResource> Lifecycle<R> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(Slot::Empty),
        }
    }

    /// Store the handle
    ///
    /// Refused (the handle is handed back) once anything has been acquired,
    /// including after release: a lifecycle never restarts.
    pub fn acquire(&self, resource: Arc<R>) -> Result<(), Arc<R>> {
        let mut slot = self.lock();
        match *slot {
            Slot::Empty => {
                *slot = Slot::Held(resource);
                debug!(resource = self.name, "Resource acquired");
                Ok(())
            }
            Slot::Held(_) | Slot::Released => Err(resource),
        }
    }

    /// Shared handle, available only between acquire and release
    pub fn get(&self) -> Option<Arc<R>> {
        match &*self.lock() {
            Slot::Held(resource) => Some(Arc::clone(resource)),
            Slot::Empty | Slot::Released => None,
        }
    }

    pub fn is_held(&self) -> bool {
        matches!(*self.lock(), Slot::Held(_))
    }

    pub fn is_released(&self) -> bool {
        matches!(*self.lock(), Slot::Released)
    }

    /// Release the handle if one is held
    ///
    /// Returns whether a release was performed. A failing release is logged and
    /// swallowed; the process is shutting down either way.
    pub fn release(&self) -> bool {
        let resource = {
            let mut slot = self.lock();
            match std::mem::replace(&mut *slot, Slot::Released) {
                Slot::Held(resource) => resource,
                Slot::Empty => {
                    *slot = Slot::Empty;
                    return false;
                }
                Slot::Released => return false,
            }
        };

        match resource.release() {
            Ok(()) => debug!(resource = self.name, "Resource released"),
            Err(e) => error!(resource = self.name, "Unable to release resource: {}", e),
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, Slot<R>> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<R: ?Sized + ManagedResource> Drop for Lifecycle<R> {
    fn drop(&mut self) {
        self.release();
    }
}
