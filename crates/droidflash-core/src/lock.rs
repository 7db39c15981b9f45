//! Per-device mutual exclusion
//!
//! Discovery and flashing must never interleave on the same device. A single
//! shared `DeviceLocks` hands out one guard per device id; the guard releases
//! the id when dropped.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Registry of devices currently being operated on
#[derive(Debug, Default)]
pub struct DeviceLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl DeviceLocks {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn held(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until `id` is free, then hold it
    pub fn acquire(self: &Arc<Self>, id: &str) -> DeviceGuard {
        let mut held = self.held();
        while held.contains(id) {
            log::debug!("waiting for device {} to be released", id);
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(id.to_string());
        DeviceGuard {
            locks: Arc::clone(self),
            id: id.to_string(),
        }
    }

    /// Hold `id` if nobody else does
    pub fn try_acquire(self: &Arc<Self>, id: &str) -> Option<DeviceGuard> {
        let mut held = self.held();
        if !held.insert(id.to_string()) {
            return None;
        }
        Some(DeviceGuard {
            locks: Arc::clone(self),
            id: id.to_string(),
        })
    }

    /// Whether `id` is currently held
    pub fn is_held(&self, id: &str) -> bool {
        self.held().contains(id)
    }
}

/// Exclusive claim on one device id
#[derive(Debug)]
pub struct DeviceGuard {
    locks: Arc<DeviceLocks>,
    id: String,
}

impl DeviceGuard {
    /// The held device id
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.locks.held().remove(&self.id);
        self.locks.released.notify_all();
    }
}
