//! Per-backend in-flight call limits.
//!
//! # Responsibilities
//! - Track calls currently in flight to each backend address
//! - Enforce `max_connections` without locking
//! - Release the slot when the call finishes, however it finishes

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// In-flight counter for one backend address.
#[derive(Debug, Default)]
pub struct Backend {
    pub address: String,
    active_calls: AtomicUsize,
}

impl Backend {
    fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            active_calls: AtomicUsize::new(0),
        }
    }

    /// Get the current number of in-flight calls.
    pub fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::Relaxed)
    }

    /// Try to claim a call slot. `max_calls == 0` means unlimited.
    fn try_create_guard(self: &Arc<Self>, max_calls: usize) -> Option<BackendCallGuard> {
        let mut prev = self.active_calls.load(Ordering::Relaxed);
        loop {
            if max_calls > 0 && prev >= max_calls {
                return None;
            }
            match self.active_calls.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        Some(BackendCallGuard {
            backend: self.clone(),
        })
    }
}

/// Tracks in-flight calls for every backend the gateway has talked to.
#[derive(Debug, Default)]
pub struct InFlightTracker {
    backends: DashMap<String, Arc<Backend>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a call slot on `address`, or `None` when its limit is reached.
    pub fn try_acquire(&self, address: &str, max_calls: usize) -> Option<BackendCallGuard> {
        let backend = self
            .backends
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(Backend::new(address)))
            .clone();
        backend.try_create_guard(max_calls)
    }

    /// Current in-flight count for `address`.
    pub fn active_calls(&self, address: &str) -> usize {
        self.backends
            .get(address)
            .map(|b| b.active_calls())
            .unwrap_or(0)
    }
}

/// A RAII guard that holds one in-flight slot.
#[derive(Debug)]
pub struct BackendCallGuard {
    backend: Arc<Backend>,
}

impl Deref for BackendCallGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for BackendCallGuard {
    fn drop(&mut self) {
        self.backend.active_calls.fetch_sub(1, Ordering::Relaxed);
    }
}
