//! Mock network layer readiness
//!
//! The mock layer registers request handlers contributed by modules, so it
//! can only start once modules are registered. [`MswGate`] records that it
//! did; [`MockServer`] is the contract of the layer itself.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::listeners::{ListenerId, ListenerSet};

/// One-shot readiness flag for the mock network layer
pub struct MswGate {
    ready: AtomicBool,
    listeners: ListenerSet<bool>,
}

impl MswGate {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            listeners: ListenerSet::new(),
        }
    }

    /// Mark the mock layer as ready
    ///
    /// Only the first call notifies listeners. Returns whether this call
    /// flipped the gate.
    pub fn set_ready(&self) -> bool {
        let flipped = !self.ready.swap(true, Ordering::SeqCst);
        if flipped {
            tracing::info!("Mock network layer is ready");
            self.listeners.notify(true);
        }
        flipped
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

impl Default for MswGate {
    fn default() -> Self {
        Self::new()
    }
}

/// The mock network layer
///
/// `start` is awaited once, after both module registries completed phase 1.
#[async_trait]
pub trait MockServer: Send + Sync {
    async fn start(&self) -> anyhow::Result<()>;
}
