//! Turns registry and mock layer status changes into reducer actions
//!
//! The bridge is the only component observing the registries and the
//! [`MswGate`] directly. Everything else reads the store.

use std::sync::{Arc, Weak};
use tracing::debug;

use crate::app::Action;
use crate::listeners::ListenerId;
use crate::msw::MswGate;
use crate::registry::ModuleRegistry;
use crate::store::BootstrapStore;

/// Listens to both registries and the mock layer gate for as long as it lives
pub struct StatusDispatchBridge<D>
where
    D: Clone + Send + 'static,
{
    inner: Arc<BridgeInner<D>>,
    local_listener: ListenerId,
    remote_listener: ListenerId,
    msw_listener: ListenerId,
}

struct BridgeInner<D> {
    store: Arc<BootstrapStore>,
    local: Arc<ModuleRegistry<D>>,
    remote: Arc<ModuleRegistry<D>>,
    msw: Arc<MswGate>,
}

impl<D> BridgeInner<D>
where
    D: Clone + Send + 'static,
{
    /// Dispatch whatever the current statuses imply and the store lacks
    fn sync(&self) {
        let local = self.local.status();
        let remote = self.remote.status();
        let state = self.store.state();

        if !state.are_modules_registered && local.is_registered() && remote.is_registered() {
            debug!(%local, %remote, "Both registries registered their modules");
            self.store.dispatch(Action::ModulesRegistered);
        }

        // When deferred registrations ran, the coordinator dispatches
        // modules-ready itself, after reporting their errors.
        if !state.are_modules_ready
            && local.is_ready()
            && remote.is_ready()
            && self.local.deferred_registration_count() == 0
            && self.remote.deferred_registration_count() == 0
        {
            debug!("Both registries are ready without deferred registrations");
            self.store.dispatch(Action::ModulesReady);
        }

        // The mock layer serves handlers contributed by modules: it is only
        // forwarded once modules are registered, even if the gate opened earlier.
        if !state.is_msw_ready && self.msw.is_ready() && self.store.state().are_modules_registered {
            self.store.dispatch(Action::MswReady);
        }
    }
}

impl<D> StatusDispatchBridge<D>
where
    D: Clone + Send + 'static,
{
    /// Start listening and dispatch what is already known
    pub fn attach(
        store: Arc<BootstrapStore>,
        local: Arc<ModuleRegistry<D>>,
        remote: Arc<ModuleRegistry<D>>,
        msw: Arc<MswGate>,
    ) -> Self {
        let inner = Arc::new(BridgeInner {
            store,
            local,
            remote,
            msw,
        });

        let local_listener = inner.local.add_status_listener(sync_on_change(&inner));
        let remote_listener = inner.remote.add_status_listener(sync_on_change(&inner));
        let msw_listener = inner.msw.add_listener(sync_on_change(&inner));

        inner.sync();

        Self {
            inner,
            local_listener,
            remote_listener,
            msw_listener,
        }
    }

    /// Re-read every status; listeners already do this on each transition
    pub fn sync(&self) {
        self.inner.sync();
    }
}

impl<D> Drop for StatusDispatchBridge<D>
where
    D: Clone + Send + 'static,
{
    fn drop(&mut self) {
        self.inner.local.remove_status_listener(self.local_listener);
        self.inner.remote.remove_status_listener(self.remote_listener);
        self.inner.msw.remove_listener(self.msw_listener);
    }
}

// Registries and the gate own their listeners, so listeners only hold a
// weak reference back to the bridge.
fn sync_on_change<D, T>(inner: &Arc<BridgeInner<D>>) -> impl Fn(T) + Send + Sync + 'static
where
    D: Clone + Send + 'static,
    T: 'static,
{
    let weak: Weak<BridgeInner<D>> = Arc::downgrade(inner);
    move |_| {
        if let Some(inner) = weak.upgrade() {
            inner.sync();
        }
    }
}
