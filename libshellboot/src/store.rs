//! Single dispatch entry point for the bootstrap state
//!
//! The store owns the current [`AppRouterState`] snapshot. Every mutation
//! goes through [`BootstrapStore::dispatch`], which runs the reducer,
//! publishes changed snapshots on a `watch` channel and emits a lifecycle
//! event for every readiness flag that flipped.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::app::{reduce, Action, AppRouterState};
use crate::events::{BootstrapEvent, EventBus};

/// Source of transition timestamps, in milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

pub struct BootstrapStore {
    inner: Mutex<StoreInner>,
    sender: watch::Sender<Arc<AppRouterState>>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
}

struct StoreInner {
    state: Arc<AppRouterState>,
    last_stamp: i64,
    // Readiness can drop again when a protected route becomes active before
    // its data arrived; the bootstrapped event is only emitted once.
    bootstrapped: bool,
}

impl BootstrapStore {
    pub fn new(initial: AppRouterState, clock: Arc<dyn Clock>, event_bus: EventBus) -> Self {
        let state = Arc::new(initial);
        let (sender, _) = watch::channel(Arc::clone(&state));
        Self {
            inner: Mutex::new(StoreInner {
                state,
                last_stamp: i64::MIN,
                bootstrapped: false,
            }),
            sender,
            clock,
            event_bus,
        }
    }

    /// Current snapshot
    pub fn state(&self) -> Arc<AppRouterState> {
        Arc::clone(&self.inner.lock().state)
    }

    /// Receiver of every changed snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppRouterState>> {
        self.sender.subscribe()
    }

    /// Apply `action` and return the resulting snapshot
    ///
    /// Dispatches are serialized; a dispatch that changes nothing returns the
    /// current snapshot and publishes nothing.
    pub fn dispatch(&self, action: Action) -> Arc<AppRouterState> {
        let mut inner = self.inner.lock();

        // Stamps must be strictly increasing so that "updated since" checks
        // hold for actions dispatched within the same millisecond.
        let now = self.clock.now_millis().max(inner.last_stamp.saturating_add(1));

        let previous = Arc::clone(&inner.state);
        let next = reduce(Arc::clone(&previous), action, now);
        if Arc::ptr_eq(&previous, &next) {
            debug!(%action, "Dispatch left state unchanged");
            return next;
        }

        inner.last_stamp = now;
        inner.state = Arc::clone(&next);
        debug!(
            %action,
            is_app_ready = next.is_app_ready,
            can_fetch_public_data = next.can_fetch_public_data,
            can_fetch_protected_data = next.can_fetch_protected_data,
            can_register_deferred_registrations = next.can_register_deferred_registrations,
            can_update_deferred_registrations = next.can_update_deferred_registrations,
            "Bootstrap state changed"
        );

        // Emitted under the lock so events follow dispatch order
        for event in flipped_events(&previous, &next) {
            self.event_bus.emit(event);
        }
        if next.is_app_ready && !inner.bootstrapped {
            inner.bootstrapped = true;
            tracing::info!("Application bootstrapped");
            self.event_bus.emit(BootstrapEvent::ApplicationBootstrapped);
        }
        self.sender.send_replace(Arc::clone(&next));

        next
    }
}

fn flipped_events(previous: &AppRouterState, next: &AppRouterState) -> Vec<BootstrapEvent> {
    let flips = [
        (
            previous.are_modules_registered,
            next.are_modules_registered,
            BootstrapEvent::ModulesRegistered,
        ),
        (previous.is_msw_ready, next.is_msw_ready, BootstrapEvent::MswReady),
        (
            previous.is_public_data_ready,
            next.is_public_data_ready,
            BootstrapEvent::PublicDataReady,
        ),
        (
            previous.is_protected_data_ready,
            next.is_protected_data_ready,
            BootstrapEvent::ProtectedDataReady,
        ),
        (
            previous.are_modules_ready,
            next.are_modules_ready,
            BootstrapEvent::ModulesReady,
        ),
        (
            previous.is_unauthorized,
            next.is_unauthorized,
            BootstrapEvent::Unauthorized,
        ),
    ];

    flips
        .into_iter()
        .filter(|(before, after, _)| !before && *after)
        .map(|(_, _, event)| event)
        .collect()
}
