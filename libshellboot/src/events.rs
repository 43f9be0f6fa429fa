//! Lifecycle events emitted while a bootstrap session progresses
//!
//! The event bus uses `tokio::sync::broadcast` for multi-subscriber support.
//! Registries, the store and the effects emit events as the session moves
//! through its lifecycle; any number of subscribers (CLI output, tests,
//! diagnostics) can consume them.
//!
//! Emitting never blocks. If no subscribers exist the event is dropped, and
//! a lagging subscriber loses the oldest events first.
//!
//! # Example
//!
//! ```
//! use libshellboot::events::{BootstrapEvent, EventBus};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(BootstrapEvent::BootstrappingStarted);
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {}", event.name());
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::registry::status::ModuleOrigin;

/// Event receiver type alias
pub type EventReceiver = broadcast::Receiver<BootstrapEvent>;

/// Event bus for distributing lifecycle events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BootstrapEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified capacity
    ///
    /// The capacity determines how many events can be buffered per subscriber
    /// before older events are dropped (if the subscriber is lagging).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: BootstrapEvent) {
        // send() only fails when nobody is listening
        let _ = self.sender.send(event);
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Lifecycle events of a bootstrap session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BootstrapEvent {
    BootstrappingStarted,

    ModulesRegistrationStarted {
        origin: ModuleOrigin,
        module_count: usize,
    },

    ModulesRegistrationCompleted {
        origin: ModuleOrigin,
        error_count: usize,
        /// Number of deferred registrations returned by the modules
        deferred_count: usize,
    },

    /// Both registries completed phase 1
    ModulesRegistered,

    MswReady,

    PublicDataFetchStarted,

    PublicDataReady,

    ProtectedDataFetchStarted,

    ProtectedDataReady,

    DeferredRegistrationsStarted {
        origin: ModuleOrigin,
        registration_count: usize,
    },

    DeferredRegistrationsCompleted {
        origin: ModuleOrigin,
        error_count: usize,
    },

    DeferredRegistrationsUpdateStarted {
        origin: ModuleOrigin,
        registration_count: usize,
    },

    DeferredRegistrationsUpdateCompleted {
        origin: ModuleOrigin,
        error_count: usize,
    },

    /// Both registries are ready
    ModulesReady,

    /// A protected data fetch was refused
    Unauthorized,

    ApplicationBootstrapped,
}

impl BootstrapEvent {
    /// Stable kebab-case name, one per variant and origin
    pub fn name(&self) -> String {
        match self {
            BootstrapEvent::BootstrappingStarted => "bootstrapping-started".to_string(),
            BootstrapEvent::ModulesRegistrationStarted { origin, .. } => {
                format!("{}-modules-registration-started", origin)
            }
            BootstrapEvent::ModulesRegistrationCompleted { origin, .. } => {
                format!("{}-modules-registration-completed", origin)
            }
            BootstrapEvent::ModulesRegistered => "modules-registered".to_string(),
            BootstrapEvent::MswReady => "msw-ready".to_string(),
            BootstrapEvent::PublicDataFetchStarted => "public-data-fetch-started".to_string(),
            BootstrapEvent::PublicDataReady => "public-data-ready".to_string(),
            BootstrapEvent::ProtectedDataFetchStarted => {
                "protected-data-fetch-started".to_string()
            }
            BootstrapEvent::ProtectedDataReady => "protected-data-ready".to_string(),
            BootstrapEvent::DeferredRegistrationsStarted { origin, .. } => {
                format!("{}-deferred-registrations-started", origin)
            }
            BootstrapEvent::DeferredRegistrationsCompleted { origin, .. } => {
                format!("{}-deferred-registrations-completed", origin)
            }
            BootstrapEvent::DeferredRegistrationsUpdateStarted { origin, .. } => {
                format!("{}-deferred-registrations-update-started", origin)
            }
            BootstrapEvent::DeferredRegistrationsUpdateCompleted { origin, .. } => {
                format!("{}-deferred-registrations-update-completed", origin)
            }
            BootstrapEvent::ModulesReady => "modules-ready".to_string(),
            BootstrapEvent::Unauthorized => "unauthorized".to_string(),
            BootstrapEvent::ApplicationBootstrapped => "application-bootstrapped".to_string(),
        }
    }
}
