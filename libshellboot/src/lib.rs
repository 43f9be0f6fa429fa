//! Shellboot - readiness coordination for composite applications
//!
//! An application shell registers local and remote modules, optionally
//! waits for a mock network layer and for public/protected data, and then
//! runs the modules' deferred registrations. This library tracks all of it
//! through a single reducer-driven state and tells the host when the
//! application is ready to render.

pub mod app;
pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod data;
pub mod error;
pub mod events;
pub mod listeners;
pub mod logging;
pub mod msw;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use app::{Action, AppRouterState};
pub use config::{BootstrapConfig, Config};
pub use data::{BootstrapDataSource, DataFetchError, NoDataSource};
pub use error::{RegistrationError, RegistryError, Result, ShellbootError};
pub use events::{BootstrapEvent, EventBus};
pub use msw::{MockServer, MswGate};
pub use registry::registration::{DeferredRegistration, DeferredRegistrationOperation, ModuleRegistration};
pub use registry::status::{ModuleOrigin, ModuleRegistrationStatus};
pub use registry::ModuleRegistry;
pub use runtime::{NavigationItem, Route, RouteVisibility, ShellRuntime};
pub use session::{BootstrapSession, BootstrapSessionBuilder};
