//! Bootstrap session facade
//!
//! A [`BootstrapSession`] wires one bootstrap together: the store, both
//! module registries, the mock layer gate, the bridge between them and the
//! effects reacting to the store (deferred registrations and data fetches).
//!
//! # Example
//!
//! ```no_run
//! use libshellboot::config::BootstrapConfig;
//! use libshellboot::registry::registration::ModuleRegistration;
//! use libshellboot::session::BootstrapSession;
//!
//! # async fn example() -> libshellboot::Result<()> {
//! let session = BootstrapSession::without_data(BootstrapConfig::default());
//! let mut events = session.events();
//!
//! let local: Vec<ModuleRegistration<(), ()>> = vec![ModuleRegistration::local(
//!     Some("shell"),
//!     |_runtime, _context| async { Ok(None) },
//! )];
//! let errors = session.start(local, Vec::new(), None).await?;
//!
//! let state = session.wait_until_ready().await;
//! assert!(state.is_app_ready);
//! # Ok(())
//! # }
//! ```

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::{Action, AppRouterState};
use crate::bridge::StatusDispatchBridge;
use crate::config::BootstrapConfig;
use crate::coordinator::{DeferredRegistrationCoordinator, ErrorCallback};
use crate::data::{BootstrapDataSource, DataFetchError, DataLoader, NoDataSource};
use crate::error::{RegistrationError, RegistryError, Result};
use crate::events::{BootstrapEvent, EventBus, EventReceiver};
use crate::msw::{MockServer, MswGate};
use crate::registry::registration::ModuleRegistration;
use crate::registry::status::ModuleOrigin;
use crate::registry::ModuleRegistry;
use crate::runtime::{RouteVisibility, ShellRuntime};
use crate::store::{BootstrapStore, Clock, SystemClock};

pub struct BootstrapSessionBuilder<D> {
    config: BootstrapConfig,
    data_source: Arc<dyn BootstrapDataSource<D>>,
    mock_server: Option<Arc<dyn MockServer>>,
    on_error: Option<ErrorCallback>,
    clock: Arc<dyn Clock>,
    runtime: ShellRuntime,
}

impl<D> BootstrapSessionBuilder<D>
where
    D: Clone + Send + Sync + 'static,
{
    /// Mock layer started once phase 1 completed, when `wait_for_msw` is set
    pub fn mock_server(mut self, server: Arc<dyn MockServer>) -> Self {
        self.mock_server = Some(server);
        self
    }

    /// Called with every non-empty batch of registration errors
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[RegistrationError]) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an existing runtime with the modules instead of a fresh one
    pub fn runtime(mut self, runtime: ShellRuntime) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn build(self) -> BootstrapSession<D> {
        let id = Uuid::new_v4();
        let event_bus = EventBus::new(self.config.event_capacity);
        let store = Arc::new(BootstrapStore::new(
            AppRouterState::from_config(&self.config),
            self.clock,
            event_bus.clone(),
        ));
        let local = Arc::new(ModuleRegistry::new(ModuleOrigin::Local, event_bus.clone()));
        let remote = Arc::new(ModuleRegistry::new(ModuleOrigin::Remote, event_bus.clone()));
        let msw = Arc::new(MswGate::new());

        let bridge = StatusDispatchBridge::attach(
            Arc::clone(&store),
            Arc::clone(&local),
            Arc::clone(&remote),
            Arc::clone(&msw),
        );
        let coordinator = Arc::new(DeferredRegistrationCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&local),
            Arc::clone(&remote),
            Arc::clone(&self.data_source),
            self.on_error.clone(),
        ));
        let loader = Arc::new(DataLoader::new(
            Arc::clone(&store),
            self.data_source,
            event_bus.clone(),
        ));

        debug!(session = %id, config = ?self.config, "Bootstrap session created");

        BootstrapSession {
            id,
            config: self.config,
            store,
            event_bus,
            runtime: self.runtime,
            local,
            remote,
            msw,
            mock_server: self.mock_server,
            on_error: self.on_error,
            coordinator,
            loader,
            _bridge: bridge,
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }
}

/// One application bootstrap, from module registration to readiness
///
/// Effects run on the ambient tokio runtime once [`start`](Self::start) is
/// called. Dropping the session stops them.
pub struct BootstrapSession<D>
where
    D: Clone + Send + Sync + 'static,
{
    id: Uuid,
    config: BootstrapConfig,
    store: Arc<BootstrapStore>,
    event_bus: EventBus,
    runtime: ShellRuntime,
    local: Arc<ModuleRegistry<D>>,
    remote: Arc<ModuleRegistry<D>>,
    msw: Arc<MswGate>,
    mock_server: Option<Arc<dyn MockServer>>,
    on_error: Option<ErrorCallback>,
    coordinator: Arc<DeferredRegistrationCoordinator<D>>,
    loader: Arc<DataLoader<D>>,
    _bridge: StatusDispatchBridge<D>,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BootstrapSession<()> {
    /// Session whose deferred registrations receive no data
    pub fn without_data(config: BootstrapConfig) -> Self {
        BootstrapSession::<()>::builder(config, Arc::new(NoDataSource)).build()
    }
}

impl<D> BootstrapSession<D>
where
    D: Clone + Send + Sync + 'static,
{
    pub fn builder(
        config: BootstrapConfig,
        data_source: Arc<dyn BootstrapDataSource<D>>,
    ) -> BootstrapSessionBuilder<D> {
        BootstrapSessionBuilder {
            config,
            data_source,
            mock_server: None,
            on_error: None,
            clock: Arc::new(SystemClock),
            runtime: ShellRuntime::new(),
        }
    }

    /// Register local and remote modules and let the bootstrap run
    ///
    /// Both populations register concurrently. The returned errors are the
    /// phase-1 failures of both; deferred registration failures go to the
    /// error callback only. Readiness is reported through [`state`],
    /// [`subscribe`] and [`wait_until_ready`].
    ///
    /// [`state`]: Self::state
    /// [`subscribe`]: Self::subscribe
    /// [`wait_until_ready`]: Self::wait_until_ready
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyStarted`] on a second call.
    pub async fn start<C>(
        &self,
        local: Vec<ModuleRegistration<C, D>>,
        remote: Vec<ModuleRegistration<C, D>>,
        context: Option<C>,
    ) -> Result<Vec<RegistrationError>>
    where
        C: Clone + Send + 'static,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RegistryError::AlreadyStarted(self.id.to_string()).into());
        }

        info!(
            session = %self.id,
            local_count = local.len(),
            remote_count = remote.len(),
            "Bootstrapping application"
        );
        self.event_bus.emit(BootstrapEvent::BootstrappingStarted);

        {
            let mut tasks = self.tasks.lock();
            tasks.push(Arc::clone(&self.coordinator).spawn());
            tasks.push(Arc::clone(&self.loader).spawn());
        }

        let (local_result, remote_result) = tokio::join!(
            self.local
                .register_modules(local, &self.runtime, context.clone()),
            self.remote.register_modules(remote, &self.runtime, context)
        );
        let mut errors = local_result?;
        errors.extend(remote_result?);

        if !errors.is_empty() {
            warn!(session = %self.id, error_count = errors.len(), "Some modules failed to register");
            if let Some(on_error) = &self.on_error {
                on_error(&errors);
            }
        }

        self.start_mock_server();

        Ok(errors)
    }

    fn start_mock_server(&self) {
        if !self.config.wait_for_msw {
            return;
        }
        let Some(server) = self.mock_server.clone() else {
            debug!(session = %self.id, "No mock server configured, the gate must be set by the host");
            return;
        };

        let gate = Arc::clone(&self.msw);
        let handle = tokio::spawn(async move {
            match server.start().await {
                Ok(()) => {
                    gate.set_ready();
                }
                Err(error) => {
                    error!(error = %format!("{:#}", error), "Mock server failed to start");
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    /// Resolve once the application is ready or the user turned out to be
    /// unauthorized
    pub async fn wait_until_ready(&self) -> Arc<AppRouterState> {
        let mut receiver = self.store.subscribe();
        let settled = receiver
            .wait_for(|state| state.is_app_ready || state.is_unauthorized)
            .await
            .map(|state| Arc::clone(&*state));

        // The sender lives as long as the store, which `self` keeps alive
        settled.unwrap_or_else(|_| self.store.state())
    }

    /// Report the active route by path, looked up in the runtime
    ///
    /// Unknown paths are treated as public.
    pub fn set_active_route(&self, path: &str) -> Arc<AppRouterState> {
        let protected = match self.runtime.route_visibility(path) {
            Some(RouteVisibility::Protected) => true,
            Some(RouteVisibility::Public) => false,
            None => {
                debug!(path, "No route registered for path, assuming public");
                false
            }
        };
        self.set_active_route_protected(protected)
    }

    pub fn set_active_route_protected(&self, protected: bool) -> Arc<AppRouterState> {
        let action = if protected {
            Action::ActiveRouteIsProtected
        } else {
            Action::ActiveRouteIsPublic
        };
        self.store.dispatch(action)
    }

    /// Refetch public data, e.g. after the host changed the language
    pub async fn refresh_public_data(&self) -> std::result::Result<(), DataFetchError> {
        self.loader.load_public_data().await
    }

    pub async fn refresh_protected_data(&self) -> std::result::Result<(), DataFetchError> {
        self.loader.load_protected_data().await
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn state(&self) -> Arc<AppRouterState> {
        self.store.state()
    }

    /// Every state snapshot the store publishes
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppRouterState>> {
        self.store.subscribe()
    }

    /// Lifecycle events emitted after this call
    pub fn events(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    pub fn store(&self) -> &Arc<BootstrapStore> {
        &self.store
    }

    pub fn local_modules(&self) -> &Arc<ModuleRegistry<D>> {
        &self.local
    }

    pub fn remote_modules(&self) -> &Arc<ModuleRegistry<D>> {
        &self.remote
    }

    pub fn msw(&self) -> &Arc<MswGate> {
        &self.msw
    }

    pub fn runtime(&self) -> &ShellRuntime {
        &self.runtime
    }
}

impl<D> Drop for BootstrapSession<D>
where
    D: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}
