//! Module registries
//!
//! A [`ModuleRegistry`] tracks one population of modules (local or remote)
//! through `none -> registering-modules -> modules-registered ->
//! registering-deferred-registrations -> ready`. It is single-use: one
//! registry per origin per bootstrap session.
//!
//! Per-module failures never abort a batch. They are collected and returned
//! as [`RegistrationError`]s. Calling an operation out of order is a misuse
//! and returns [`RegistryError::InvalidOperation`].

pub mod registration;
pub mod status;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use self::registration::{
    DeferredRegistration, DeferredRegistrationOperation, ModuleRegistration, ModuleSource,
};
use self::status::{ModuleOrigin, ModuleRegistrationStatus, RegistrationPhase};
use crate::error::{RegistrationError, RegistryError, Result};
use crate::events::{BootstrapEvent, EventBus};
use crate::listeners::{ListenerId, ListenerSet};
use crate::runtime::ShellRuntime;

pub use self::registration::{RegisterFn, RemoteDefinition, RemoteLoader};

/// Status machine for the modules of one origin
pub struct ModuleRegistry<D> {
    origin: ModuleOrigin,
    inner: Mutex<RegistryInner<D>>,
    listeners: ListenerSet<ModuleRegistrationStatus>,
    event_bus: EventBus,
}

struct RegistryInner<D> {
    status: ModuleRegistrationStatus,
    deferred: Vec<(ModuleSource, DeferredRegistration<D>)>,
    updates_in_flight: usize,
    error_counts: ErrorCounts,
}

#[derive(Default)]
struct ErrorCounts {
    registration: usize,
    deferred: usize,
    update: usize,
}

impl<D> ModuleRegistry<D>
where
    D: Clone + Send + 'static,
{
    pub fn new(origin: ModuleOrigin, event_bus: EventBus) -> Self {
        Self {
            origin,
            inner: Mutex::new(RegistryInner {
                status: ModuleRegistrationStatus::None,
                deferred: Vec::new(),
                updates_in_flight: 0,
                error_counts: ErrorCounts::default(),
            }),
            listeners: ListenerSet::new(),
            event_bus,
        }
    }

    pub fn origin(&self) -> ModuleOrigin {
        self.origin
    }

    pub fn status(&self) -> ModuleRegistrationStatus {
        self.inner.lock().status
    }

    /// True while `update_deferred_registrations` runs; the status stays `Ready`
    pub fn is_updating(&self) -> bool {
        self.inner.lock().updates_in_flight > 0
    }

    pub fn deferred_registration_count(&self) -> usize {
        self.inner.lock().deferred.len()
    }

    pub fn error_count(&self, phase: RegistrationPhase) -> usize {
        let inner = self.inner.lock();
        match phase {
            RegistrationPhase::Registration => inner.error_counts.registration,
            RegistrationPhase::Deferred => inner.error_counts.deferred,
            RegistrationPhase::Update => inner.error_counts.update,
        }
    }

    /// Listen to status transitions
    ///
    /// Listeners run synchronously, once per transition, in registration order.
    pub fn add_status_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(ModuleRegistrationStatus) + Send + Sync + 'static,
    {
        self.listeners.add(listener)
    }

    pub fn remove_status_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Register every module of this origin (phase 1)
    ///
    /// All callbacks run concurrently and the batch completes once every one
    /// of them settled. The registry moves to `modules-registered` when at
    /// least one module returned a deferred registration, otherwise straight
    /// to `ready`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidOperation`] if modules were already
    /// registered. Module failures are returned in the `Ok` list.
    pub async fn register_modules<C>(
        &self,
        modules: Vec<ModuleRegistration<C, D>>,
        runtime: &ShellRuntime,
        context: Option<C>,
    ) -> Result<Vec<RegistrationError>>
    where
        C: Clone + Send + 'static,
    {
        self.begin(
            ModuleRegistrationStatus::None,
            ModuleRegistrationStatus::RegisteringModules,
            "register_modules",
        )?;

        let module_count = modules.len();
        info!(origin = %self.origin, module_count, "Registering modules");
        self.event_bus.emit(BootstrapEvent::ModulesRegistrationStarted {
            origin: self.origin,
            module_count,
        });
        self.listeners
            .notify(ModuleRegistrationStatus::RegisteringModules);

        let outcomes = join_all(modules.into_iter().map(|module| {
            let (source, register) = module.into_parts();
            let registration = register(runtime.clone(), context.clone());
            async move { (source, registration.await) }
        }))
        .await;

        let mut errors = Vec::new();
        let mut deferred = Vec::new();
        for (source, outcome) in outcomes {
            match outcome {
                Ok(Some(registration)) => deferred.push((source, registration)),
                Ok(None) => {}
                Err(error) => {
                    let error = source.to_error(&error);
                    warn!(origin = %self.origin, error = %error, "Module registration failed");
                    errors.push(error);
                }
            }
        }

        let deferred_count = deferred.len();
        let next = if deferred.is_empty() {
            ModuleRegistrationStatus::Ready
        } else {
            ModuleRegistrationStatus::ModulesRegistered
        };

        {
            let mut inner = self.inner.lock();
            inner.deferred = deferred;
            inner.error_counts.registration += errors.len();
            inner.status = next;
        }

        info!(
            origin = %self.origin,
            error_count = errors.len(),
            deferred_count,
            status = %next,
            "Modules registered"
        );
        self.event_bus
            .emit(BootstrapEvent::ModulesRegistrationCompleted {
                origin: self.origin,
                error_count: errors.len(),
                deferred_count,
            });
        self.listeners.notify(next);

        Ok(errors)
    }

    /// Invoke every deferred registration once with `data` (phase 3)
    ///
    /// The registry ends up `ready` even when some deferred registrations
    /// failed. A registry whose modules returned no deferred registration is
    /// already `ready`; for it this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidOperation`] before phase 1 completed
    /// or once deferred registrations already ran.
    pub async fn register_deferred_registrations(
        &self,
        data: D,
    ) -> Result<Vec<RegistrationError>> {
        let registrations = {
            let mut inner = self.inner.lock();
            match inner.status {
                ModuleRegistrationStatus::ModulesRegistered => {}
                ModuleRegistrationStatus::Ready if inner.deferred.is_empty() => {
                    debug!(origin = %self.origin, "No deferred registrations to run");
                    return Ok(Vec::new());
                }
                status => {
                    return Err(RegistryError::InvalidOperation {
                        origin: self.origin,
                        operation: "register_deferred_registrations",
                        status,
                    }
                    .into())
                }
            }
            inner.status = ModuleRegistrationStatus::RegisteringDeferredRegistrations;
            inner.deferred.clone()
        };

        info!(
            origin = %self.origin,
            registration_count = registrations.len(),
            "Registering deferred registrations"
        );
        self.event_bus
            .emit(BootstrapEvent::DeferredRegistrationsStarted {
                origin: self.origin,
                registration_count: registrations.len(),
            });
        self.listeners
            .notify(ModuleRegistrationStatus::RegisteringDeferredRegistrations);

        let errors = self
            .invoke_deferred(registrations, data, DeferredRegistrationOperation::Register)
            .await;

        {
            let mut inner = self.inner.lock();
            inner.error_counts.deferred += errors.len();
            inner.status = ModuleRegistrationStatus::Ready;
        }

        info!(origin = %self.origin, error_count = errors.len(), "Deferred registrations completed");
        self.event_bus
            .emit(BootstrapEvent::DeferredRegistrationsCompleted {
                origin: self.origin,
                error_count: errors.len(),
            });
        self.listeners.notify(ModuleRegistrationStatus::Ready);

        Ok(errors)
    }

    /// Re-invoke every deferred registration with new `data`
    ///
    /// The registry stays `ready` and no status listener is notified. Any
    /// number of calls is allowed once the registry is ready.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidOperation`] when the registry is not
    /// `ready` yet.
    pub async fn update_deferred_registrations(&self, data: D) -> Result<Vec<RegistrationError>> {
        let registrations = {
            let mut inner = self.inner.lock();
            if inner.status != ModuleRegistrationStatus::Ready {
                return Err(RegistryError::InvalidOperation {
                    origin: self.origin,
                    operation: "update_deferred_registrations",
                    status: inner.status,
                }
                .into());
            }
            if inner.deferred.is_empty() {
                return Ok(Vec::new());
            }
            inner.updates_in_flight += 1;
            inner.deferred.clone()
        };

        debug!(
            origin = %self.origin,
            registration_count = registrations.len(),
            "Updating deferred registrations"
        );
        self.event_bus
            .emit(BootstrapEvent::DeferredRegistrationsUpdateStarted {
                origin: self.origin,
                registration_count: registrations.len(),
            });

        let errors = self
            .invoke_deferred(registrations, data, DeferredRegistrationOperation::Update)
            .await;

        {
            let mut inner = self.inner.lock();
            inner.error_counts.update += errors.len();
            inner.updates_in_flight -= 1;
        }

        self.event_bus
            .emit(BootstrapEvent::DeferredRegistrationsUpdateCompleted {
                origin: self.origin,
                error_count: errors.len(),
            });

        Ok(errors)
    }

    fn begin(
        &self,
        expected: ModuleRegistrationStatus,
        next: ModuleRegistrationStatus,
        operation: &'static str,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.status != expected {
            return Err(RegistryError::InvalidOperation {
                origin: self.origin,
                operation,
                status: inner.status,
            }
            .into());
        }
        inner.status = next;
        Ok(())
    }

    async fn invoke_deferred(
        &self,
        registrations: Vec<(ModuleSource, DeferredRegistration<D>)>,
        data: D,
        operation: DeferredRegistrationOperation,
    ) -> Vec<RegistrationError> {
        let outcomes = join_all(registrations.into_iter().map(|(source, registration)| {
            let invocation = registration.invoke(data.clone(), operation);
            async move { (source, invocation.await) }
        }))
        .await;

        outcomes
            .into_iter()
            .filter_map(|(source, outcome)| outcome.err().map(|error| source.to_error(&error)))
            .inspect(|error| {
                warn!(origin = %self.origin, ?operation, error = %error, "Deferred registration failed");
            })
            .collect()
    }
}
