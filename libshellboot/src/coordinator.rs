//! Runs deferred registrations when the store's gates open
//!
//! Two effects, re-evaluated on every published snapshot:
//! - `can_register_deferred_registrations`: run phase 3 on both registries,
//!   then dispatch `modules-ready` whatever the errors were.
//! - `can_update_deferred_registrations`: re-run deferred registrations with
//!   the latest data, then dispatch `deferred-registrations-updated`.
//!
//! Neither effect runs twice concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::app::{Action, AppRouterState};
use crate::data::BootstrapDataSource;
use crate::error::{RegistrationError, Result};
use crate::registry::ModuleRegistry;
use crate::store::BootstrapStore;

/// Receives every non-empty batch of registration errors
pub type ErrorCallback = Arc<dyn Fn(&[RegistrationError]) + Send + Sync>;

pub struct DeferredRegistrationCoordinator<D> {
    store: Arc<BootstrapStore>,
    local: Arc<ModuleRegistry<D>>,
    remote: Arc<ModuleRegistry<D>>,
    data: Arc<dyn BootstrapDataSource<D>>,
    on_error: Option<ErrorCallback>,
    registration_started: AtomicBool,
    update_in_flight: AtomicBool,
}

impl<D> DeferredRegistrationCoordinator<D>
where
    D: Clone + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<BootstrapStore>,
        local: Arc<ModuleRegistry<D>>,
        remote: Arc<ModuleRegistry<D>>,
        data: Arc<dyn BootstrapDataSource<D>>,
        on_error: Option<ErrorCallback>,
    ) -> Self {
        Self {
            store,
            local,
            remote,
            data,
            on_error,
            registration_started: AtomicBool::new(false),
            update_in_flight: AtomicBool::new(false),
        }
    }

    /// Start whichever effect `state` allows and is not already running
    pub fn evaluate(self: &Arc<Self>, state: &AppRouterState) {
        if state.can_register_deferred_registrations
            && !self.registration_started.swap(true, Ordering::SeqCst)
        {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(error) = coordinator.register_deferred_registrations().await {
                    error!(error = %error, "Deferred registrations could not run");
                }
            });
        }

        if state.can_update_deferred_registrations
            && !self.update_in_flight.swap(true, Ordering::SeqCst)
        {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(error) = coordinator.update_deferred_registrations().await {
                    error!(error = %error, "Deferred registrations could not be updated");
                }
                coordinator.update_in_flight.store(false, Ordering::SeqCst);
                // Snapshots published while the update ran were skipped
                let state = coordinator.store.state();
                coordinator.evaluate(&state);
            });
        }
    }

    /// Phase 3 on both registries, concurrently
    ///
    /// # Errors
    ///
    /// Only registry misuse is an error; failing deferred registrations are
    /// reported to the error callback and returned.
    pub async fn register_deferred_registrations(&self) -> Result<Vec<RegistrationError>> {
        let data = self.data.deferred_registration_data();
        info!("Registering deferred registrations");

        let (local, remote) = tokio::join!(
            self.local.register_deferred_registrations(data.clone()),
            self.remote.register_deferred_registrations(data)
        );
        let mut errors = local?;
        errors.extend(remote?);

        self.report(&errors);
        self.store.dispatch(Action::ModulesReady);

        Ok(errors)
    }

    /// Re-run deferred registrations on both registries with the latest data
    ///
    /// Data that changed while a round ran is covered by the round's
    /// completion stamp, so rounds repeat until the data timestamps stay put.
    ///
    /// # Errors
    ///
    /// Only registry misuse is an error.
    pub async fn update_deferred_registrations(&self) -> Result<Vec<RegistrationError>> {
        let mut errors = Vec::new();
        loop {
            let data_updated_at = latest_data_update(&self.store.state());
            let data = self.data.deferred_registration_data();
            debug!("Updating deferred registrations");

            let (local, remote) = tokio::join!(
                self.local.update_deferred_registrations(data.clone()),
                self.remote.update_deferred_registrations(data)
            );
            let mut round = local?;
            round.extend(remote?);

            self.report(&round);
            errors.extend(round);
            let state = self.store.dispatch(Action::DeferredRegistrationsUpdated);

            if latest_data_update(&state) == data_updated_at {
                return Ok(errors);
            }
            debug!("Data changed during the update, updating again");
        }
    }

    /// Re-evaluate on every published snapshot until the store goes away
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let mut receiver = self.store.subscribe();
        tokio::spawn(async move {
            loop {
                let state = Arc::clone(&*receiver.borrow_and_update());
                self.evaluate(&state);
                if receiver.changed().await.is_err() {
                    debug!("Store closed, coordinator stopping");
                    break;
                }
            }
        })
    }

    fn report(&self, errors: &[RegistrationError]) {
        if errors.is_empty() {
            return;
        }
        if let Some(on_error) = &self.on_error {
            on_error(errors);
        }
    }
}

fn latest_data_update(state: &AppRouterState) -> Option<i64> {
    state.public_data_updated_at.max(state.protected_data_updated_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataFetchError;
    use crate::events::EventBus;
    use crate::registry::registration::{DeferredRegistration, ModuleRegistration};
    use crate::registry::status::{ModuleOrigin, ModuleRegistrationStatus};
    use crate::runtime::ShellRuntime;
    use crate::store::SystemClock;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    struct FixedData(u32);

    #[async_trait]
    impl BootstrapDataSource<u32> for FixedData {
        async fn fetch_public_data(&self) -> std::result::Result<(), DataFetchError> {
            Ok(())
        }

        fn deferred_registration_data(&self) -> u32 {
            self.0
        }
    }

    struct Fixture {
        store: Arc<BootstrapStore>,
        local: Arc<ModuleRegistry<u32>>,
        remote: Arc<ModuleRegistry<u32>>,
        coordinator: Arc<DeferredRegistrationCoordinator<u32>>,
        reported: Arc<Mutex<Vec<RegistrationError>>>,
    }

    fn fixture() -> Fixture {
        let event_bus = EventBus::new(64);
        let store = Arc::new(BootstrapStore::new(
            AppRouterState::new(false, false, false),
            Arc::new(SystemClock),
            event_bus.clone(),
        ));
        let local: Arc<ModuleRegistry<u32>> =
            Arc::new(ModuleRegistry::new(ModuleOrigin::Local, event_bus.clone()));
        let remote: Arc<ModuleRegistry<u32>> =
            Arc::new(ModuleRegistry::new(ModuleOrigin::Remote, event_bus));
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let on_error: ErrorCallback = Arc::new(move |errors: &[RegistrationError]| {
            sink.lock().extend_from_slice(errors)
        });
        let data: Arc<dyn BootstrapDataSource<u32>> = Arc::new(FixedData(42));
        let coordinator = Arc::new(DeferredRegistrationCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&local),
            Arc::clone(&remote),
            data,
            Some(on_error),
        ));
        Fixture {
            store,
            local,
            remote,
            coordinator,
            reported,
        }
    }

    fn counting_module(calls: Arc<AtomicUsize>, fail: bool) -> ModuleRegistration<(), u32> {
        ModuleRegistration::remote_module("remote-a", Some("mod"), move |_runtime, _context| {
            async move {
                Ok(Some(DeferredRegistration::new(move |data: u32, _operation| {
                    let calls = Arc::clone(&calls);
                    async move {
                        assert_eq!(data, 42);
                        calls.fetch_add(1, Ordering::SeqCst);
                        if fail {
                            anyhow::bail!("deferred failure");
                        }
                        Ok(())
                    }
                })))
            }
        })
    }

    async fn register_phase_one(fixture: &Fixture, remote_modules: Vec<ModuleRegistration<(), u32>>) {
        fixture
            .local
            .register_modules(Vec::<ModuleRegistration<(), u32>>::new(), &ShellRuntime::new(), None)
            .await
            .unwrap();
        fixture
            .remote
            .register_modules(remote_modules, &ShellRuntime::new(), None)
            .await
            .unwrap();
        fixture.store.dispatch(Action::ModulesRegistered);
    }

    #[tokio::test]
    async fn test_failures_are_reported_and_modules_still_ready() {
        let fixture = fixture();
        let calls = Arc::new(AtomicUsize::new(0));
        register_phase_one(&fixture, vec![counting_module(Arc::clone(&calls), true)]).await;

        let errors = fixture.coordinator.register_deferred_registrations().await.unwrap();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].remote_name(), Some("remote-a"));
        assert_eq!(fixture.reported.lock().len(), 1);
        assert_eq!(fixture.remote.status(), ModuleRegistrationStatus::Ready);
        assert!(fixture.store.state().are_modules_ready);
        assert!(fixture.store.state().is_app_ready);
    }

    #[tokio::test]
    async fn test_spawned_coordinator_runs_registration_once() {
        let fixture = fixture();
        let calls = Arc::new(AtomicUsize::new(0));
        let task = Arc::clone(&fixture.coordinator).spawn();
        let mut receiver = fixture.store.subscribe();

        register_phase_one(&fixture, vec![counting_module(Arc::clone(&calls), false)]).await;
        receiver.wait_for(|state| state.are_modules_ready).await.unwrap();

        // Unrelated state changes do not start phase 3 again
        fixture.store.dispatch(Action::ActiveRouteIsProtected);
        fixture.store.dispatch(Action::ActiveRouteIsPublic);
        tokio::task::yield_now().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(fixture.reported.lock().is_empty());
        task.abort();
    }

    #[tokio::test]
    async fn test_update_runs_after_data_changes() {
        let fixture = fixture();
        let calls = Arc::new(AtomicUsize::new(0));
        let task = Arc::clone(&fixture.coordinator).spawn();
        let mut receiver = fixture.store.subscribe();

        register_phase_one(&fixture, vec![counting_module(Arc::clone(&calls), false)]).await;
        receiver.wait_for(|state| state.are_modules_ready).await.unwrap();
        let ready_at = fixture.store.state().deferred_registrations_updated_at;

        fixture.store.dispatch(Action::PublicDataUpdated);
        let state = receiver
            .wait_for(|state| state.deferred_registrations_updated_at > ready_at)
            .await
            .unwrap()
            .clone();

        assert!(!state.can_update_deferred_registrations);
        assert!(state.deferred_registrations_updated_at > state.public_data_updated_at);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        task.abort();
    }

    #[tokio::test]
    async fn test_register_before_phase_one_is_misuse() {
        let fixture = fixture();

        assert!(fixture
            .coordinator
            .register_deferred_registrations()
            .await
            .is_err());
        assert!(!fixture.store.state().are_modules_ready);
    }
}
