//! Public and protected data readiness
//!
//! The host application owns its data; [`BootstrapDataSource`] is how the
//! session asks for it. [`DataLoader`] opens the fetches when the store's
//! gates allow them and reports the outcome back as actions.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::{Action, AppRouterState};
use crate::events::{BootstrapEvent, EventBus};
use crate::store::BootstrapStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataFetchError {
    /// The user is not allowed to read protected data
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Data fetch failed: {0}")]
    Failed(String),
}

/// Data collaborator of a bootstrap session
///
/// `D` is the payload handed to deferred registrations, typically a snapshot
/// of whatever was fetched.
#[async_trait]
pub trait BootstrapDataSource<D>: Send + Sync {
    async fn fetch_public_data(&self) -> Result<(), DataFetchError> {
        Ok(())
    }

    async fn fetch_protected_data(&self) -> Result<(), DataFetchError> {
        Ok(())
    }

    fn deferred_registration_data(&self) -> D;
}

/// Data source for sessions without data
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDataSource;

#[async_trait]
impl BootstrapDataSource<()> for NoDataSource {
    fn deferred_registration_data(&self) {}
}

pub struct DataLoader<D> {
    store: Arc<BootstrapStore>,
    source: Arc<dyn BootstrapDataSource<D>>,
    event_bus: EventBus,
    public_fetch_started: AtomicBool,
    protected_fetch_started: AtomicBool,
}

impl<D> DataLoader<D>
where
    D: Send + 'static,
{
    pub fn new(
        store: Arc<BootstrapStore>,
        source: Arc<dyn BootstrapDataSource<D>>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            source,
            event_bus,
            public_fetch_started: AtomicBool::new(false),
            protected_fetch_started: AtomicBool::new(false),
        }
    }

    /// Start the initial fetches `state` allows, each at most once
    pub fn evaluate(self: &Arc<Self>, state: &AppRouterState) {
        if state.wait_for_public_data
            && state.can_fetch_public_data
            && !state.is_public_data_ready
            && !self.public_fetch_started.swap(true, Ordering::SeqCst)
        {
            let loader = Arc::clone(self);
            tokio::spawn(async move {
                let _ = loader.load_public_data().await;
            });
        }

        if state.wait_for_protected_data
            && state.can_fetch_protected_data
            && !state.is_protected_data_ready
            && !state.is_unauthorized
            && !self.protected_fetch_started.swap(true, Ordering::SeqCst)
        {
            let loader = Arc::clone(self);
            tokio::spawn(async move {
                let _ = loader.load_protected_data().await;
            });
        }
    }

    /// Fetch public data and report it as ready, or as updated when it
    /// already was
    pub async fn load_public_data(&self) -> Result<(), DataFetchError> {
        info!("Fetching public data");
        self.event_bus.emit(BootstrapEvent::PublicDataFetchStarted);

        match self.source.fetch_public_data().await {
            Ok(()) => {
                let action = if self.store.state().is_public_data_ready {
                    Action::PublicDataUpdated
                } else {
                    Action::PublicDataReady
                };
                self.store.dispatch(action);
                Ok(())
            }
            Err(error) => {
                warn!(error = %error, "Public data fetch failed");
                Err(error)
            }
        }
    }

    /// Fetch protected data; an authorization failure marks the session
    /// unauthorized
    pub async fn load_protected_data(&self) -> Result<(), DataFetchError> {
        info!("Fetching protected data");
        self.event_bus.emit(BootstrapEvent::ProtectedDataFetchStarted);

        match self.source.fetch_protected_data().await {
            Ok(()) => {
                let action = if self.store.state().is_protected_data_ready {
                    Action::ProtectedDataUpdated
                } else {
                    Action::ProtectedDataReady
                };
                self.store.dispatch(action);
                Ok(())
            }
            Err(DataFetchError::Unauthorized) => {
                warn!("Protected data fetch was refused, session is unauthorized");
                self.store.dispatch(Action::IsUnauthorized);
                Err(DataFetchError::Unauthorized)
            }
            Err(error) => {
                warn!(error = %error, "Protected data fetch failed");
                Err(error)
            }
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
                    debug!("Store closed, data loader stopping");
                    break;
                }
            }
        })
    }
}
