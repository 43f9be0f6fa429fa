//! Fixtures shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use libshellboot::data::{BootstrapDataSource, DataFetchError};
use libshellboot::events::EventReceiver;
use libshellboot::msw::MockServer;
use libshellboot::registry::registration::{DeferredRegistration, ModuleRegistration};
use libshellboot::runtime::{Route, ShellRuntime};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Data source with fixed latencies that counts its fetches
#[derive(Default)]
pub struct TestData {
    pub public_delay: Duration,
    pub protected_delay: Duration,
    /// Refuse the first protected fetch
    pub refuse_protected_once: AtomicBool,
    pub public_fetches: AtomicUsize,
    pub protected_fetches: AtomicUsize,
}

#[async_trait]
impl BootstrapDataSource<usize> for TestData {
    async fn fetch_public_data(&self) -> Result<(), DataFetchError> {
        tokio::time::sleep(self.public_delay).await;
        self.public_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_protected_data(&self) -> Result<(), DataFetchError> {
        tokio::time::sleep(self.protected_delay).await;
        self.protected_fetches.fetch_add(1, Ordering::SeqCst);
        if self.refuse_protected_once.swap(false, Ordering::SeqCst) {
            return Err(DataFetchError::Unauthorized);
        }
        Ok(())
    }

    /// Deferred registrations see how many times public data was fetched
    fn deferred_registration_data(&self) -> usize {
        self.public_fetches.load(Ordering::SeqCst)
    }
}

pub struct DelayedMockServer(pub Duration);

#[async_trait]
impl MockServer for DelayedMockServer {
    async fn start(&self) -> anyhow::Result<()> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }
}

/// How a test module behaves
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleBehavior {
    pub delay: Duration,
    pub fails: bool,
    pub deferred: bool,
    pub deferred_fails: bool,
}

impl ModuleBehavior {
    pub fn after(millis: u64) -> Self {
        Self {
            delay: Duration::from_millis(millis),
            ..Self::default()
        }
    }

    pub fn with_deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fails = true;
        self
    }
}

/// Counts invocations of the deferred registrations built by [`module`]
pub type DeferredCalls = Arc<AtomicUsize>;

pub fn local_module(
    name: &str,
    behavior: ModuleBehavior,
    calls: &DeferredCalls,
) -> ModuleRegistration<(), usize> {
    let path = format!("/{}", name);
    let calls = Arc::clone(calls);
    ModuleRegistration::local(Some(name), move |runtime: ShellRuntime, _context| {
        register(runtime, path, behavior, calls)
    })
}

pub fn remote_module(
    remote_name: &str,
    behavior: ModuleBehavior,
    calls: &DeferredCalls,
) -> ModuleRegistration<(), usize> {
    let path = format!("/remote/{}", remote_name);
    let calls = Arc::clone(calls);
    ModuleRegistration::remote_module(remote_name, None, move |runtime: ShellRuntime, _context| {
        register(runtime, path, behavior, calls)
    })
}

async fn register(
    runtime: ShellRuntime,
    path: String,
    behavior: ModuleBehavior,
    calls: DeferredCalls,
) -> anyhow::Result<Option<DeferredRegistration<usize>>> {
    tokio::time::sleep(behavior.delay).await;
    if behavior.fails {
        anyhow::bail!("module at {} failed to register", path);
    }
    runtime.register_route(Route::public(path));

    if !behavior.deferred {
        return Ok(None);
    }
    Ok(Some(DeferredRegistration::new(move |_data: usize, _operation| {
        let calls = Arc::clone(&calls);
        async move {
            tokio::time::sleep(behavior.delay).await;
            calls.fetch_add(1, Ordering::SeqCst);
            if behavior.deferred_fails {
                anyhow::bail!("deferred registration failed");
            }
            Ok(())
        }
    })))
}

/// Names of every event received so far
pub fn drain(receiver: &mut EventReceiver) -> Vec<String> {
    std::iter::from_fn(|| receiver.try_recv().ok())
        .map(|event| event.name())
        .collect()
}

pub fn position(names: &[String], name: &str) -> Option<usize> {
    names.iter().position(|candidate| candidate == name)
}
