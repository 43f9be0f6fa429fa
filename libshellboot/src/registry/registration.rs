//! Registration callbacks and the contracts of module sources
//!
//! A module is registered by a callback receiving the [`ShellRuntime`] and an
//! optional context. The callback may return a [`DeferredRegistration`],
//! invoked later with data that only exists once phase 1 is over.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use super::status::ModuleOrigin;
use crate::error::RegistrationError;
use crate::runtime::ShellRuntime;

/// Future returned by a registration callback
pub type RegisterFuture<D> = BoxFuture<'static, anyhow::Result<Option<DeferredRegistration<D>>>>;

/// A module's registration callback, invoked exactly once
pub type RegisterFn<C, D> = Box<dyn FnOnce(ShellRuntime, Option<C>) -> RegisterFuture<D> + Send>;

type DeferredFn<D> =
    dyn Fn(D, DeferredRegistrationOperation) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// Box an async closure into a [`RegisterFn`]
pub fn register_fn<C, D, F, Fut>(register: F) -> RegisterFn<C, D>
where
    C: 'static,
    D: 'static,
    F: FnOnce(ShellRuntime, Option<C>) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<Option<DeferredRegistration<D>>>> + Send + 'static,
{
    Box::new(
        move |runtime: ShellRuntime, context: Option<C>| -> RegisterFuture<D> {
            Box::pin(register(runtime, context))
        },
    )
}

/// Why a deferred registration is being invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferredRegistrationOperation {
    /// First invocation, completes phase 3
    Register,
    /// Re-invocation after the data changed
    Update,
}

/// Second-phase registration returned by a module's registration callback
pub struct DeferredRegistration<D> {
    callback: Arc<DeferredFn<D>>,
}

impl<D> Clone for DeferredRegistration<D> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<D: 'static> DeferredRegistration<D> {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(D, DeferredRegistrationOperation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            callback: Arc::new(
                move |data: D,
                      operation: DeferredRegistrationOperation|
                      -> BoxFuture<'static, anyhow::Result<()>> {
                    Box::pin(callback(data, operation))
                },
            ),
        }
    }

    pub(crate) fn invoke(
        &self,
        data: D,
        operation: DeferredRegistrationOperation,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.callback)(data, operation)
    }
}

/// Identity of a module, used to tag its registration errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum ModuleSource {
    Local {
        module_name: Option<String>,
    },
    Remote {
        remote_name: String,
        module_name: Option<String>,
    },
}

impl ModuleSource {
    pub fn origin(&self) -> ModuleOrigin {
        match self {
            ModuleSource::Local { .. } => ModuleOrigin::Local,
            ModuleSource::Remote { .. } => ModuleOrigin::Remote,
        }
    }

    pub(crate) fn to_error(&self, error: &anyhow::Error) -> RegistrationError {
        let message = format!("{:#}", error);
        match self {
            ModuleSource::Local { module_name } => RegistrationError::Local {
                module_name: module_name.clone(),
                message,
            },
            ModuleSource::Remote {
                remote_name,
                module_name,
            } => RegistrationError::Remote {
                remote_name: remote_name.clone(),
                module_name: module_name.clone(),
                message,
            },
        }
    }
}

/// A module waiting to be registered
pub struct ModuleRegistration<C, D> {
    source: ModuleSource,
    register: RegisterFn<C, D>,
}

impl<C, D> ModuleRegistration<C, D>
where
    C: Send + 'static,
    D: Send + 'static,
{
    /// A module bundled with the shell
    pub fn local<F, Fut>(module_name: Option<&str>, register: F) -> Self
    where
        F: FnOnce(ShellRuntime, Option<C>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<DeferredRegistration<D>>>> + Send + 'static,
    {
        Self {
            source: ModuleSource::Local {
                module_name: module_name.map(str::to_string),
            },
            register: register_fn(register),
        }
    }

    /// A remote module whose registration callback is already resolved
    pub fn remote_module<F, Fut>(remote_name: &str, module_name: Option<&str>, register: F) -> Self
    where
        F: FnOnce(ShellRuntime, Option<C>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<DeferredRegistration<D>>>> + Send + 'static,
    {
        Self {
            source: ModuleSource::Remote {
                remote_name: remote_name.to_string(),
                module_name: module_name.map(str::to_string),
            },
            register: register_fn(register),
        }
    }

    /// A remote module resolved by `loader` when registration starts
    ///
    /// Load failures are reported like registration failures, tagged with
    /// the remote's name.
    pub fn remote(definition: RemoteDefinition, loader: Arc<dyn RemoteLoader<C, D>>) -> Self {
        let source = ModuleSource::Remote {
            remote_name: definition.name.clone(),
            module_name: None,
        };

        let register = register_fn(move |runtime, context| async move {
            let register = loader.load(&definition).await?;
            register(runtime, context).await
        });

        Self { source, register }
    }

    pub fn source(&self) -> &ModuleSource {
        &self.source
    }

    pub(crate) fn into_parts(self) -> (ModuleSource, RegisterFn<C, D>) {
        (self.source, self.register)
    }
}

/// Where to find a remote module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDefinition {
    pub name: String,
    pub url: Option<String>,
}

impl RemoteDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
        }
    }
}

/// Resolves a remote module's registration callback
///
/// The transport is up to the implementation. Errors must be returned, not
/// panicked: they end up in the remote registry's error list.
#[async_trait]
pub trait RemoteLoader<C, D>: Send + Sync {
    async fn load(&self, remote: &RemoteDefinition) -> anyhow::Result<RegisterFn<C, D>>;
}
