//! Registration status of a module registry

use serde::{Deserialize, Serialize};

/// Lifecycle of a module registry.
///
/// Variants are declared in lifecycle order, so `Ord` compares progress:
/// a registry is "registered" once it is `>= ModulesRegistered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleRegistrationStatus {
    None,
    RegisteringModules,
    ModulesRegistered,
    RegisteringDeferredRegistrations,
    Ready,
}

impl ModuleRegistrationStatus {
    /// Phase 1 is done (deferred registrations may still be pending)
    pub fn is_registered(self) -> bool {
        self >= ModuleRegistrationStatus::ModulesRegistered
    }

    pub fn is_ready(self) -> bool {
        self == ModuleRegistrationStatus::Ready
    }
}

impl std::fmt::Display for ModuleRegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModuleRegistrationStatus::None => "none",
            ModuleRegistrationStatus::RegisteringModules => "registering-modules",
            ModuleRegistrationStatus::ModulesRegistered => "modules-registered",
            ModuleRegistrationStatus::RegisteringDeferredRegistrations => {
                "registering-deferred-registrations"
            }
            ModuleRegistrationStatus::Ready => "ready",
        };
        write!(f, "{}", name)
    }
}

/// Where the modules of a registry come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleOrigin {
    /// Bundled with the shell
    Local,
    /// Loaded from a remote origin at runtime
    Remote,
}

impl std::fmt::Display for ModuleOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleOrigin::Local => write!(f, "local"),
            ModuleOrigin::Remote => write!(f, "remote"),
        }
    }
}

/// Phases errors are counted against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationPhase {
    Registration,
    Deferred,
    Update,
}
