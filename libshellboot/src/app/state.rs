//! Bootstrap state
//!
//! All transitions happen through the reducer (see `reducer.rs`).

use serde::{Deserialize, Serialize};

use crate::config::BootstrapConfig;

/// Root bootstrap state of a session
///
/// Created once per session. Consumers only ever see it behind an `Arc`
/// handed out by the store, never mutably.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRouterState {
    // Policy, fixed at construction
    pub wait_for_msw: bool,
    pub wait_for_public_data: bool,
    pub wait_for_protected_data: bool,

    // Facts reported through actions
    pub are_modules_registered: bool,
    pub are_modules_ready: bool,
    pub is_msw_ready: bool,
    pub is_public_data_ready: bool,
    pub is_protected_data_ready: bool,
    pub is_unauthorized: bool,
    pub is_active_route_protected: bool,

    /// Milliseconds, strictly increasing within a session
    pub public_data_updated_at: Option<i64>,
    pub protected_data_updated_at: Option<i64>,
    pub deferred_registrations_updated_at: Option<i64>,

    // Derived gates, recomputed after every transition
    pub can_fetch_public_data: bool,
    pub can_fetch_protected_data: bool,
    pub can_register_deferred_registrations: bool,
    pub can_update_deferred_registrations: bool,
    pub is_app_ready: bool,
}

impl AppRouterState {
    pub fn new(wait_for_msw: bool, wait_for_public_data: bool, wait_for_protected_data: bool) -> Self {
        let mut state = Self {
            wait_for_msw,
            wait_for_public_data,
            wait_for_protected_data,
            are_modules_registered: false,
            are_modules_ready: false,
            is_msw_ready: false,
            is_public_data_ready: false,
            is_protected_data_ready: false,
            is_unauthorized: false,
            is_active_route_protected: false,
            public_data_updated_at: None,
            protected_data_updated_at: None,
            deferred_registrations_updated_at: None,
            can_fetch_public_data: false,
            can_fetch_protected_data: false,
            can_register_deferred_registrations: false,
            can_update_deferred_registrations: false,
            is_app_ready: false,
        };
        super::reducer::derive(&mut state);
        state
    }

    pub fn from_config(config: &BootstrapConfig) -> Self {
        Self::new(
            config.wait_for_msw,
            config.wait_for_public_data,
            config.wait_for_protected_data,
        )
    }

    /// The render layer should hand off to an authentication boundary
    pub fn should_redirect_to_login(&self) -> bool {
        self.is_unauthorized
    }

    /// The render layer should keep showing its fallback view
    pub fn should_render_fallback(&self) -> bool {
        !self.is_app_ready && !self.is_unauthorized
    }
}
