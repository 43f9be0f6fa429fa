//! Pure reducer for bootstrap state transitions
//!
//! `reduce` has no side effects: no I/O, no clock. The store supplies the
//! timestamp of the transition.

use std::sync::Arc;

use super::actions::Action;
use super::state::AppRouterState;

/// Apply `action` to `state` at time `now` (milliseconds)
///
/// Returns the same `Arc` when nothing observable changed, for instance when
/// a `*-ready` action is dispatched a second time. Readiness flags only ever
/// go from false to true.
pub fn reduce(state: Arc<AppRouterState>, action: Action, now: i64) -> Arc<AppRouterState> {
    let mut next = AppRouterState::clone(&state);
    apply(&mut next, action, now);
    derive(&mut next);

    if next == *state {
        state
    } else {
        Arc::new(next)
    }
}

fn apply(state: &mut AppRouterState, action: Action, now: i64) {
    match action {
        Action::ModulesRegistered => state.are_modules_registered = true,
        Action::ModulesReady => {
            if !state.are_modules_ready {
                state.are_modules_ready = true;
                // Reaching readiness means phase 3 just ran
                state.deferred_registrations_updated_at = Some(now);
            }
        }
        Action::MswReady => state.is_msw_ready = true,
        Action::PublicDataReady => {
            if !state.is_public_data_ready {
                state.is_public_data_ready = true;
                state.public_data_updated_at = Some(now);
            }
        }
        Action::ProtectedDataReady => {
            if !state.is_protected_data_ready {
                state.is_protected_data_ready = true;
                state.protected_data_updated_at = Some(now);
            }
        }
        Action::PublicDataUpdated => state.public_data_updated_at = Some(now),
        Action::ProtectedDataUpdated => state.protected_data_updated_at = Some(now),
        Action::DeferredRegistrationsUpdated => {
            state.deferred_registrations_updated_at = Some(now)
        }
        Action::ActiveRouteIsPublic => state.is_active_route_protected = false,
        Action::ActiveRouteIsProtected => state.is_active_route_protected = true,
        Action::IsUnauthorized => state.is_unauthorized = true,
    }
}

/// Recompute every derived gate from the facts, in a fixed order
pub(crate) fn derive(state: &mut AppRouterState) {
    let modules_registered = state.are_modules_registered || state.are_modules_ready;
    let msw_satisfied = !state.wait_for_msw || state.is_msw_ready;
    let public_data_satisfied = !state.wait_for_public_data || state.is_public_data_ready;
    let protected_data_satisfied = !state.wait_for_protected_data
        || !state.is_active_route_protected
        || state.is_protected_data_ready;

    state.can_fetch_public_data =
        state.is_public_data_ready || (modules_registered && msw_satisfied);

    state.can_fetch_protected_data = state.is_protected_data_ready
        || (modules_registered && msw_satisfied && state.is_active_route_protected);

    state.can_register_deferred_registrations = !state.is_unauthorized
        && state.are_modules_registered
        && !state.are_modules_ready
        && public_data_satisfied
        && protected_data_satisfied;

    state.can_update_deferred_registrations = state.are_modules_ready
        && match state.deferred_registrations_updated_at {
            Some(deferred_at) => {
                is_newer(state.public_data_updated_at, deferred_at)
                    || is_newer(state.protected_data_updated_at, deferred_at)
            }
            None => false,
        };

    state.is_app_ready = !state.is_unauthorized
        && state.are_modules_ready
        && msw_satisfied
        && public_data_satisfied
        && protected_data_satisfied;
}

fn is_newer(timestamp: Option<i64>, than: i64) -> bool {
    timestamp.is_some_and(|timestamp| timestamp > than)
}
