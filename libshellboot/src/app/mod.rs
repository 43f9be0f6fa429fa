//! Bootstrap readiness state
//!
//! - Actions: what happened
//! - State: what is true right now, plus the derived readiness gates
//! - Reducer: pure function `(State, Action) -> State`
//!
//! Snapshots are shared as `Arc<AppRouterState>`. A transition that changes
//! nothing observable returns the very same `Arc`, so consumers can detect
//! changes with `Arc::ptr_eq`.

pub mod actions;
pub mod reducer;
pub mod state;

pub use actions::Action;
pub use reducer::reduce;
pub use state::AppRouterState;
