//! Actions for the bootstrap reducer

use serde::{Deserialize, Serialize};

/// Everything that can move the bootstrap state forward
///
/// The set is closed: `reduce` matches exhaustively on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Both registries completed phase 1
    ModulesRegistered,

    /// Both registries are ready; implies deferred registrations ran
    ModulesReady,

    MswReady,

    PublicDataReady,

    ProtectedDataReady,

    /// Public data changed after it was first ready
    PublicDataUpdated,

    /// Protected data changed after it was first ready
    ProtectedDataUpdated,

    /// Deferred registrations were re-run with the latest data
    DeferredRegistrationsUpdated,

    ActiveRouteIsPublic,

    ActiveRouteIsProtected,

    /// A protected data fetch was refused; sticky for the session
    IsUnauthorized,
}

impl Action {
    pub const ALL: [Action; 11] = [
        Action::ModulesRegistered,
        Action::ModulesReady,
        Action::MswReady,
        Action::PublicDataReady,
        Action::ProtectedDataReady,
        Action::PublicDataUpdated,
        Action::ProtectedDataUpdated,
        Action::DeferredRegistrationsUpdated,
        Action::ActiveRouteIsPublic,
        Action::ActiveRouteIsProtected,
        Action::IsUnauthorized,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::ModulesRegistered => "modules-registered",
            Action::ModulesReady => "modules-ready",
            Action::MswReady => "msw-ready",
            Action::PublicDataReady => "public-data-ready",
            Action::ProtectedDataReady => "protected-data-ready",
            Action::PublicDataUpdated => "public-data-updated",
            Action::ProtectedDataUpdated => "protected-data-updated",
            Action::DeferredRegistrationsUpdated => "deferred-registrations-updated",
            Action::ActiveRouteIsPublic => "active-route-is-public",
            Action::ActiveRouteIsProtected => "active-route-is-protected",
            Action::IsUnauthorized => "is-unauthorized",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_names_match_display() {
        for action in Action::ALL {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action));

            let parsed: Action = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, action);
        }
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        assert!(serde_json::from_str::<Action>("\"modules-exploded\"").is_err());
    }
}
