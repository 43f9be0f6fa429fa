//! Runtime handle shared with every module registration
//!
//! Modules use it to contribute routes and navigation items. Only a flat
//! list is kept; building a route tree is the rendering layer's job.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Whether a route can be rendered without an authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteVisibility {
    Public,
    Protected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub path: String,
    pub visibility: RouteVisibility,
}

impl Route {
    pub fn public(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            visibility: RouteVisibility::Public,
        }
    }

    pub fn protected(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            visibility: RouteVisibility::Protected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationItem {
    pub label: String,
    pub to: String,
    /// Menu section, `None` for the root menu
    pub section: Option<String>,
}

/// Cheap-clone handle; clones share the same registrations
#[derive(Clone, Default)]
pub struct ShellRuntime {
    inner: Arc<RwLock<RuntimeRegistrations>>,
}

#[derive(Default)]
struct RuntimeRegistrations {
    routes: Vec<Route>,
    navigation_items: Vec<NavigationItem>,
}

impl ShellRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route; a later registration for the same path replaces it
    pub fn register_route(&self, route: Route) {
        let mut inner = self.inner.write();
        inner.routes.retain(|existing| existing.path != route.path);
        inner.routes.push(route);
    }

    pub fn register_navigation_item(&self, item: NavigationItem) {
        self.inner.write().navigation_items.push(item);
    }

    pub fn routes(&self) -> Vec<Route> {
        self.inner.read().routes.clone()
    }

    pub fn navigation_items(&self) -> Vec<NavigationItem> {
        self.inner.read().navigation_items.clone()
    }

    /// Navigation items of a menu section (`None` = root menu)
    pub fn navigation_items_in(&self, section: Option<&str>) -> Vec<NavigationItem> {
        self.inner
            .read()
            .navigation_items
            .iter()
            .filter(|item| item.section.as_deref() == section)
            .cloned()
            .collect()
    }

    /// Visibility of the route registered for `path`, exact match
    pub fn route_visibility(&self, path: &str) -> Option<RouteVisibility> {
        self.inner
            .read()
            .routes
            .iter()
            .find(|route| route.path == path)
            .map(|route| route.visibility)
    }
}
