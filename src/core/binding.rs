//! Side-table from handler identity to its endpoint key.
//!
//! Each route registered through the binder gets a [`HandlerId`]. The call
//! guard looks its key up here instead of reading metadata off the handler,
//! and the visibility pass rewrites the `visible` snapshot in place.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use http::Method;
use serde::Serialize;

use crate::core::key::EndpointKey;

/// Stable identity assigned to a handler at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Everything the binder learned about one registered route.
#[derive(Debug, Clone)]
pub struct BoundEndpoint {
    pub id: HandlerId,
    pub key: EndpointKey,
    /// Mounted path, as the router sees it.
    pub path: String,
    pub method: Method,
    pub description: String,
    /// Whether the route asked to appear in the API document at all.
    pub include_in_schema: bool,
    /// Documentation visibility as of the last registration or refresh.
    pub visible: bool,
}

/// Per-route registration options.
#[derive(Debug, Clone)]
pub struct RouteOptions {
    /// Key overriding the derived `path:METHOD`
    pub key: Option<String>,
    /// Handler name, only read by the name-inference shim
    pub handler_name: Option<&'static str>,
    pub description: String,
    /// State registered when the key is new
    pub enabled: bool,
    pub include_in_schema: bool,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            key: None,
            handler_name: None,
            description: String::new(),
            enabled: true,
            include_in_schema: true,
        }
    }
}

impl RouteOptions {
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn handler_name(mut self, name: &'static str) -> Self {
        self.handler_name = Some(name);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.include_in_schema = false;
        self
    }
}

#[derive(Debug, Default)]
pub struct BindingTable {
    next_id: AtomicU64,
    entries: RwLock<BTreeMap<HandlerId, BoundEndpoint>>,
}

/// Fields supplied when binding; the table assigns the id.
#[derive(Debug, Clone)]
pub struct NewBinding {
    pub key: EndpointKey,
    pub path: String,
    pub method: Method,
    pub description: String,
    pub include_in_schema: bool,
    pub visible: bool,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, binding: NewBinding) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = BoundEndpoint {
            id,
            key: binding.key,
            path: binding.path,
            method: binding.method,
            description: binding.description,
            include_in_schema: binding.include_in_schema,
            visible: binding.visible,
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, entry);
        id
    }

    pub fn key_for(&self, id: HandlerId) -> Option<EndpointKey> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|entry| entry.key.clone())
    }

    pub fn get(&self, id: HandlerId) -> Option<BoundEndpoint> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Snapshot ordered by registration.
    pub fn snapshot(&self) -> Vec<BoundEndpoint> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recompute every `visible` flag. Returns how many changed.
    pub fn refresh(&self, visible: impl Fn(&BoundEndpoint) -> bool) -> usize {
        let mut changed = 0;
        for entry in self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .values_mut()
        {
            let now = visible(entry);
            if now != entry.visible {
                entry.visible = now;
                changed += 1;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(path: &str, method: Method) -> NewBinding {
        NewBinding {
            key: EndpointKey::compose(path, &method),
            path: path.to_string(),
            method,
            description: String::new(),
            include_in_schema: true,
            visible: true,
        }
    }

    #[test]
    fn ids_are_unique_and_resolve_to_keys() {
        let table = BindingTable::new();
        let a = table.bind(binding("/a", Method::GET));
        let b = table.bind(binding("/a", Method::POST));
        assert_ne!(a, b);
        assert_eq!(table.key_for(a).unwrap().as_str(), "/a:GET");
        assert_eq!(table.key_for(b).unwrap().as_str(), "/a:POST");
    }

    #[test]
    fn refresh_counts_changes() {
        let table = BindingTable::new();
        let a = table.bind(binding("/a", Method::GET));
        table.bind(binding("/b", Method::GET));

        let changed = table.refresh(|entry| entry.path != "/a");
        assert_eq!(changed, 1);
        assert!(!table.get(a).unwrap().visible);
        assert_eq!(table.refresh(|entry| entry.path != "/a"), 0);
    }
}
