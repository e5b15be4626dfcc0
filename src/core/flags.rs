//! Domain-level feature flags.
//!
//! [`FeatureFlags`] is a shared handle onto one map. The store mutates that
//! map in place, so every holder of a handle sees writes without fetching a
//! new one. The map itself is computed lazily from the domain source and
//! rebuilt on [`FlagStore::rediscover`]; explicit writes survive rebuilds.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ports::discovery::{Domain, DomainSource};

/// Maps a path prefix to the flag gating it. Order matters: the first
/// matching prefix wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPrefixMapping {
    pub prefix: String,
    pub flag: String,
}

impl PathPrefixMapping {
    pub fn new(prefix: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            flag: flag.into(),
        }
    }
}

/// Live handle onto the flag map.
#[derive(Debug, Clone, Default)]
pub struct FeatureFlags {
    inner: Arc<RwLock<BTreeMap<String, bool>>>,
}

impl FeatureFlags {
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, bool>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, bool>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.read().get(name).copied()
    }

    /// Fail-open: unknown flags are on.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).unwrap_or(true)
    }

    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Two handles alias the same map.
    pub fn same_map(&self, other: &FeatureFlags) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn set(&self, name: &str, value: bool) {
        self.write().insert(name.to_string(), value);
    }

    fn replace_contents(&self, values: BTreeMap<String, bool>) {
        let mut map = self.write();
        map.clear();
        map.extend(values);
    }
}

#[derive(Debug, Default)]
struct FlagLayout {
    computed: bool,
    overrides: BTreeMap<String, bool>,
    path_flags: BTreeMap<String, String>,
    prefix_mappings: Vec<PathPrefixMapping>,
}

/// Static inputs to the flag store.
#[derive(Debug, Clone, Default)]
pub struct FlagSettings {
    pub api_prefix: String,
    /// Exact path to flag name. Consulted before prefixes.
    pub path_flags: BTreeMap<String, String>,
    /// Operator prefixes, placed ahead of discovered ones.
    pub prefix_flags: Vec<PathPrefixMapping>,
    /// Initial values, kept as explicit overrides.
    pub initial: BTreeMap<String, bool>,
    /// Domains whose routes skip the flag check entirely.
    pub exempt_domains: Vec<String>,
}

/// Name to bool store for domain switches.
pub struct FlagStore {
    settings: FlagSettings,
    source: Arc<dyn DomainSource>,
    live: FeatureFlags,
    layout: RwLock<FlagLayout>,
    exempt_flags: BTreeSet<String>,
}

impl std::fmt::Debug for FlagStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagStore")
            .field("settings", &self.settings)
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}

impl FlagStore {
    pub fn new(settings: FlagSettings, source: Arc<dyn DomainSource>) -> Self {
        let exempt_flags = settings
            .exempt_domains
            .iter()
            .map(|name| Domain::new(name.as_str()).flag_name())
            .collect();
        let layout = FlagLayout {
            overrides: settings.initial.clone(),
            ..FlagLayout::default()
        };
        Self {
            settings,
            source,
            live: FeatureFlags::default(),
            layout: RwLock::new(layout),
            exempt_flags,
        }
    }

    fn read_layout(&self) -> RwLockReadGuard<'_, FlagLayout> {
        self.layout.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_layout(&self) -> RwLockWriteGuard<'_, FlagLayout> {
        self.layout.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live handle, computing the map on first use.
    pub fn flags(&self) -> FeatureFlags {
        self.ensure_computed();
        self.live.clone()
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.ensure_computed();
        self.live.get(name)
    }

    /// Set one flag in place and remember it as an explicit override.
    pub fn set(&self, name: &str, value: bool) {
        self.ensure_computed();
        let mut layout = self.write_layout();
        layout.overrides.insert(name.to_string(), value);
        self.live.set(name, value);
        info!(flag = name, value, "Feature flag set");
    }

    /// Mark the map stale. The next read recomputes it.
    pub fn invalidate(&self) {
        self.write_layout().computed = false;
    }

    /// Re-run discovery now and rebuild default flags and prefixes.
    /// Returns the number of domains found.
    pub fn rediscover(&self) -> usize {
        let mut layout = self.write_layout();
        let domains = self.rebuild(&mut layout);
        info!(domains, flags = self.live.len(), "Domain discovery refreshed");
        domains
    }

    fn ensure_computed(&self) {
        if self.read_layout().computed {
            return;
        }
        let mut layout = self.write_layout();
        // Another writer may have finished while we waited.
        if !layout.computed {
            let domains = self.rebuild(&mut layout);
            debug!(domains, "Feature flags computed");
        }
    }

    fn rebuild(&self, layout: &mut FlagLayout) -> usize {
        let domains = self.source.discover();

        let mut values: BTreeMap<String, bool> = domains
            .iter()
            .map(|domain| (domain.flag_name(), true))
            .collect();
        values.extend(layout.overrides.iter().map(|(k, v)| (k.clone(), *v)));

        let mut path_flags = self.settings.path_flags.clone();
        let mut prefixes = self.settings.prefix_flags.clone();
        for domain in &domains {
            let flag = domain.flag_name();
            let base = format!("{}/{}", self.settings.api_prefix, domain.name);
            path_flags.entry(base.clone()).or_insert_with(|| flag.clone());

            let prefix = domain.prefix.clone().unwrap_or_else(|| format!("{base}/"));
            if !prefixes.iter().any(|mapping| mapping.prefix == prefix) {
                prefixes.push(PathPrefixMapping { prefix, flag });
            }
        }

        self.live.replace_contents(values);
        layout.path_flags = path_flags;
        layout.prefix_mappings = prefixes;
        layout.computed = true;
        domains.len()
    }

    /// Flag gating `path`: exact path mapping first, then the first
    /// matching prefix in list order.
    pub fn flag_for_path(&self, path: &str) -> Option<String> {
        self.ensure_computed();
        let layout = self.read_layout();
        if let Some(flag) = layout.path_flags.get(path) {
            return Some(flag.clone());
        }
        layout
            .prefix_mappings
            .iter()
            .find(|mapping| path.starts_with(&mapping.prefix))
            .map(|mapping| mapping.flag.clone())
    }

    /// Flag owning `path` by prefix alone. Used to annotate listings.
    pub fn prefix_flag_for(&self, path: &str) -> Option<String> {
        self.ensure_computed();
        self.read_layout()
            .prefix_mappings
            .iter()
            .find(|mapping| path.starts_with(&mapping.prefix))
            .map(|mapping| mapping.flag.clone())
    }

    /// Flags belonging to carved-out domains never reject.
    pub fn is_exempt(&self, flag: &str) -> bool {
        self.exempt_flags.contains(flag)
    }

    pub fn prefix_mappings(&self) -> Vec<PathPrefixMapping> {
        self.ensure_computed();
        self.read_layout().prefix_mappings.clone()
    }

    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.flags().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct StubDomains(Mutex<Vec<Domain>>);

    impl StubDomains {
        fn push(&self, domain: Domain) {
            self.0.lock().unwrap().push(domain);
        }
    }

    impl DomainSource for StubDomains {
        fn discover(&self) -> Vec<Domain> {
            self.0.lock().unwrap().clone()
        }
    }

    fn store_with(domains: &[&str], settings: FlagSettings) -> (FlagStore, Arc<StubDomains>) {
        let source = Arc::new(StubDomains::default());
        for name in domains {
            source.push(Domain::new(*name));
        }
        let settings = FlagSettings {
            api_prefix: "/api/v1".to_string(),
            ..settings
        };
        (FlagStore::new(settings, source.clone()), source)
    }

    #[test]
    fn discovered_domains_default_to_enabled() {
        let (store, _) = store_with(&["auth", "recipes"], FlagSettings::default());
        assert_eq!(store.get("enable_auth_endpoints"), Some(true));
        assert_eq!(store.get("enable_recipes_endpoints"), Some(true));
        assert_eq!(store.get("enable_unknown_endpoints"), None);
    }

    #[test]
    fn set_is_visible_through_earlier_handles() {
        let (store, _) = store_with(&["auth"], FlagSettings::default());
        let held = store.flags();
        store.set("enable_auth_endpoints", false);
        assert_eq!(held.get("enable_auth_endpoints"), Some(false));
        assert!(held.same_map(&store.flags()));
    }

    #[test]
    fn rediscovery_keeps_explicit_overrides() {
        let (store, source) = store_with(&["auth"], FlagSettings::default());
        let held = store.flags();
        store.set("enable_auth_endpoints", false);

        source.push(Domain::new("profiles"));
        assert_eq!(store.rediscover(), 2);

        assert_eq!(held.get("enable_auth_endpoints"), Some(false));
        assert_eq!(held.get("enable_profiles_endpoints"), Some(true));
    }

    #[test]
    fn invalidate_defers_recompute_to_next_read() {
        let (store, source) = store_with(&["auth"], FlagSettings::default());
        assert_eq!(store.flags().len(), 1);
        source.push(Domain::new("queries"));
        assert_eq!(store.flags().len(), 1);
        store.invalidate();
        assert_eq!(store.flags().len(), 2);
    }

    #[test]
    fn exact_path_flag_beats_prefix() {
        let settings = FlagSettings {
            path_flags: [("/api/v1/a/x".to_string(), "flagExact".to_string())].into(),
            prefix_flags: vec![PathPrefixMapping::new("/api/v1/a/", "flagPrefix")],
            ..FlagSettings::default()
        };
        let (store, _) = store_with(&[], settings);
        assert_eq!(store.flag_for_path("/api/v1/a/x").as_deref(), Some("flagExact"));
        assert_eq!(store.flag_for_path("/api/v1/a/y").as_deref(), Some("flagPrefix"));
        assert_eq!(store.flag_for_path("/api/v1/b"), None);
    }

    #[test]
    fn operator_prefixes_precede_discovered_ones() {
        let settings = FlagSettings {
            prefix_flags: vec![PathPrefixMapping::new("/api/v1/auth/admin", "enable_admin")],
            ..FlagSettings::default()
        };
        let (store, _) = store_with(&["auth"], settings);
        assert_eq!(
            store.flag_for_path("/api/v1/auth/admin/users").as_deref(),
            Some("enable_admin")
        );
        assert_eq!(
            store.flag_for_path("/api/v1/auth/login").as_deref(),
            Some("enable_auth_endpoints")
        );
        assert_eq!(
            store.flag_for_path("/api/v1/auth").as_deref(),
            Some("enable_auth_endpoints")
        );
    }

    #[test]
    fn exempt_domains_are_recognised_by_flag_name() {
        let settings = FlagSettings {
            exempt_domains: vec!["health".to_string()],
            ..FlagSettings::default()
        };
        let (store, _) = store_with(&["health"], settings);
        assert!(store.is_exempt("enable_health_endpoints"));
        assert!(!store.is_exempt("enable_auth_endpoints"));
    }
}
