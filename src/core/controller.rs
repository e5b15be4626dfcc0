//! The per-process admission controller.
//!
//! One [`AdmissionController`] is built at start and handed, behind an
//! `Arc`, to every surface that needs it: the route binder, the global
//! middleware, per-route call guards, extractors and the control API.
//! Nothing here is global.

use std::sync::Arc;

use http::Method;
use tracing::{debug, info};

use crate::{
    config::{ConfigValidator, GatekeeperConfig},
    core::{
        binding::{BindingTable, BoundEndpoint, HandlerId, NewBinding, RouteOptions},
        catalog::DomainCatalog,
        flags::{FlagSettings, FlagStore},
        key::{EndpointKey, KeyCodec},
        matcher::{Decision, PatternMatcher},
        registry::EndpointRegistry,
    },
    ports::discovery::Domain,
};

#[derive(Debug)]
pub struct AdmissionController {
    codec: KeyCodec,
    registry: EndpointRegistry,
    flags: FlagStore,
    matcher: PatternMatcher,
    bindings: BindingTable,
    catalog: Arc<DomainCatalog>,
}

impl AdmissionController {
    /// Build a controller from configuration without validating it.
    ///
    /// Seeded endpoints are registered immediately; a seed that later
    /// fails to compile as a pattern is isolated at match time.
    pub fn new(config: &GatekeeperConfig) -> Self {
        let catalog = Arc::new(DomainCatalog::new(config.domains.iter().cloned()));
        let settings = FlagSettings {
            api_prefix: config.api_prefix.clone(),
            path_flags: config.path_flags.clone(),
            prefix_flags: config.prefix_flags.clone(),
            initial: config.flags.clone(),
            exempt_domains: config.flag_exempt_domains.clone(),
        };
        let flags = FlagStore::new(settings, catalog.clone());

        let mut exempt = config.exempt_paths.clone();
        exempt.push(config.schema.path.clone());

        let registry = EndpointRegistry::new();
        for seed in &config.endpoints {
            registry.register(
                EndpointKey::new(seed.key.as_str()),
                seed.enabled,
                seed.description.as_str(),
            );
        }

        Self {
            codec: KeyCodec::new(config.api_prefix.as_str(), config.key_inference),
            registry,
            flags,
            matcher: PatternMatcher::new(exempt),
            bindings: BindingTable::new(),
            catalog,
        }
    }

    /// Validate the configuration, then build the controller.
    pub fn from_config(config: &GatekeeperConfig) -> eyre::Result<Self> {
        ConfigValidator::validate(config)
            .map_err(|e| eyre::eyre!("Invalid gatekeeper configuration: {}", e))?;
        let controller = Self::new(config);
        info!(
            api_prefix = %config.api_prefix,
            seeded = config.endpoints.len(),
            domains = config.domains.len(),
            "Admission controller ready"
        );
        Ok(controller)
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn flags(&self) -> &FlagStore {
        &self.flags
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// Full admission decision for a request.
    pub fn evaluate(&self, path: &str, method: &Method) -> Decision {
        self.matcher.evaluate(path, method, &self.registry, &self.flags)
    }

    /// Register one route: derive its key, seed the registry and snapshot
    /// its documentation visibility. Existing registry state (from config
    /// seeds or an earlier binding) is kept.
    pub fn bind_route(
        &self,
        router_prefix: &str,
        route_path: &str,
        method: &Method,
        options: &RouteOptions,
    ) -> HandlerId {
        let key = self.codec.derive_at_registration(
            router_prefix,
            route_path,
            method,
            options.key.as_deref(),
            options.handler_name,
        );
        let path = self.codec.full_path(router_prefix, route_path);

        self.registry.register_if_absent(
            key.clone(),
            options.enabled,
            options.description.as_str(),
        );

        let visible = self.visibility(&key, &path, method, options.include_in_schema);
        let id = self.bindings.bind(NewBinding {
            key,
            path,
            method: method.clone(),
            description: options.description.clone(),
            include_in_schema: options.include_in_schema,
            visible,
        });
        debug!(handler = %id, path = route_path, method = %method, "Route bound");
        id
    }

    /// Key a call guard checks.
    ///
    /// A bound handler uses its bound key. Otherwise the key is derived from
    /// the request and, if unseen, registered as enabled.
    pub fn resolve_call(
        &self,
        handler: Option<HandlerId>,
        path: &str,
        method: &Method,
    ) -> EndpointKey {
        if let Some(key) = handler.and_then(|id| self.bindings.key_for(id)) {
            return key;
        }
        let key = self.codec.derive_at_request(path, method);
        if self.registry.register_if_absent(key.clone(), true, "") {
            debug!(key = %key, "Endpoint auto-registered on first call");
        }
        key
    }

    fn visibility(&self, key: &EndpointKey, path: &str, method: &Method, include: bool) -> bool {
        include
            && self.registry.is_enabled(key.as_str())
            && self.evaluate(path, method).is_admitted()
    }

    /// Whether a bound route should currently be documented.
    pub fn is_visible(&self, entry: &BoundEndpoint) -> bool {
        self.visibility(&entry.key, &entry.path, &entry.method, entry.include_in_schema)
    }

    /// Re-derive every route's visibility snapshot from current state.
    /// Returns the number of routes whose visibility changed.
    /// Compiled patterns of keys that are no longer disabled are dropped.
    pub fn refresh_visibility(&self) -> usize {
        let pruned = self.matcher.prune(&self.registry);
        let changed = self.bindings.refresh(|entry| self.is_visible(entry));
        debug!(changed, pruned, "Route visibility refreshed");
        changed
    }

    /// Record a domain announced by a route binder. Flags pick it up on
    /// their next read.
    pub fn declare_domain(&self, domain: Domain) {
        if self.catalog.add(domain) {
            self.flags.invalidate();
        }
    }

    /// Rebuild default flags and prefixes. Explicit flag values survive.
    pub fn rediscover_domains(&self) -> usize {
        let domains = self.flags.rediscover();
        self.refresh_visibility();
        domains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> AdmissionController {
        let config = GatekeeperConfig::builder()
            .domain("recipes")
            .endpoint("/api/v1/recipes/legacy:GET", false)
            .build()
            .unwrap();
        AdmissionController::new(&config)
    }

    #[test]
    fn seeds_override_binder_defaults() {
        let controller = controller();
        let id =
            controller.bind_route("/recipes", "/legacy", &Method::GET, &RouteOptions::default());
        assert_eq!(
            controller.registry().state("/api/v1/recipes/legacy:GET"),
            Some(false)
        );
        assert!(!controller.bindings().get(id).unwrap().visible);
    }

    #[test]
    fn bound_key_matches_request_derivation() {
        let controller = controller();
        let id =
            controller.bind_route("/recipes", "/{id}", &Method::PUT, &RouteOptions::default());
        let bound = controller.resolve_call(Some(id), "/ignored", &Method::GET);
        let derived = controller.resolve_call(None, "/api/v1/recipes/{id}", &Method::PUT);
        assert_eq!(bound, derived);
    }

    #[test]
    fn unbound_calls_auto_register_as_enabled() {
        let controller = controller();
        let key = controller.resolve_call(None, "/api/v1/new", &Method::POST);
        assert_eq!(controller.registry().state(key.as_str()), Some(true));
    }

    #[test]
    fn refresh_follows_registry_changes() {
        let controller = controller();
        let id =
            controller.bind_route("/recipes", "/search", &Method::GET, &RouteOptions::default());
        assert!(controller.bindings().get(id).unwrap().visible);

        controller.registry().disable("/api/v1/recipes/search:GET".into());
        // Snapshot is stale until refreshed.
        assert!(controller.bindings().get(id).unwrap().visible);
        assert_eq!(controller.refresh_visibility(), 1);
        assert!(!controller.bindings().get(id).unwrap().visible);
    }

    #[test]
    fn declared_domains_get_default_flags() {
        let controller = controller();
        controller.declare_domain(Domain::new("auth"));
        assert_eq!(controller.flags().get("enable_auth_endpoints"), Some(true));
        assert_eq!(controller.flags().get("enable_recipes_endpoints"), Some(true));
    }

    #[test]
    fn schema_path_is_exempt() {
        let controller = controller();
        assert!(controller.matcher().is_exempt("/api/v1/openapi.json"));
    }
}
