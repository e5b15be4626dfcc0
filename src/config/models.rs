//! Configuration data structures for gatekeeper.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. Every
//! section has defaults so a minimal config only names what differs.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    core::{flags::PathPrefixMapping, key::KeyInference},
    ports::discovery::Domain,
};

fn default_true() -> bool {
    true
}

/// One endpoint state seeded into the registry at start.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EndpointSeed {
    /// Endpoint key: `path:METHOD`, legacy `path`, `^regex` or `{template}`
    pub key: String,
    /// Initial state
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Free-form description shown in listings
    #[serde(default)]
    pub description: String,
}

/// A route served by the binary's stub handler.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RouteDeclaration {
    /// Owning domain. The route is mounted under `{api_prefix}/{domain}`.
    pub domain: String,
    /// Path below the domain prefix, e.g. `/{user_id}`
    pub path: String,
    /// HTTP method, e.g. "GET"
    #[serde(default = "default_method")]
    pub method: String,
    /// Explicit key overriding the derived one
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Default state registered for the route
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether the route appears in the API document
    #[serde(default = "default_true")]
    pub include_in_schema: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

/// When the filtered API document is recomputed.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SchemaCachePolicy {
    /// Only on an explicit refresh
    #[default]
    Manual,
    /// After every control-surface write
    OnMutation,
}

/// API document settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SchemaConfig {
    /// Path the filtered document is served on. Always exempt from admission.
    pub path: String,
    /// Document title
    pub title: String,
    /// Document version
    pub version: String,
    /// Cache invalidation policy
    pub cache: SchemaCachePolicy,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            path: "/api/v1/openapi.json".to_string(),
            title: "gatekeeper".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            cache: SchemaCachePolicy::Manual,
        }
    }
}

/// Control surface settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ControlConfig {
    /// Mount point of the control routes
    pub prefix: String,
    /// Bearer token required for writes. Writes are refused when unset.
    pub api_key: Option<String>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            prefix: "/admin/control".to_string(),
            api_key: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level gatekeeper configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GatekeeperConfig {
    /// Address the binary listens on
    pub listen_addr: String,
    /// Prefix every API route is mounted under, e.g. "/api/v1"
    pub api_prefix: String,
    /// Literal paths admitted before any other check
    pub exempt_paths: Vec<String>,
    /// Domains known up front. Binder-declared domains are added at runtime.
    pub domains: Vec<Domain>,
    /// Ordered prefix to flag mappings, ahead of discovered ones
    pub prefix_flags: Vec<PathPrefixMapping>,
    /// Exact path to flag mappings
    pub path_flags: BTreeMap<String, String>,
    /// Initial flag values, kept across rediscovery
    pub flags: BTreeMap<String, bool>,
    /// Domains never gated by their flag
    pub flag_exempt_domains: Vec<String>,
    /// Registry entries seeded at start
    pub endpoints: Vec<EndpointSeed>,
    /// How explicit keys without a method get one
    pub key_inference: KeyInference,
    /// API document settings
    pub schema: SchemaConfig,
    /// Control surface settings
    pub control: ControlConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Routes served by the binary
    pub routes: Vec<RouteDeclaration>,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            api_prefix: "/api/v1".to_string(),
            exempt_paths: vec!["/".to_string(), "/health".to_string(), "/docs".to_string()],
            domains: Vec::new(),
            prefix_flags: Vec::new(),
            path_flags: BTreeMap::new(),
            flags: BTreeMap::new(),
            flag_exempt_domains: Vec::new(),
            endpoints: Vec::new(),
            key_inference: KeyInference::Declared,
            schema: SchemaConfig::default(),
            control: ControlConfig::default(),
            logging: LoggingConfig::default(),
            routes: Vec::new(),
        }
    }
}

impl GatekeeperConfig {
    /// Create a builder for GatekeeperConfig
    pub fn builder() -> GatekeeperConfigBuilder {
        GatekeeperConfigBuilder::default()
    }
}

/// Builder for GatekeeperConfig, mostly for embedding and tests
#[derive(Debug, Default)]
pub struct GatekeeperConfigBuilder {
    config: GatekeeperConfig,
}

impl GatekeeperConfigBuilder {
    /// Set the API prefix
    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.api_prefix = prefix.into();
        self
    }

    /// Add a literal exempt path
    pub fn exempt_path(mut self, path: impl Into<String>) -> Self {
        self.config.exempt_paths.push(path.into());
        self
    }

    /// Declare a domain using the default prefix
    pub fn domain(mut self, name: impl Into<String>) -> Self {
        self.config.domains.push(Domain::new(name));
        self
    }

    /// Append a prefix to flag mapping
    pub fn prefix_flag(mut self, prefix: impl Into<String>, flag: impl Into<String>) -> Self {
        self.config
            .prefix_flags
            .push(PathPrefixMapping::new(prefix, flag));
        self
    }

    /// Map an exact path to a flag
    pub fn path_flag(mut self, path: impl Into<String>, flag: impl Into<String>) -> Self {
        self.config.path_flags.insert(path.into(), flag.into());
        self
    }

    /// Set an initial flag value
    pub fn flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.config.flags.insert(name.into(), value);
        self
    }

    /// Carve a domain out of flag checks
    pub fn flag_exempt_domain(mut self, name: impl Into<String>) -> Self {
        self.config.flag_exempt_domains.push(name.into());
        self
    }

    /// Seed a registry entry
    pub fn endpoint(mut self, key: impl Into<String>, enabled: bool) -> Self {
        self.config.endpoints.push(EndpointSeed {
            key: key.into(),
            enabled,
            description: String::new(),
        });
        self
    }

    /// Choose how explicit keys get their method
    pub fn key_inference(mut self, inference: KeyInference) -> Self {
        self.config.key_inference = inference;
        self
    }

    /// Set the schema cache policy
    pub fn schema_cache(mut self, policy: SchemaCachePolicy) -> Self {
        self.config.schema.cache = policy;
        self
    }

    /// Set the control write token
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.control.api_key = Some(key.into());
        self
    }

    /// Build the final GatekeeperConfig
    pub fn build(mut self) -> Result<GatekeeperConfig, String> {
        if !self.config.api_prefix.is_empty() && !self.config.api_prefix.starts_with('/') {
            return Err("api_prefix must start with '/'".to_string());
        }
        if self.config.schema.path == SchemaConfig::default().path {
            self.config.schema.path = format!("{}/openapi.json", self.config.api_prefix);
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_follows_api_prefix_for_schema_path() {
        let config = GatekeeperConfig::builder()
            .api_prefix("/api/v2")
            .domain("auth")
            .flag("enable_auth_endpoints", false)
            .build()
            .unwrap();
        assert_eq!(config.schema.path, "/api/v2/openapi.json");
        assert_eq!(config.domains, vec![Domain::new("auth")]);
        assert_eq!(config.flags.get("enable_auth_endpoints"), Some(&false));
    }

    #[test]
    fn builder_rejects_relative_prefix() {
        assert!(GatekeeperConfig::builder().api_prefix("api").build().is_err());
    }
}
