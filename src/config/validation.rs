use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
};

use http::Method;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    config::models::{EndpointSeed, GatekeeperConfig, RouteDeclaration},
    core::{
        key::KeyCodec,
        matcher::{compile_from_start, compile_template},
    },
};

static DOMAIN_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").expect("valid regex"));
static PATH_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^{}/]*\}").expect("valid regex"));

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gatekeeper configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire configuration, reporting every problem at once
    pub fn validate(config: &GatekeeperConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_api_prefix(&config.api_prefix) {
            errors.push(e);
        }

        for path in &config.exempt_paths {
            if let Err(e) = Self::validate_absolute(path, "exempt_paths") {
                errors.push(e);
            }
        }

        for domain in &config.domains {
            if let Err(e) = Self::validate_domain_name(&domain.name, "domains") {
                errors.push(e);
            }
            if let Some(prefix) = &domain.prefix
                && let Err(e) =
                    Self::validate_absolute(prefix, &format!("domain '{}' prefix", domain.name))
            {
                errors.push(e);
            }
        }

        for name in &config.flag_exempt_domains {
            if let Err(e) = Self::validate_domain_name(name, "flag_exempt_domains") {
                errors.push(e);
            }
        }

        for mapping in &config.prefix_flags {
            if let Err(e) = Self::validate_absolute(&mapping.prefix, "prefix_flags prefix") {
                errors.push(e);
            }
            if mapping.flag.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: format!("prefix_flags '{}' flag", mapping.prefix),
                });
            }
        }

        for (path, flag) in &config.path_flags {
            if let Err(e) = Self::validate_absolute(path, "path_flags path") {
                errors.push(e);
            }
            if flag.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: format!("path_flags '{path}' flag"),
                });
            }
        }

        if config.flags.keys().any(|name| name.trim().is_empty()) {
            errors.push(ValidationError::InvalidField {
                field: "flags".to_string(),
                message: "Flag names must not be empty".to_string(),
            });
        }

        for seed in &config.endpoints {
            if let Err(e) = Self::validate_seed(seed) {
                errors.push(e);
            }
        }

        if let Err(e) = Self::validate_absolute(&config.schema.path, "schema.path") {
            errors.push(e);
        }
        if let Err(e) = Self::validate_mount_prefix(&config.control.prefix, "control.prefix") {
            errors.push(e);
        }

        for route in &config.routes {
            if let Err(mut route_errors) = Self::validate_route(route) {
                errors.append(&mut route_errors);
            }
        }
        errors.extend(Self::validate_route_table(config));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// The prefix may be empty; otherwise it starts with '/' and has no trailing '/'
    fn validate_api_prefix(prefix: &str) -> ValidationResult<()> {
        if prefix.is_empty() {
            return Ok(());
        }
        if !prefix.starts_with('/') || prefix.ends_with('/') {
            return Err(ValidationError::InvalidField {
                field: "api_prefix".to_string(),
                message: format!("'{prefix}' must start with '/' and must not end with '/'"),
            });
        }
        Ok(())
    }

    fn validate_absolute(path: &str, context: &str) -> ValidationResult<()> {
        if !path.starts_with('/') {
            return Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("'{path}' must start with '/'"),
            });
        }
        Ok(())
    }

    /// A nested router cannot sit at the root or end with '/'
    fn validate_mount_prefix(prefix: &str, context: &str) -> ValidationResult<()> {
        if !prefix.starts_with('/') || prefix.ends_with('/') {
            return Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("'{prefix}' must start with '/' and must not end with '/'"),
            });
        }
        Ok(())
    }

    fn validate_domain_name(name: &str, context: &str) -> ValidationResult<()> {
        if !DOMAIN_NAME.is_match(name) {
            return Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Domain name '{name}' may only contain [a-z0-9_]"),
            });
        }
        Ok(())
    }

    /// Regex and template seeds must compile; every other seed must be a path
    fn validate_seed(seed: &EndpointSeed) -> ValidationResult<()> {
        let compiled = if seed.key.starts_with('^') {
            compile_from_start(&seed.key)
        } else if seed.key.contains('{') || seed.key.contains('}') {
            compile_template(&seed.key)
        } else {
            return Self::validate_absolute(&seed.key, "endpoints key");
        };
        compiled
            .map(|_| ())
            .map_err(|e| ValidationError::InvalidPattern {
                pattern: seed.key.clone(),
                message: e.to_string(),
            })
    }

    /// Declared routes must mount without clashing with each other or with
    /// the routes the application always serves.
    fn validate_route_table(config: &GatekeeperConfig) -> Vec<ValidationError> {
        let codec = KeyCodec::new(config.api_prefix.as_str(), config.key_inference);
        let reserved = ["/", "/health", config.schema.path.as_str()];
        let control = config.control.prefix.as_str();

        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        let mut shapes: HashMap<String, String> = HashMap::new();
        for route in &config.routes {
            let method = route.method.to_ascii_uppercase();
            let full_path = codec.full_path(&format!("/{}", route.domain), &route.path);
            let field = format!("route '{method} {full_path}'");
            let shape = PATH_PARAM.replace_all(&full_path, "{}").into_owned();

            if !seen.insert((shape.clone(), method)) {
                errors.push(ValidationError::InvalidField {
                    field: field.clone(),
                    message: "Declared more than once".to_string(),
                });
            }
            if let Some(other) = shapes.get(&shape)
                && *other != full_path
            {
                errors.push(ValidationError::InvalidField {
                    field: field.clone(),
                    message: format!("Parameter names differ from route '{other}'"),
                });
            } else {
                shapes.insert(shape, full_path.clone());
            }
            if reserved.contains(&full_path.as_str()) {
                errors.push(ValidationError::InvalidField {
                    field: field.clone(),
                    message: "Collides with a built-in route".to_string(),
                });
            }
            if full_path == control || full_path.starts_with(&format!("{control}/")) {
                errors.push(ValidationError::InvalidField {
                    field,
                    message: format!("Falls under control.prefix '{control}'"),
                });
            }
        }
        errors
    }

    fn validate_route(route: &RouteDeclaration) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let context = format!("route '{} {}'", route.method, route.path);

        if let Err(e) = Self::validate_domain_name(&route.domain, &format!("{context} domain")) {
            errors.push(e);
        }
        if let Err(e) = Self::validate_absolute(&route.path, &format!("{context} path")) {
            errors.push(e);
        }
        match route.method.to_ascii_uppercase().parse::<Method>() {
            Ok(method)
                if [
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::PATCH,
                ]
                .contains(&method) => {}
            _ => errors.push(ValidationError::InvalidField {
                field: format!("{context} method"),
                message: "Method must be one of GET, POST, PUT, DELETE, PATCH".to_string(),
            }),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{core::flags::PathPrefixMapping, ports::discovery::Domain};

    fn minimal_valid_config() -> GatekeeperConfig {
        GatekeeperConfig::default()
    }

    fn failure_message(config: &GatekeeperConfig) -> String {
        match ConfigValidator::validate(config) {
            Err(ValidationError::ValidationFailed { message }) => message,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ConfigValidator::validate(&minimal_valid_config()).is_ok());
    }

    #[test]
    fn validate_rejects_trailing_slash_prefix() {
        let mut config = minimal_valid_config();
        config.api_prefix = "/api/v1/".to_string();
        assert!(failure_message(&config).contains("api_prefix"));
    }

    #[test]
    fn validate_rejects_bad_regex_seed() {
        let mut config = minimal_valid_config();
        config.endpoints.push(EndpointSeed {
            key: "^/api/(".to_string(),
            enabled: false,
            description: String::new(),
        });
        assert!(failure_message(&config).contains("Invalid pattern"));
    }

    #[test]
    fn validate_rejects_odd_domain_names() {
        let mut config = minimal_valid_config();
        config.domains.push(Domain::new("Auth-Domain"));
        assert!(failure_message(&config).contains("[a-z0-9_]"));
    }

    fn route(domain: &str, path: &str, method: &str) -> RouteDeclaration {
        RouteDeclaration {
            domain: domain.to_string(),
            path: path.to_string(),
            method: method.to_string(),
            key: None,
            description: String::new(),
            enabled: true,
            include_in_schema: true,
        }
    }

    #[test]
    fn validate_rejects_root_or_trailing_control_prefix() {
        for prefix in ["/", "/admin/control/", "admin"] {
            let mut config = minimal_valid_config();
            config.control.prefix = prefix.to_string();
            assert!(failure_message(&config).contains("control.prefix"), "{prefix}");
        }
    }

    #[test]
    fn validate_rejects_bad_template_seed() {
        let mut config = minimal_valid_config();
        config.endpoints.push(EndpointSeed {
            key: "/api/v1/{id}/x/{id}:GET".to_string(),
            enabled: false,
            description: String::new(),
        });
        assert!(failure_message(&config).contains("Invalid pattern"));
    }

    #[test]
    fn validate_rejects_duplicate_routes() {
        let mut config = minimal_valid_config();
        config.routes.push(route("users", "/me", "GET"));
        config.routes.push(route("users", "/me", "get"));
        assert!(failure_message(&config).contains("Declared more than once"));
    }

    #[test]
    fn validate_rejects_conflicting_parameter_names() {
        let mut config = minimal_valid_config();
        config.routes.push(route("users", "/{id}", "GET"));
        config.routes.push(route("users", "/{user_id}", "DELETE"));
        assert!(failure_message(&config).contains("Parameter names differ"));
    }

    #[test]
    fn validate_rejects_routes_on_reserved_paths() {
        let mut config = minimal_valid_config();
        config.api_prefix = String::new();
        config.schema.path = "/docs/openapi.json".to_string();
        config.routes.push(route("health", "", "GET"));
        config.routes.push(route("docs", "/openapi.json", "GET"));
        let message = failure_message(&config);
        assert!(message.starts_with("Found 3 validation errors"), "{message}");
        assert!(message.contains("Collides with a built-in route"));
    }

    #[test]
    fn validate_rejects_routes_under_control_prefix() {
        let mut config = minimal_valid_config();
        config.control.prefix = "/api/v1/admin".to_string();
        config.routes.push(route("admin", "/stats", "GET"));
        assert!(failure_message(&config).contains("Falls under control.prefix"));
    }

    #[test]
    fn distinct_routes_pass() {
        let mut config = minimal_valid_config();
        config.routes.push(route("users", "/{user_id}", "GET"));
        config.routes.push(route("users", "/{user_id}", "DELETE"));
        config.routes.push(route("users", "/{user_id}/posts", "GET"));
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn validate_collects_every_error() {
        let mut config = minimal_valid_config();
        config.listen_addr = "nowhere".to_string();
        config.prefix_flags.push(PathPrefixMapping::new("api/v1/x", ""));
        config.routes.push(RouteDeclaration {
            domain: "auth".to_string(),
            path: "/login".to_string(),
            method: "BREW".to_string(),
            key: None,
            description: String::new(),
            enabled: true,
            include_in_schema: true,
        });

        let message = failure_message(&config);
        assert!(message.starts_with("Found 4 validation errors"));
    }
}
