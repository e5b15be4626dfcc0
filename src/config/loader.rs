use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::GatekeeperConfig;

/// Prefix for environment overrides, e.g. `GATEKEEPER__API_PREFIX`
const ENV_PREFIX: &str = "GATEKEEPER";

/// Starter configuration written by `gatekeeper init`
pub const CONFIG_TEMPLATE: &str = r#"# Gatekeeper configuration

# The address to listen on
listen_addr = "127.0.0.1:8080"

# Every API route is mounted below this prefix
api_prefix = "/api/v1"

# Paths admitted without any check. The API document path is always added.
exempt_paths = ["/", "/health", "/docs"]

# Domains whose flag is never consulted
flag_exempt_domains = ["health"]

# "declared" appends the route's method to explicit keys without one,
# "handler_name" guesses it from the handler name
key_inference = "declared"

# Initial flag values. Domains get `enable_{name}_endpoints` automatically.
[flags]
enable_users_endpoints = true

[schema]
path = "/api/v1/openapi.json"
title = "Gatekeeper"
version = "1.0.0"
# "manual" keeps the document until POST {control}/refresh-schema,
# "on_mutation" recomputes it after every control write
cache = "manual"

[control]
prefix = "/admin/control"
# Writes are refused until a token is configured
# api_key = "change-me"

[logging]
level = "info"
json = false

# Example: a route that starts disabled
[[endpoints]]
key = "/api/v1/users/{user_id}:DELETE"
enabled = false
description = "Delete a user"

# Example routes served by a stub handler
[[routes]]
domain = "users"
path = "/{user_id}"
method = "GET"
description = "Read a user"

[[routes]]
domain = "users"
path = "/{user_id}"
method = "DELETE"
description = "Delete a user"
"#;

/// Load configuration from a file using the config crate
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<GatekeeperConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: &str) -> Result<GatekeeperConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Yaml, // Default to YAML
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let config: GatekeeperConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(config)
}
