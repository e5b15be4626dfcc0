use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Initialize logging from the `[logging]` section.
///
/// `RUST_LOG` wins over the configured level when it is set.
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    init_tracing_with_config(&config.level, config.json)
}

/// Initialize tracing with an explicit level and output format
pub fn init_tracing_with_config(level: &str, json_format: bool) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(level)?,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json_format {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.json().with_current_span(true).with_span_list(false))
            .try_init()
            .wrap_err("Failed to install JSON subscriber")?;
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty())
            .try_init()
            .wrap_err("Failed to install console subscriber")?;
    }

    tracing::info!(level, json = json_format, "Gatekeeper logging initialized");
    Ok(())
}

/// Filter for the configured level, used when `RUST_LOG` is unset
pub fn level_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))
}

/// Span tagging one component's work, e.g. a startup phase
pub fn component_span(component: &str) -> tracing::Span {
    tracing::info_span!("component", name = component)
}

/// Request-scoped span carrying the correlation id
pub fn create_request_span(method: &str, path: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        http.method = method,
        http.path = path,
        request.id = request_id,
        http.status_code = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        assert!(level_filter("info").is_ok());
        assert!(level_filter("gatekeeper=debug,tower_http=info").is_ok());
        assert!(level_filter("gatekeeper=notalevel").is_err());
    }

    #[test]
    fn test_create_request_span() {
        let span = create_request_span("GET", "/api/v1/users", "req-123");
        assert_eq!(span.metadata().map(|m| m.name()), Some("request"));
    }

    #[test]
    fn test_component_span() {
        let span = component_span("schema");
        assert_eq!(span.metadata().map(|m| m.name()), Some("component"));
    }
}
