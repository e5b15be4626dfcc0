//! Administrative HTTP surface over the registry and flag store.
//!
//! Reads are open. Every write passes through the [`AdminAuthorizer`]
//! first, and after it succeeds the route visibility snapshot is refreshed.
//! The cached API document is only dropped on `POST /refresh-schema`, or
//! after every write under [`SchemaCachePolicy::OnMutation`].

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{
    adapters::schema::SchemaFilter,
    config::SchemaCachePolicy,
    core::{
        AdmissionController, AdmissionError, AdmissionResult, EndpointKey, PatternKind,
        matcher::{compile_from_start, compile_template},
    },
    ports::authorizer::AdminAuthorizer,
};

/// Shared state of the control routes.
#[derive(Clone)]
pub struct ControlState {
    controller: Arc<AdmissionController>,
    authorizer: Arc<dyn AdminAuthorizer>,
    schema: Option<Arc<SchemaFilter>>,
    cache_policy: SchemaCachePolicy,
}

impl ControlState {
    pub fn new(controller: Arc<AdmissionController>, authorizer: Arc<dyn AdminAuthorizer>) -> Self {
        Self {
            controller,
            authorizer,
            schema: None,
            cache_policy: SchemaCachePolicy::Manual,
        }
    }

    /// Attach the document cache the refresh route should drop.
    pub fn with_schema(mut self, schema: Arc<SchemaFilter>, policy: SchemaCachePolicy) -> Self {
        self.schema = Some(schema);
        self.cache_policy = policy;
        self
    }

    fn after_write(&self) {
        self.controller.refresh_visibility();
        if self.cache_policy == SchemaCachePolicy::OnMutation
            && let Some(schema) = &self.schema
        {
            schema.invalidate();
        }
    }
}

/// Registry entry as listed by `GET /endpoints`.
#[derive(Debug, Serialize)]
pub struct EndpointView {
    pub enabled: bool,
    pub description: String,
    /// Flag whose prefix covers this endpoint, if any
    pub feature_flag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EndpointUpdate {
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkUpdate {
    pub pattern: String,
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkUpdateResult {
    #[serde(rename = "matchedCount")]
    pub matched_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct FlagUpdate {
    pub value: bool,
}

/// Build the control router. Mount it with `Router::nest`.
pub fn control_router<S>(state: ControlState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let writes = Router::new()
        .route("/endpoints/bulk", post(bulk_update))
        .route("/endpoints/toggle", post(toggle_endpoint))
        .route("/endpoints/{*key}", patch(update_endpoint))
        .route("/feature-flags/{name}", patch(set_flag))
        .route("/refresh-domains", post(refresh_domains))
        .route("/refresh-schema", post(refresh_schema))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_authorization,
        ));

    Router::new()
        .route("/endpoints", get(list_endpoints))
        .route("/feature-flags", get(list_flags))
        .merge(writes)
        .with_state(state)
}

async fn require_authorization(
    State(state): State<ControlState>,
    req: Request,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();
    let authorized = state.authorizer.authorize(&parts).await;
    match authorized {
        Ok(()) => next.run(Request::from_parts(parts, body)).await,
        Err(e) => {
            warn!(
                method = %parts.method,
                path = parts.uri.path(),
                error = %e,
                "Control write refused"
            );
            AdmissionError::Unauthorized.into_response()
        }
    }
}

/// Keys arrive without their leading slash from the wildcard segment.
/// Regex and template keys must compile before they reach the registry.
fn normalize_key(raw: &str) -> AdmissionResult<EndpointKey> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "/" {
        return Err(AdmissionError::InvalidKey(raw.to_string()));
    }
    let key = if raw.starts_with('/') || raw.starts_with('^') {
        EndpointKey::new(raw)
    } else {
        EndpointKey::new(format!("/{raw}"))
    };

    let compiled = match PatternKind::classify(&key) {
        PatternKind::AnchoredRegex => compile_from_start(key.as_str()),
        PatternKind::WildcardTemplate => compile_template(key.as_str()),
        PatternKind::ExactWithMethod | PatternKind::ExactLegacy => return Ok(key),
    };
    compiled.map_err(|source| AdmissionError::InvalidPattern {
        pattern: key.to_string(),
        source,
    })?;
    Ok(key)
}

async fn list_endpoints(State(state): State<ControlState>) -> Json<Value> {
    let flags = state.controller.flags();
    let endpoints: BTreeMap<String, EndpointView> = state
        .controller
        .registry()
        .list()
        .into_iter()
        .map(|record| {
            let feature_flag = flags.prefix_flag_for(record.key.path());
            let view = EndpointView {
                enabled: record.enabled,
                description: record.description,
                feature_flag,
            };
            (record.key.into_string(), view)
        })
        .collect();

    Json(json!({
        "endpoints": endpoints,
        "feature_flags": flags.snapshot(),
        "generated_at": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn list_flags(State(state): State<ControlState>) -> Json<BTreeMap<String, bool>> {
    Json(state.controller.flags().snapshot())
}

async fn update_endpoint(
    State(state): State<ControlState>,
    Path(key): Path<String>,
    Json(update): Json<EndpointUpdate>,
) -> AdmissionResult<Json<Value>> {
    let key = normalize_key(&key)?;
    let registry = state.controller.registry();
    registry.update(key.clone(), update.enabled, update.description);
    state.after_write();
    info!(key = %key, enabled = update.enabled, "Endpoint updated");

    let record = registry
        .get(key.as_str())
        .ok_or_else(|| AdmissionError::InvalidKey(key.to_string()))?;
    Ok(Json(json!(record)))
}

async fn toggle_endpoint(
    State(state): State<ControlState>,
    Json(request): Json<ToggleRequest>,
) -> AdmissionResult<Json<Value>> {
    let key = normalize_key(&request.key)?;
    let enabled = state.controller.registry().toggle(key.clone());
    state.after_write();
    info!(key = %key, enabled, "Endpoint toggled");
    Ok(Json(json!({ "key": key, "enabled": enabled })))
}

async fn bulk_update(
    State(state): State<ControlState>,
    Json(request): Json<BulkUpdate>,
) -> AdmissionResult<Json<BulkUpdateResult>> {
    let matched_count = state
        .controller
        .registry()
        .bulk_update(&request.pattern, request.enabled)?;
    state.after_write();
    Ok(Json(BulkUpdateResult { matched_count }))
}

async fn set_flag(
    State(state): State<ControlState>,
    Path(name): Path<String>,
    Json(update): Json<FlagUpdate>,
) -> AdmissionResult<Json<Value>> {
    if name.trim().is_empty() {
        return Err(AdmissionError::InvalidKey(name));
    }
    state.controller.flags().set(&name, update.value);
    state.after_write();
    Ok(Json(json!({ "name": name, "value": update.value })))
}

async fn refresh_domains(State(state): State<ControlState>) -> Json<Value> {
    let domains = state.controller.rediscover_domains();
    state.after_write();
    Json(json!({
        "domains": domains,
        "feature_flags": state.controller.flags().snapshot(),
    }))
}

async fn refresh_schema(State(state): State<ControlState>) -> Json<Value> {
    let visibility_changes = state.controller.refresh_visibility();
    if let Some(schema) = &state.schema {
        schema.invalidate();
    }
    info!(visibility_changes, "API document refresh requested");
    Json(json!({ "refreshed": true, "visibility_changes": visibility_changes }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_keys_get_their_slash_back() {
        assert_eq!(
            normalize_key("api/v1/users/{id}:GET").unwrap().as_str(),
            "/api/v1/users/{id}:GET"
        );
        assert_eq!(normalize_key("/already:POST").unwrap().as_str(), "/already:POST");
        assert!(matches!(normalize_key("  "), Err(AdmissionError::InvalidKey(_))));
    }

    #[test]
    fn malformed_patterns_are_refused() {
        assert!(matches!(
            normalize_key("^/api/(broken"),
            Err(AdmissionError::InvalidPattern { .. })
        ));
        assert!(matches!(
            normalize_key("api/v1/{id}/x/{id}:GET"),
            Err(AdmissionError::InvalidPattern { .. })
        ));
        assert!(matches!(
            normalize_key("api/v1/{bad-name}"),
            Err(AdmissionError::InvalidPattern { .. })
        ));
        assert!(normalize_key("^/api/v1/admin/.*").is_ok());
    }
}
