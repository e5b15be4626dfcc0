//! Filtered API document.
//!
//! [`SchemaFilter`] takes the raw document from a [`SchemaSource`], strips
//! every operation whose endpoint is disabled, and caches the result. The
//! cache is not tied to registry or flag writes: it is dropped only by
//! [`SchemaFilter::invalidate`], which the control API calls on an explicit
//! refresh (or after every write under the `on_mutation` policy).

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use axum::{Json, Router, extract::State, routing::get};
use http::Method;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{
    config::SchemaConfig,
    core::{AdmissionController, EndpointKey, EndpointRegistry},
    ports::schema_source::SchemaSource,
};

/// Keys of an OpenAPI path item that describe operations.
const OPERATION_KEYS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

pub struct SchemaFilter {
    controller: Arc<AdmissionController>,
    source: Arc<dyn SchemaSource>,
    cached: ArcSwapOption<Value>,
}

impl SchemaFilter {
    pub fn new(controller: Arc<AdmissionController>, source: Arc<dyn SchemaSource>) -> Self {
        Self {
            controller,
            source,
            cached: ArcSwapOption::empty(),
        }
    }

    /// Cached filtered document, computed on first use.
    ///
    /// Two callers racing on an empty cache may both compute; each stores a
    /// complete document and the later store wins.
    pub fn document(&self) -> Arc<Value> {
        if let Some(document) = self.cached.load_full() {
            return document;
        }
        let document = Arc::new(filter_document(
            self.source.generate(),
            self.controller.registry(),
        ));
        self.cached.store(Some(document.clone()));
        debug!("API document computed and cached");
        document
    }

    /// Drop the cached document. The next read recomputes it.
    pub fn invalidate(&self) {
        self.cached.store(None);
    }

    pub fn is_cached(&self) -> bool {
        self.cached.load().is_some()
    }
}

/// Remove operations whose key is disabled, trying `path:METHOD` first and
/// the legacy `path` key second. Path items left without operations go too.
pub fn filter_document(mut document: Value, registry: &EndpointRegistry) -> Value {
    let Some(paths) = document.get_mut("paths").and_then(Value::as_object_mut) else {
        return document;
    };

    paths.retain(|path, item| {
        let Some(operations) = item.as_object_mut() else {
            return true;
        };
        operations.retain(|name, _| {
            if !OPERATION_KEYS.contains(&name.as_str()) {
                return true;
            }
            let Ok(method) = name.to_ascii_uppercase().parse::<Method>() else {
                return true;
            };
            let exact = EndpointKey::compose(path, &method);
            let state = registry
                .state(exact.as_str())
                .or_else(|| registry.state(path));
            state != Some(false)
        });
        operations
            .keys()
            .any(|name| OPERATION_KEYS.contains(&name.as_str()))
    });

    document
}

/// Builds a minimal OpenAPI document from the routes bound through
/// [`RouteBinder`](crate::adapters::binder::RouteBinder), listing only those
/// whose visibility snapshot is on.
pub struct RouteTableSchema {
    controller: Arc<AdmissionController>,
    title: String,
    version: String,
}

impl RouteTableSchema {
    pub fn new(controller: Arc<AdmissionController>, config: &SchemaConfig) -> Self {
        Self {
            controller,
            title: config.title.clone(),
            version: config.version.clone(),
        }
    }
}

impl SchemaSource for RouteTableSchema {
    fn generate(&self) -> Value {
        let mut paths = Map::new();
        for entry in self
            .controller
            .bindings()
            .snapshot()
            .into_iter()
            .filter(|entry| entry.visible)
        {
            let item = paths
                .entry(entry.path.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(operations) = item.as_object_mut() {
                operations.insert(
                    entry.method.as_str().to_ascii_lowercase(),
                    json!({
                        "operationId": entry.key.as_str(),
                        "summary": entry.description,
                        "responses": { "200": { "description": "Successful Response" } },
                    }),
                );
            }
        }

        json!({
            "openapi": "3.1.0",
            "info": { "title": self.title, "version": self.version },
            "paths": paths,
        })
    }
}

async fn serve_document(State(filter): State<Arc<SchemaFilter>>) -> Json<Value> {
    Json(filter.document().as_ref().clone())
}

/// Router serving the filtered document at `path`.
pub fn schema_router<S>(filter: Arc<SchemaFilter>, path: &str) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route(path, get(serve_document))
        .with_state(filter)
}
