//! Gatekeeper - runtime admission control for HTTP endpoints.
//!
//! Gatekeeper decides, per request, whether an endpoint of an axum
//! application is currently served. Endpoints can be switched on and off at
//! runtime, individually, by regex or route template, or a whole domain at a
//! time through feature flags. A rejected request is answered exactly like a
//! route that does not exist, so a disabled endpoint cannot be told apart
//! from a missing one.
//!
//! # Features
//! - Endpoint keys of the form `path:METHOD`, with legacy method-less keys
//! - Registry of per-key enable states with regex bulk updates
//! - Domain feature flags discovered from declared domains, plus prefix and
//!   exact-path flag mappings
//! - A global admission middleware and per-handler call guards
//! - A filtered, cached API document that hides disabled operations
//! - An authenticated control API for live changes
//! - Layered configuration (file + `GATEKEEPER__*` environment) with validation
//! - Structured tracing via `tracing`
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use axum::Router;
//! use gatekeeper::{AdmissionController, RouteBinder, config::GatekeeperConfig, with_admission};
//!
//! # fn main() -> eyre::Result<()> {
//! let config = GatekeeperConfig::builder()
//!     .endpoint("/api/v1/users/{id}:DELETE", false)
//!     .build()
//!     .map_err(|e| eyre::eyre!(e))?;
//! let controller = Arc::new(AdmissionController::from_config(&config)?);
//!
//! let users = RouteBinder::domain(controller.clone(), "users")
//!     .get("/{id}", || async { "user" })
//!     .delete("/{id}", || async { "deleted" })
//!     .into_router();
//! let app: Router = with_admission(users, controller);
//! # let _ = app;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! Decision logic lives in `core` and has no HTTP server dependency beyond
//! `http` types. `ports` holds the traits for collaborators (domain
//! discovery, document generation, control authorization), and `adapters`
//! binds everything to axum.
//!
//! # Concurrency
//! Each store sits behind its own lock and every operation takes it for a
//! single read or write. Evaluation may observe a registry and a flag store
//! that were changed independently between its reads; each read on its own
//! is consistent.
//!
//! # Error Handling
//! Startup paths return `eyre::Result<T>`. Request paths use
//! [`AdmissionError`], which renders as the HTTP response the caller sees.
pub mod app;
pub mod config;
pub mod ports;
pub mod tracing_setup;

pub mod adapters;
pub mod core;

// Re-export the types most integrations need
pub use crate::{
    app::{GatekeeperApp, build_app},
    adapters::{
        BearerTokenAuthorizer, ControlState, RouteBinder, RouteTableSchema, SchemaFilter,
        control_router, request_id_middleware, schema_router, with_admission,
    },
    core::{
        AdmissionController, AdmissionError, Decision, EndpointKey, EndpointRegistry, FlagStore,
        KeyCodec, PatternMatcher, RouteOptions,
    },
};
