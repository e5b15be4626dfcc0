//! Assembly of the served application from a [`GatekeeperConfig`].
//!
//! The binary and the integration tests build the exact same router here:
//! configured routes bound through [`RouteBinder`], the filtered API
//! document, the control API, and the admission gate wrapped around all of
//! it.

use std::{collections::BTreeMap, sync::Arc};

use axum::{Json, Router, middleware, routing::get};
use eyre::{Result, WrapErr};
use http::Method;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    adapters::{
        BearerTokenAuthorizer, ControlState, RouteBinder, RouteTableSchema, SchemaFilter,
        control_router, request_id_middleware, schema_router, with_admission,
    },
    config::{GatekeeperConfig, RouteDeclaration},
    core::{AdmissionController, RouteOptions},
    tracing_setup::component_span,
};

/// A fully wired application and the handles tests and operators need.
pub struct GatekeeperApp {
    pub router: Router,
    pub controller: Arc<AdmissionController>,
    pub schema: Arc<SchemaFilter>,
}

impl std::fmt::Debug for GatekeeperApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatekeeperApp")
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

/// Validate `config` and build the application router.
pub fn build_app(config: &GatekeeperConfig) -> Result<GatekeeperApp> {
    let _span = component_span("app").entered();
    let controller = Arc::new(AdmissionController::from_config(config)?);

    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health));

    let mut by_domain: BTreeMap<&str, Vec<&RouteDeclaration>> = BTreeMap::new();
    for route in &config.routes {
        by_domain.entry(route.domain.as_str()).or_default().push(route);
    }
    for (domain, routes) in by_domain {
        let mut binder = RouteBinder::domain(controller.clone(), domain);
        for route in routes {
            let method: Method = route
                .method
                .to_ascii_uppercase()
                .parse()
                .wrap_err_with(|| format!("Invalid method for route {}", route.path))?;
            binder = bind_declared(binder, domain, route, method);
        }
        info!(domain, routes = binder.bound().len(), "Domain routes bound");
        router = router.merge(binder.into_router());
    }

    let source = Arc::new(RouteTableSchema::new(controller.clone(), &config.schema));
    let schema = Arc::new(SchemaFilter::new(controller.clone(), source));
    router = router.merge(schema_router(schema.clone(), &config.schema.path));

    let authorizer = Arc::new(BearerTokenAuthorizer::new(config.control.api_key.clone()));
    let control = ControlState::new(controller.clone(), authorizer)
        .with_schema(schema.clone(), config.schema.cache);
    router = router.nest(&config.control.prefix, control_router(control));

    let router = with_admission(router, controller.clone())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http());

    info!(
        endpoints = controller.registry().len(),
        flags = controller.flags().snapshot().len(),
        control = %config.control.prefix,
        "Application assembled"
    );

    Ok(GatekeeperApp {
        router,
        controller,
        schema,
    })
}

/// Bind one declared route to a stub handler echoing what was matched.
fn bind_declared(
    binder: RouteBinder,
    domain: &str,
    route: &RouteDeclaration,
    method: Method,
) -> RouteBinder {
    let mut options = RouteOptions::default()
        .description(route.description.clone())
        .enabled(route.enabled);
    if let Some(key) = &route.key {
        options = options.key(key.clone());
    }
    if !route.include_in_schema {
        options = options.hidden();
    }

    let body = json!({
        "domain": domain,
        "route": route.path,
        "method": method.as_str(),
    });
    binder.route(&route.path, method, move || async move { Json(body) }, options)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        extract::Request,
        http::StatusCode,
    };
    use tower::ServiceExt; // for oneshot

    use super::*;

    fn config() -> GatekeeperConfig {
        let mut config = GatekeeperConfig::builder().build().unwrap();
        config.routes.push(RouteDeclaration {
            domain: "users".to_string(),
            path: "/{user_id}".to_string(),
            method: "get".to_string(),
            key: None,
            description: "Read a user".to_string(),
            enabled: true,
            include_in_schema: true,
        });
        config
    }

    #[tokio::test]
    async fn serves_declared_routes_and_health() {
        let app = build_app(&config()).unwrap();

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/users/7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["route"], "/{user_id}");

        let response = app
            .router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut config = config();
        config.listen_addr = "nowhere".to_string();
        assert!(build_app(&config).is_err());
    }

    #[test]
    fn unmountable_configs_are_refused_not_panicking() {
        let mut root_control = config();
        root_control.control.prefix = "/".to_string();
        assert!(build_app(&root_control).is_err());

        let mut duplicate = config();
        let mut again = duplicate.routes[0].clone();
        again.method = "GET".to_string();
        duplicate.routes.push(again);
        assert!(build_app(&duplicate).is_err());

        let mut on_health = config();
        on_health.api_prefix = String::new();
        on_health.schema.path = "/openapi.json".to_string();
        let mut health = on_health.routes[0].clone();
        health.domain = "health".to_string();
        health.path = String::new();
        on_health.routes.push(health);
        assert!(build_app(&on_health).is_err());
    }
}
