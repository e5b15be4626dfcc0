//! Per-handler admission check.
//!
//! The global middleware already gates every request; the guard repeats the
//! registry check right in front of one handler. A handler registered
//! through the binder carries its [`HandlerId`] and is checked against its
//! bound key. Anything else derives a key from the matched route and
//! registers it on first sight.

use std::sync::Arc;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use tracing::debug;

use crate::core::{AdmissionController, AdmissionError, HandlerId};

/// State captured by one guard instance.
#[derive(Clone)]
pub struct GuardState {
    controller: Arc<AdmissionController>,
    handler: Option<HandlerId>,
}

impl GuardState {
    pub fn new(controller: Arc<AdmissionController>, handler: Option<HandlerId>) -> Self {
        Self {
            controller,
            handler,
        }
    }
}

pub async fn call_guard(State(guard): State<GuardState>, req: Request, next: Next) -> Response {
    // The route template keeps the derived key equal to the one a binder
    // would have assigned.
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let key = guard
        .controller
        .resolve_call(guard.handler, &path, req.method());
    if !guard.controller.registry().is_enabled(key.as_str()) {
        debug!(key = %key, "Call guard rejected disabled endpoint");
        return AdmissionError::NotFound.into_response();
    }
    next.run(req).await
}

/// Wrap every handler of `method_router` in a call guard.
pub fn guarded<S>(
    method_router: MethodRouter<S>,
    controller: Arc<AdmissionController>,
    handler: Option<HandlerId>,
) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    method_router.layer(middleware::from_fn_with_state(
        GuardState::new(controller, handler),
        call_guard,
    ))
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Method, StatusCode},
        routing::get,
    };
    use tower::ServiceExt; // for oneshot

    use super::*;
    use crate::{config::GatekeeperConfig, core::RouteOptions};

    fn controller() -> Arc<AdmissionController> {
        let config = GatekeeperConfig::builder().build().unwrap();
        Arc::new(AdmissionController::new(&config))
    }

    async fn status(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn unbound_route_auto_registers_by_template() {
        let controller = controller();
        let app = Router::new().route(
            "/api/v1/users/{user_id}",
            guarded(get(|| async { "user" }), controller.clone(), None),
        );

        assert_eq!(status(app.clone(), "/api/v1/users/7").await, StatusCode::OK);
        assert_eq!(
            controller.registry().state("/api/v1/users/{user_id}:GET"),
            Some(true)
        );

        controller
            .registry()
            .disable("/api/v1/users/{user_id}:GET".into());
        assert_eq!(status(app, "/api/v1/users/8").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bound_handler_checks_its_own_key() {
        let controller = controller();
        let id = controller.bind_route(
            "",
            "/report",
            &Method::GET,
            &RouteOptions::default().key("/custom/report:GET"),
        );
        let app = Router::new().route(
            "/api/v1/report",
            guarded(get(|| async { "report" }), controller.clone(), Some(id)),
        );

        assert_eq!(status(app.clone(), "/api/v1/report").await, StatusCode::OK);
        controller.registry().disable("/custom/report:GET".into());
        assert_eq!(status(app, "/api/v1/report").await, StatusCode::NOT_FOUND);
    }
}
