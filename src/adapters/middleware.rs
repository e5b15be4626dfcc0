//! Router-wide middleware.
//!
//! [`admission_middleware`] is the global gate: it runs before routing
//! reaches any handler and answers rejected requests with the same 404 a
//! missing route produces. [`request_id_middleware`] tags each request with
//! an id for log correlation.
use std::{sync::Arc, time::Instant};

use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderValue, Method},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use tracing::Instrument;

use crate::{
    core::{AdmissionController, AdmissionError, Decision},
    tracing_setup::create_request_span,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Evaluate the admission decision for every inbound request.
pub async fn admission_middleware(
    State(controller): State<Arc<AdmissionController>>,
    req: Request,
    next: Next,
) -> Response {
    let mut decision = controller.evaluate(req.uri().path(), req.method());
    // HEAD is served by the GET handler, so the GET key applies as well.
    if decision == Decision::Admitted && req.method() == Method::HEAD {
        decision = controller.evaluate(req.uri().path(), &Method::GET);
    }
    match decision {
        Decision::Rejected(reason) => {
            tracing::debug!(
                method = %req.method(),
                path = req.uri().path(),
                reason = ?reason,
                "Request rejected by admission control"
            );
            AdmissionError::NotFound.into_response()
        }
        Decision::Exempt | Decision::Admitted => next.run(req).await,
    }
}

/// Fallback for unknown paths and for known paths hit with the wrong method.
pub async fn not_found() -> AdmissionError {
    AdmissionError::NotFound
}

/// Put `router` behind the admission gate.
///
/// Unknown routes and method mismatches answer with the same 404 body as a
/// disabled route. Call this after every route has been added, since the
/// method fallback only reaches routes that already exist.
pub fn with_admission<S>(router: Router<S>, controller: Arc<AdmissionController>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(middleware::from_fn_with_state(controller, admission_middleware))
}

/// Reuse an inbound `X-Request-ID` or mint a UUID, run the request inside a
/// span carrying it, log start and completion, and echo the id back.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let span = create_request_span(method.as_str(), &path, &request_id);

    async move {
        let start = Instant::now();
        tracing::info!(method = %method, path = %path, "Request started");

        let mut response = next.run(req).await;

        let status = response.status();
        let duration_ms = start.elapsed().as_millis() as u64;
        let status_code = status.as_u16();
        let span = tracing::Span::current();
        span.record("http.status_code", status_code);
        span.record("duration_ms", duration_ms);
        if status.is_server_error() {
            tracing::error!(status = status_code, duration_ms, "Request completed");
        } else if status.is_client_error() {
            tracing::warn!(status = status_code, duration_ms, "Request completed");
        } else {
            tracing::info!(status = status_code, duration_ms, "Request completed");
        }

        if let Ok(header_value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
        }
        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::StatusCode,
        routing::get,
    };
    use tower::ServiceExt; // for oneshot

    use super::*;
    use crate::config::GatekeeperConfig;

    fn gated_app() -> (Router, Arc<AdmissionController>) {
        let config = GatekeeperConfig::builder()
            .endpoint("/items:GET", false)
            .build()
            .unwrap();
        let controller = Arc::new(AdmissionController::new(&config));
        let router = Router::new()
            .route("/items", get(|| async { "items" }))
            .route("/other", get(|| async { "other" }));
        (with_admission(router, controller.clone()), controller)
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_disabled_route_is_indistinguishable_from_missing() {
        let (app, _) = gated_app();
        let disabled = call(app.clone(), "GET", "/items").await;
        let missing = call(app.clone(), "GET", "/never-registered").await;
        let wrong_method = call(app, "DELETE", "/other").await;

        assert_eq!(disabled.0, StatusCode::NOT_FOUND);
        assert_eq!(disabled, missing);
        assert_eq!(disabled, wrong_method);
    }

    #[tokio::test]
    async fn test_head_follows_get_key() {
        let (app, _) = gated_app();
        let (status, _) = call(app.clone(), "HEAD", "/items").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(app, "HEAD", "/other").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admitted_request_passes_through() {
        let (app, controller) = gated_app();
        assert_eq!(call(app.clone(), "GET", "/other").await.1, b"other");

        controller.registry().enable("/items:GET".into());
        assert_eq!(call(app, "GET", "/items").await.1, b"items");
    }

    #[tokio::test]
    async fn test_request_id_middleware() {
        let app = Router::new()
            .route("/", get(|| async { StatusCode::OK }))
            .layer(middleware::from_fn(request_id_middleware));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(uuid::Uuid::parse_str(request_id).is_ok());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("X-Request-ID", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "abc-123");
    }
}
