//! Route registration with admission bookkeeping.
//!
//! [`RouteBinder`] wraps an axum [`Router`]. Every route added through it
//! gets a derived key seeded into the registry, a visibility snapshot, a
//! [`HandlerId`] in the side-table, and a call guard bound to that id.

use std::{collections::HashSet, sync::Arc};

use axum::{
    Router,
    handler::Handler,
    routing::{MethodFilter, on},
};
use http::Method;
use tracing::{debug, warn};

use crate::{
    adapters::guard::guarded,
    core::{AdmissionController, HandlerId, RouteOptions},
    ports::discovery::Domain,
};

pub struct RouteBinder<S = ()> {
    controller: Arc<AdmissionController>,
    prefix: String,
    router: Router<S>,
    bound: Vec<HandlerId>,
    mounted: HashSet<(String, Method)>,
    suppressed_by: Option<String>,
}

impl<S> RouteBinder<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Binder mounting routes directly under the API prefix.
    pub fn new(controller: Arc<AdmissionController>) -> Self {
        Self::with_prefix(controller, "")
    }

    /// Binder mounting routes under `{api_prefix}{prefix}`.
    pub fn with_prefix(controller: Arc<AdmissionController>, prefix: impl Into<String>) -> Self {
        Self {
            controller,
            prefix: prefix.into(),
            router: Router::new(),
            bound: Vec::new(),
            mounted: HashSet::new(),
            suppressed_by: None,
        }
    }

    /// Binder for a named domain, mounted under `{api_prefix}/{name}`. The
    /// domain is announced for discovery, which gives it a default flag.
    pub fn domain(controller: Arc<AdmissionController>, name: &str) -> Self {
        controller.declare_domain(Domain::new(name));
        Self::with_prefix(controller, format!("/{name}"))
    }

    /// Skip registering any further routes while `flag` is off.
    ///
    /// Suppressed routes never reach the registry or the router, so they
    /// stay absent until the process is restarted with the flag on.
    pub fn when_flag(mut self, flag: &str) -> Self {
        if !self.controller.flags().flags().is_enabled(flag) {
            debug!(flag, prefix = %self.prefix, "Route registration suppressed by flag");
            self.suppressed_by = Some(flag.to_string());
        }
        self
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed_by.is_some()
    }

    /// Register `handler` for `method` at `path` (relative to this binder).
    pub fn route<H, T>(mut self, path: &str, method: Method, handler: H, options: RouteOptions) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        if self.is_suppressed() {
            return self;
        }
        let filter = match MethodFilter::try_from(method.clone()) {
            Ok(filter) => filter,
            Err(e) => {
                warn!(method = %method, path, error = %e, "Unsupported method, route skipped");
                return self;
            }
        };

        let full_path = self.controller.codec().full_path(&self.prefix, path);
        if !self.mounted.insert((full_path.clone(), method.clone())) {
            warn!(method = %method, path = %full_path, "Route already bound, duplicate skipped");
            return self;
        }

        let id = self
            .controller
            .bind_route(&self.prefix, path, &method, &options);
        let method_router = guarded(on(filter, handler), self.controller.clone(), Some(id));

        self.router = self.router.route(&full_path, method_router);
        self.bound.push(id);
        self
    }

    pub fn get<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.route(path, Method::GET, handler, RouteOptions::default())
    }

    pub fn post<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.route(path, Method::POST, handler, RouteOptions::default())
    }

    pub fn put<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.route(path, Method::PUT, handler, RouteOptions::default())
    }

    pub fn patch<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.route(path, Method::PATCH, handler, RouteOptions::default())
    }

    pub fn delete<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.route(path, Method::DELETE, handler, RouteOptions::default())
    }

    /// Handlers bound so far, in registration order.
    pub fn bound(&self) -> &[HandlerId] {
        &self.bound
    }

    /// Finish and hand back the router, ready to merge at the root.
    pub fn into_router(self) -> Router<S> {
        self.router
    }
}
