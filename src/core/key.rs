//! Canonical endpoint keys.
//!
//! A key is either `"{path}:{METHOD}"` or the legacy method-less `"{path}"`,
//! which covers every method on that path. Registration and call-time
//! resolution both go through [`EndpointKey::compose`], so a handler's bound
//! key and the key derived from a request to it can never drift apart.

use std::{borrow::Borrow, fmt};

use http::Method;
use serde::{Deserialize, Serialize};

/// Methods recognised as a key suffix.
const KEY_METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "TRACE", "CONNECT",
];

/// Order used by the handler-name compatibility shim. First hit wins.
const INFERENCE_ORDER: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
];

/// A registry key identifying a route (and usually a method).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointKey(String);

impl EndpointKey {
    /// Wrap a raw key string as-is.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The one place a `path:METHOD` key is built.
    pub fn compose(path: &str, method: &Method) -> Self {
        Self(format!("{path}:{}", method.as_str().to_ascii_uppercase()))
    }

    /// Method-less key matching any method on `path`.
    pub fn legacy(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into path and method, if the key carries a known method suffix.
    pub fn split(&self) -> (&str, Option<&str>) {
        split_method_suffix(&self.0)
    }

    /// Path part of the key.
    pub fn path(&self) -> &str {
        self.split().0
    }

    /// Method suffix of the key, if any.
    pub fn method(&self) -> Option<&str> {
        self.split().1
    }

    pub fn is_legacy(&self) -> bool {
        self.method().is_none()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EndpointKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Borrow<str> for EndpointKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

fn split_method_suffix(raw: &str) -> (&str, Option<&str>) {
    if let Some((path, suffix)) = raw.rsplit_once(':')
        && KEY_METHODS.contains(&suffix)
    {
        return (path, Some(suffix));
    }
    (raw, None)
}

/// How an explicit key without a method suffix gets one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyInference {
    /// Append the method the route was registered with.
    #[default]
    Declared,
    /// Compatibility shim: guess the method from the handler's name,
    /// falling back to the legacy form when nothing matches.
    HandlerName,
}

/// Derives keys for route registration and for live requests.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    api_prefix: String,
    inference: KeyInference,
}

impl KeyCodec {
    pub fn new(api_prefix: impl Into<String>, inference: KeyInference) -> Self {
        Self {
            api_prefix: api_prefix.into(),
            inference,
        }
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    /// Full mounted path of a route: `{api_prefix}{router_prefix}{route_path}`.
    pub fn full_path(&self, router_prefix: &str, route_path: &str) -> String {
        format!("{}{}{}", self.api_prefix, router_prefix, route_path)
    }

    /// Key assigned to a route when it is registered.
    ///
    /// An explicit key always wins. Without one the key is the composed
    /// full path plus the declared method.
    pub fn derive_at_registration(
        &self,
        router_prefix: &str,
        route_path: &str,
        method: &Method,
        explicit: Option<&str>,
        handler_name: Option<&str>,
    ) -> EndpointKey {
        let Some(explicit) = explicit else {
            return EndpointKey::compose(&self.full_path(router_prefix, route_path), method);
        };

        let key = EndpointKey::new(explicit);
        if !key.is_legacy() {
            return key;
        }

        match self.inference {
            KeyInference::Declared => EndpointKey::compose(explicit, method),
            KeyInference::HandlerName => match handler_name.and_then(infer_method_from_name) {
                Some(inferred) => EndpointKey::compose(explicit, &inferred),
                None => key,
            },
        }
    }

    /// Key for a live request. `path` is the matched route template when the
    /// router exposes one, otherwise the raw request path.
    pub fn derive_at_request(&self, path: &str, method: &Method) -> EndpointKey {
        EndpointKey::compose(path, method)
    }
}

/// Case-insensitive substring search for a verb in a handler name.
pub fn infer_method_from_name(name: &str) -> Option<Method> {
    let lowered = name.to_ascii_lowercase();
    INFERENCE_ORDER
        .iter()
        .find(|method| lowered.contains(&method.as_str().to_ascii_lowercase()))
        .cloned()
}
