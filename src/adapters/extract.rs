//! Admission checks as handler arguments.
//!
//! [`Admitted`] repeats the full admission decision when the handler's
//! arguments are extracted. [`FlagGate`] checks a single named flag. Both
//! reject with the same 404 as every other surface.
//!
//! The router state must expose the controller through `FromRef`:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use axum::{Router, routing::get};
//! use gatekeeper::{
//!     AdmissionController,
//!     adapters::extract::{FlagGate, FlagName},
//!     config::GatekeeperConfig,
//! };
//!
//! struct Reports;
//!
//! impl FlagName for Reports {
//!     const NAME: &'static str = "enable_reports_endpoints";
//! }
//!
//! let controller = Arc::new(AdmissionController::new(&GatekeeperConfig::default()));
//! let app: Router = Router::new()
//!     .route("/reports", get(|_: FlagGate<Reports>| async { "reports" }))
//!     .with_state(controller);
//! ```

use std::{marker::PhantomData, sync::Arc};

use axum::extract::{FromRef, FromRequestParts, MatchedPath};
use http::request::Parts;
use tracing::debug;

use crate::core::{AdmissionController, AdmissionError, EndpointKey};

/// Proof that the current request passed admission.
#[derive(Debug, Clone, Copy)]
pub struct Admitted;

impl<S> FromRequestParts<S> for Admitted
where
    S: Send + Sync,
    Arc<AdmissionController>: FromRef<S>,
{
    type Rejection = AdmissionError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let controller = Arc::<AdmissionController>::from_ref(state);

        let decision = controller.evaluate(parts.uri.path(), &parts.method);
        if !decision.is_admitted() {
            debug!(path = parts.uri.path(), reason = ?decision, "Extractor rejected request");
            return Err(AdmissionError::NotFound);
        }

        // Templated routes are registered under their template, which the
        // concrete path lookup above cannot see.
        if let Some(matched) = parts.extensions.get::<MatchedPath>() {
            let key = EndpointKey::compose(matched.as_str(), &parts.method);
            if !controller.registry().is_enabled(key.as_str()) {
                debug!(key = %key, "Extractor rejected disabled route template");
                return Err(AdmissionError::NotFound);
            }
        }

        Ok(Admitted)
    }
}

/// Names the flag a [`FlagGate`] checks.
pub trait FlagName {
    const NAME: &'static str;
}

/// Rejects unless the flag named by `F` is on (or belongs to a carved-out
/// domain). Unknown flags are on.
pub struct FlagGate<F>(PhantomData<fn() -> F>);

impl<F> std::fmt::Debug for FlagGate<F>
where
    F: FlagName,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FlagGate").field(&F::NAME).finish()
    }
}

impl<S, F> FromRequestParts<S> for FlagGate<F>
where
    S: Send + Sync,
    F: FlagName,
    Arc<AdmissionController>: FromRef<S>,
{
    type Rejection = AdmissionError;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let controller = Arc::<AdmissionController>::from_ref(state);
        let flags = controller.flags();
        if flags.is_exempt(F::NAME) || flags.flags().is_enabled(F::NAME) {
            Ok(FlagGate(PhantomData))
        } else {
            debug!(flag = F::NAME, "Flag gate rejected request");
            Err(AdmissionError::NotFound)
        }
    }
}
