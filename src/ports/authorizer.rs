use async_trait::async_trait;
use http::request::Parts;
use thiserror::Error;

/// Custom error type for write authorization
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AuthError {
    /// No credentials were presented
    #[error("Missing credentials")]
    MissingCredentials,

    /// Credentials were presented but rejected
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// No credential is configured, so every write is refused
    #[error("Control writes are not configured")]
    NotConfigured,
}

/// Result type alias for authorization checks
pub type AuthResult<T> = Result<T, AuthError>;

/// AdminAuthorizer decides whether a caller may mutate admission state.
///
/// Only control-surface writes go through this port. Whether an ordinary
/// endpoint may be called by a given user is not this crate's concern.
#[async_trait]
pub trait AdminAuthorizer: Send + Sync + 'static {
    /// Check the request head of a control write.
    ///
    /// # Arguments
    /// * `parts` - Method, URI and headers of the incoming request
    async fn authorize(&self, parts: &Parts) -> AuthResult<()>;
}
