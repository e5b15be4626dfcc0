use async_trait::async_trait;
use http::{header::AUTHORIZATION, request::Parts};

use crate::ports::authorizer::{AdminAuthorizer, AuthError, AuthResult};

/// Accepts control writes carrying `Authorization: Bearer <token>`.
///
/// Without a configured token every write is refused.
#[derive(Debug, Clone)]
pub struct BearerTokenAuthorizer {
    token: Option<String>,
}

impl BearerTokenAuthorizer {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|token| !token.is_empty()),
        }
    }
}

#[async_trait]
impl AdminAuthorizer for BearerTokenAuthorizer {
    async fn authorize(&self, parts: &Parts) -> AuthResult<()> {
        let Some(expected) = &self.token else {
            return Err(AuthError::NotConfigured);
        };

        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AuthError::MissingCredentials)?;

        if presented == expected {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}
