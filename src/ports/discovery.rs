use serde::{Deserialize, Serialize};

/// A convention-grouped set of endpoints, such as `auth` or `profiles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    /// Domain name, used to build the default flag name
    pub name: String,

    /// Path prefix owned by the domain. Defaults to `{api_prefix}/{name}/`.
    #[serde(default)]
    pub prefix: Option<String>,
}

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: None,
        }
    }

    pub fn with_prefix(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: Some(prefix.into()),
        }
    }

    /// Default flag gating this domain: `enable_{name}_endpoints`.
    pub fn flag_name(&self) -> String {
        format!("enable_{}_endpoints", self.name)
    }
}

/// DomainSource lists the domains currently known to the application.
///
/// Discovery runs on the request path when flags are recomputed, so
/// implementations must be in-memory and non-blocking.
pub trait DomainSource: Send + Sync + 'static {
    fn discover(&self) -> Vec<Domain>;
}
