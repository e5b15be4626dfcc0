//! Ports: the seams where the admission engine talks to collaborators it
//! does not own.

pub mod authorizer;
pub mod discovery;
pub mod schema_source;

pub use authorizer::{AdminAuthorizer, AuthError, AuthResult};
pub use discovery::{Domain, DomainSource};
pub use schema_source::SchemaSource;
