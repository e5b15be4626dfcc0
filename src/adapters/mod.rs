pub mod authorizer;
pub mod binder;
pub mod control;
pub mod extract;
pub mod guard;
pub mod middleware;
pub mod schema;

/// Re-export commonly used types from adapters
pub use authorizer::BearerTokenAuthorizer;
pub use binder::RouteBinder;
pub use control::{ControlState, control_router};
pub use extract::{Admitted, FlagGate, FlagName};
pub use guard::{GuardState, call_guard, guarded};
pub use middleware::*;
pub use schema::{RouteTableSchema, SchemaFilter, filter_document, schema_router};
