pub mod binding;
pub mod catalog;
pub mod controller;
pub mod error;
pub mod flags;
pub mod key;
pub mod matcher;
pub mod registry;

pub use binding::{BoundEndpoint, HandlerId, RouteOptions};
pub use controller::AdmissionController;
pub use error::{AdmissionError, AdmissionResult};
pub use flags::{FeatureFlags, FlagStore, PathPrefixMapping};
pub use key::{EndpointKey, KeyCodec, KeyInference};
pub use matcher::{Decision, PatternKind, PatternMatcher, Rejection};
pub use registry::{EndpointRecord, EndpointRegistry};
