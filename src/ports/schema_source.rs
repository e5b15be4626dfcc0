use serde_json::Value;

/// SchemaSource produces the raw API document before admission filtering.
///
/// The document is expected to follow the OpenAPI layout: a top-level
/// `paths` object whose entries map lowercase method names to operations.
pub trait SchemaSource: Send + Sync + 'static {
    fn generate(&self) -> Value;
}
