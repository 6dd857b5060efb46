//! Identity of a remote operation.

use http::Method;

/// Identifies one operation of one remote service.
///
/// Endpoints are immutable and cheap enough to clone per attempt. The method
/// is carried for retry decisions; the path template is never interpolated by
/// the engine itself.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Endpoint {
    service: String,
    name: String,
    method: Method,
    path_template: String,
}

impl Endpoint {
    /// Create a new endpoint identity.
    pub fn new(
        service: impl Into<String>,
        name: impl Into<String>,
        method: Method,
        path_template: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            name: name.into(),
            method,
            path_template: path_template.into(),
        }
    }

    /// Name of the service the endpoint belongs to.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Name of the operation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// HTTP method of the operation.
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Path template of the operation.
    pub fn path_template(&self) -> &str {
        &self.path_template
    }

    /// Whether the operation may be replayed without changing its effect.
    ///
    /// Server errors are only retried against idempotent endpoints.
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.method.as_str(),
            "GET" | "HEAD" | "PUT" | "DELETE" | "OPTIONS" | "TRACE"
        )
    }
}
