//! Request and history entities.

use super::Meta;
use crate::id::TypedId;

/// An HTTP request definition; the root of an edit aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Shared bookkeeping.
    pub meta: Meta,
    /// Owning project.
    pub project_id: TypedId,
    /// Display name.
    pub name: String,
    /// Description.
    pub desc: String,
    /// Target URL. A request with a blank URL is considered incomplete.
    pub url: String,
    /// Index of the selected method in the project's method list.
    pub selected_method_index: i64,
    /// Selected method (shared reference, not owned).
    pub method_id: Option<TypedId>,
    /// Whether TLS certificates are validated.
    pub validate_ssl: bool,
}

impl Request {
    /// Creates an empty request.
    #[must_use]
    pub fn new(meta: Meta, project_id: TypedId) -> Self {
        Self {
            meta,
            project_id,
            name: String::new(),
            desc: String::new(),
            url: String::new(),
            selected_method_index: 0,
            method_id: None,
            validate_ssl: true,
        }
    }
}

/// One executed request/response pair. Append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    /// Shared bookkeeping.
    pub meta: Meta,
    /// Owning request.
    pub request_id: TypedId,
    /// URL that was called.
    pub url: String,
    /// Method name that was used.
    pub method: String,
    /// HTTP status code.
    pub status_code: i64,
    /// Round-trip time in milliseconds.
    pub elapsed_ms: i64,
    /// Serialized cookie jar. Encrypted before leaving the device.
    pub cookies: Vec<u8>,
    /// Raw response body. Travels as an external asset.
    pub response: Vec<u8>,
}

impl History {
    /// Creates an empty history entry.
    #[must_use]
    pub fn new(meta: Meta, request_id: TypedId) -> Self {
        Self {
            meta,
            request_id,
            url: String::new(),
            method: String::new(),
            status_code: 0,
            elapsed_ms: 0,
            cookies: Vec::new(),
            response: Vec::new(),
        }
    }
}
