//! Paused-request snapshots held while a breakpoint is open.

use serde::{Deserialize, Serialize};

use crate::headers::HeaderFields;

/// HTTP methods offered as the canonical selectable set. A snapshot may carry
/// a verb outside this list (custom methods are passed through uncoerced).
pub const KNOWN_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

pub fn is_known_method(method: &str) -> bool {
    KNOWN_METHODS.contains(&method)
}

/// One paused outbound request. Edits use full-replace-on-field-change
/// semantics: each `with_*` builds a new snapshot copying every other field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakpointRequest {
    pub method: String,
    pub url: String,
    pub headers: HeaderFields,
}

impl BreakpointRequest {
    pub fn new(
        method: impl Into<String>,
        url: impl Into<String>,
        headers: HeaderFields,
    ) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers,
        }
    }

    pub fn with_method(&self, method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: self.url.clone(),
            headers: self.headers.clone(),
        }
    }

    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            method: self.method.clone(),
            url: url.into(),
            headers: self.headers.clone(),
        }
    }

    pub fn with_headers(&self, headers: HeaderFields) -> Self {
        Self {
            method: self.method.clone(),
            url: self.url.clone(),
            headers,
        }
    }
}
