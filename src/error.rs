//! Failure taxonomy for the document store boundary.
//!
//! Every store operation returns a [`StoreError`] on failure rather than a
//! stringly-typed error, so callers can distinguish a missing document
//! (often expected) from a transport failure or a revision conflict
//! (never expected) without parsing messages.

use thiserror::Error;

/// Store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure: connection refused, timeout, DNS.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The requested document does not exist (HTTP 404).
    #[error("document not found: {0}")]
    NotFound(String),

    /// Revision mismatch on update or delete (HTTP 409).
    #[error("revision conflict: {0}")]
    Conflict(String),

    /// Malformed selector, bad payload, or a document that fails
    /// shape validation (HTTP 400 or local schema check).
    #[error("validation error: {0}")]
    Validation(String),

    /// Any other non-2xx response, with the raw status and body attached.
    #[error("unexpected response (HTTP {status}): {body}")]
    Unexpected { status: u16, body: String },

    /// JSON serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Map a non-success HTTP status and response body to the matching
    /// error kind. `context` names the document or operation involved.
    pub fn from_status(status: u16, body: String, context: &str) -> Self {
        match status {
            404 => StoreError::NotFound(context.to_string()),
            409 => StoreError::Conflict(context.to_string()),
            400 => StoreError::Validation(body),
            _ => StoreError::Unexpected { status, body },
        }
    }

    /// True for failures callers commonly treat as expected (missing doc).
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// True for revision conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(StoreError::from_status(404, String::new(), "doc1").is_not_found());
        assert!(StoreError::from_status(409, String::new(), "doc1").is_conflict());
        assert!(matches!(
            StoreError::from_status(400, "bad selector".into(), "q"),
            StoreError::Validation(_)
        ));
        assert!(matches!(
            StoreError::from_status(500, "boom".into(), "q"),
            StoreError::Unexpected { status: 500, .. }
        ));
    }
}
