//! Document Store Error Types
//!
//! Structured errors for document store reads.
//! Maps HTTP status codes to specific variants so callers can tell a missing
//! document from an unreachable store.

/// Document store error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Request error: {0}")]
    Request(String),
}

impl StoreError {
    /// Whether the store itself could not be reached or did not answer in time.
    ///
    /// `NotFound` and decode failures mean the store answered, so they are
    /// not "unavailable" even though the caller still falls back.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::RateLimited
                | StoreError::Timeout
                | StoreError::Network(_)
                | StoreError::Server(_, _)
        )
    }

    /// Create a StoreError from an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => StoreError::Unauthorized(body.to_string()),
            403 => StoreError::Forbidden(body.to_string()),
            404 => StoreError::NotFound(body.to_string()),
            408 => StoreError::Timeout,
            429 => StoreError::RateLimited,
            500..=599 => StoreError::Server(status, body.to_string()),
            _ => StoreError::Request(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else if err.is_connect() || err.is_request() {
            StoreError::Network(err.to_string())
        } else {
            StoreError::Request(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            StoreError::from_status(404, "missing"),
            StoreError::NotFound("missing".to_string())
        );
        assert_eq!(StoreError::from_status(429, ""), StoreError::RateLimited);
        assert_eq!(StoreError::from_status(408, ""), StoreError::Timeout);
        assert!(matches!(
            StoreError::from_status(503, "down"),
            StoreError::Server(503, _)
        ));
        assert!(matches!(
            StoreError::from_status(401, ""),
            StoreError::Unauthorized(_)
        ));
        assert!(matches!(
            StoreError::from_status(418, "teapot"),
            StoreError::Request(_)
        ));
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(StoreError::Timeout.is_unavailable());
        assert!(StoreError::Server(500, String::new()).is_unavailable());
        assert!(!StoreError::NotFound("home/hero".to_string()).is_unavailable());
        assert!(!StoreError::Decode("bad json".to_string()).is_unavailable());
    }
}
