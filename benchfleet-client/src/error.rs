//! Error types for the benchfleet clients

use benchfleet_core::codec::CodecError;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the orchestrator or to cloud APIs
#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP connection could not be established
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TCP connection was not established in time
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    /// Framing or decoding failed on an orchestrator stream
    #[error("transport error: {0}")]
    Transport(#[from] CodecError),

    /// The orchestrator acknowledged fewer measurements than were sent
    #[error("orchestrator stored {stored} of {sent} measurements")]
    Unacknowledged { sent: usize, stored: u64 },

    /// Local I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// No usable access token
    #[error("no access token available: {0}")]
    Auth(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if this error happened while reaching the orchestrator
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::ConnectTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ClientError::api_error(404, "missing").is_not_found());
        assert!(!ClientError::api_error(500, "boom").is_not_found());
        assert!(ClientError::ConnectTimeout("10.0.0.1:5002".into()).is_connection_error());
        assert_eq!(
            ClientError::api_error(403, "denied").to_string(),
            "API error (status 403): denied"
        );
    }
}
