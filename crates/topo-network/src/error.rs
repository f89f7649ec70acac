//! Gateway error types
//!
//! These cover failures where no backend answer was obtained at all. A backend
//! that answers with an error status is not a `GatewayError`; it is a
//! [`topo_core::BackendResult`] with `ok == false`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Failed to build HTTP client: {0}")]
    Build(String),

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Failed to decode backend response: {0}")]
    Decode(String),

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(String),
}

impl GatewayError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(url.to_string())
        } else {
            GatewayError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Get a helpful suggestion for resolving this error
    pub fn suggestion(&self) -> &'static str {
        match self {
            GatewayError::Build(_) => "Check TLS support and proxy environment variables",
            GatewayError::Transport { .. } => {
                "Check that the backend is running and TOPO_BACKEND_URL points at it"
            }
            GatewayError::Timeout(_) => "Increase TOPO_TIMEOUT_SECS or check backend load",
            GatewayError::Decode(_) => "Check that the backend version matches this client",
            GatewayError::Unsupported(_) => "Use a backend that implements this endpoint",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout(_))
    }

    /// Returns true if the backend could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport { .. } | GatewayError::Timeout(_)
        )
    }
}
