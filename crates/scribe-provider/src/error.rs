//! Provider error types and retry classification.

use scribe_core::ErrorKind;

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, GenerationError>;

/// Errors returned by a generation provider.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// HTTP transport failed (connection, DNS, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The generation call exceeded its deadline.
    #[error("generation timed out after {seconds}s")]
    Timeout {
        /// The deadline that was exceeded.
        seconds: u64,
    },

    /// The provider is rate-limiting this client.
    #[error("provider rate limited: {message}")]
    RateLimited {
        /// Provider-supplied detail.
        message: String,
    },

    /// The provider rejected the prompt as invalid.
    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    /// The provider returned an error response.
    #[error("provider error: HTTP {status} - {message}")]
    Provider {
        /// HTTP status code.
        status: u16,
        /// Provider-supplied detail.
        message: String,
    },

    /// The provider response could not be decoded.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl GenerationError {
    /// Classify this error for the retry policy.
    ///
    /// Transport faults, timeouts, rate limits, and provider 5xx responses
    /// are worth retrying; a rejected prompt or any other 4xx will fail the
    /// same way every time.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(_) | Self::Timeout { .. } | Self::RateLimited { .. } => ErrorKind::Transient,
            Self::Provider { status, .. } if *status >= 500 => ErrorKind::Transient,
            Self::InvalidPrompt(_) | Self::Provider { .. } | Self::MalformedResponse(_) => {
                ErrorKind::Permanent
            }
        }
    }
}
