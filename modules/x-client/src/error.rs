use thiserror::Error;

pub type Result<T> = std::result::Result<T, XApiError>;

#[derive(Error, Debug)]
pub enum XApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Credentials rejected. Will not self-resolve on retry — callers must
    /// escalate rather than wait for the next cycle.
    #[error("X API auth failure ({status}): {message}")]
    AuthFailed { status: u16, message: String },

    /// HTTP 429. Resolves on its own; callers back off until the next cycle.
    #[error("X API rate limited: {message}")]
    RateLimited { message: String },

    #[error("X API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl XApiError {
    /// Classify a non-success HTTP status. 401/403 are auth, 429 is
    /// rate-limit, everything else is a generic API failure.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => XApiError::AuthFailed { status, message },
            429 => XApiError::RateLimited { message },
            _ => XApiError::Api { status, message },
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, XApiError::AuthFailed { .. })
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, XApiError::RateLimited { .. })
    }
}
