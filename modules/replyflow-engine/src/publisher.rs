//! Publish failure classification.
//!
//! A failed publish never consumes the pending row: the row stays `pending`
//! and the operator can retry the same command later. Auth and rate-limit
//! failures additionally raise an operator alert, since those need a human
//! (rotate the key, wait out the window) rather than a retry loop.

use thiserror::Error;

use x_client::XApiError;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("publish failed: {0}")]
    Other(String),
}

impl PublishError {
    /// Alert text for failures that need operator attention, None for
    /// transient ones worth only a log line.
    pub fn operator_alert(&self) -> Option<String> {
        match self {
            PublishError::Auth(msg) => Some(format!(
                "⚠️ Posting failed: authentication error. Check the API key.\n{msg}"
            )),
            PublishError::RateLimited(msg) => Some(format!(
                "⚠️ Posting failed: rate limited. The reply is still pending, try again later.\n{msg}"
            )),
            PublishError::Other(_) => None,
        }
    }
}

impl From<XApiError> for PublishError {
    fn from(err: XApiError) -> Self {
        if err.is_auth() {
            PublishError::Auth(err.to_string())
        } else if err.is_rate_limit() {
            PublishError::RateLimited(err.to_string())
        } else {
            PublishError::Other(err.to_string())
        }
    }
}
