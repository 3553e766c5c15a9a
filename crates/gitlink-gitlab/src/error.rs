use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("GitLab request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success status; `message` is GitLab's own error text when it sent one.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("GitLab request cancelled")]
    Cancelled,

    #[error("GitLab did not answer within {0:?}")]
    TimedOut(Duration),
}

impl UpstreamError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}
