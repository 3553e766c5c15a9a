use thiserror::Error;

use gitlink_db::VaultError;
use gitlink_gitlab::UpstreamError;

use crate::command::Action;

pub const NOT_CONNECTED_TEXT: &str = "You must connect your account to GitLab first. Either click on the GitLab logo in the bottom left of the screen or enter `/gitlab connect`.";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("no linked GitLab account")]
    NotLinked,

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed arguments; the text is shown to the user as is.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("credential could not be decrypted")]
    Crypto,

    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),

    /// Rejection from the subscription manager; shown verbatim.
    #[error("{0}")]
    Subscription(String),
}

impl CommandError {
    /// Text to show the requester. Validation, not-linked and subscription
    /// messages are passed through; everything else collapses to the
    /// action's generic failure text so internal detail never reaches chat.
    pub fn user_message(&self, action: Action) -> String {
        match self {
            Self::NotLinked => NOT_CONNECTED_TEXT.to_string(),
            Self::Validation(text) | Self::Subscription(text) => text.clone(),
            Self::Configuration(_) | Self::Upstream(_) | Self::Crypto | Self::Storage(_) => {
                action.failure_text().to_string()
            }
        }
    }
}

impl From<VaultError> for CommandError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::NotLinked(_) => Self::NotLinked,
            VaultError::Crypto => Self::Crypto,
            VaultError::Storage(e) => Self::Storage(e),
            VaultError::Corrupt(e) => Self::Storage(e.into()),
        }
    }
}
