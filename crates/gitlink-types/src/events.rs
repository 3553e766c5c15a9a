use serde::{Deserialize, Serialize};

/// Events pushed to a single platform user's client surface so it can
/// refresh its linked-account UI. Payloads are intentionally empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Server confirms the socket is authenticated
    Ready { user_id: String },

    /// A GitLab account was linked
    Connect,

    /// The GitLab account was unlinked
    Disconnect,

    /// Linked-account state changed (settings, etc.)
    Refresh,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Refresh => "refresh",
        }
    }
}
