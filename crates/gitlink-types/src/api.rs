use serde::{Deserialize, Serialize};

/// Display name every command response is authored under.
pub const BOT_DISPLAY_NAME: &str = "GitLab";
pub const BOT_ICON_URL: &str = "https://about.gitlab.com/images/press/logo/png/gitlab-icon-rgb.png";

// -- Event socket auth --

/// JWT claims a client presents when opening the event socket.
/// `sub` is the platform user ID events are targeted at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Commands --

/// A slash command as delivered by the host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandRequest {
    pub command: String,
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Visible only to the user who ran the command.
    Ephemeral,
    InChannel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub response_type: ResponseType,
    pub text: String,
    pub username: String,
    pub icon_url: String,
}

impl CommandResponse {
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            response_type: ResponseType::Ephemeral,
            text: text.into(),
            username: BOT_DISPLAY_NAME.to_string(),
            icon_url: BOT_ICON_URL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_request_tolerates_extra_host_fields() {
        let json = r#"{"command":"/gitlab todo","user_id":"u1","team_id":"t1","root_id":""}"#;
        let req: CommandRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.command, "/gitlab todo");
        assert_eq!(req.user_id, "u1");
        assert_eq!(req.channel_id, "");
    }

    #[test]
    fn ephemeral_response_is_authored_by_the_bot() {
        let resp = CommandResponse::ephemeral("hi");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["response_type"], "ephemeral");
        assert_eq!(json["username"], BOT_DISPLAY_NAME);
        assert_eq!(json["text"], "hi");
    }
}
