use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth credential for the external service.
/// Only ever holds the cleartext access token in memory; the vault swaps in
/// ciphertext before the record is written.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl OAuthToken {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expiry: None,
        }
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("expiry", &self.expiry)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub notifications: bool,
    pub daily_reminder: bool,
}

/// Newly linked accounts start with both notifications and reminders on.
impl Default for UserSettings {
    fn default() -> Self {
        Self {
            notifications: true,
            daily_reminder: true,
        }
    }
}

/// Association between one platform user and one GitLab account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedIdentity {
    pub user_id: String,
    pub token: OAuthToken,
    pub gitlab_username: String,
    /// Advisory; last time a todo summary was produced for this user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_todo_post_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub settings: UserSettings,
}

impl LinkedIdentity {
    pub fn new(user_id: impl Into<String>, gitlab_username: impl Into<String>, token: OAuthToken) -> Self {
        Self {
            user_id: user_id.into(),
            token,
            gitlab_username: gitlab_username.into(),
            last_todo_post_at: None,
            settings: UserSettings::default(),
        }
    }

    pub fn apply(&mut self, setting: Setting, toggle: Toggle) {
        let value = toggle.is_on();
        match setting {
            Setting::Notifications => self.settings.notifications = value,
            Setting::Reminders => self.settings.daily_reminder = value,
        }
    }
}

/// User-adjustable flags. Closed set; anything else is rejected while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    Notifications,
    Reminders,
}

impl Setting {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "notifications" => Some(Self::Notifications),
            "reminders" => Some(Self::Reminders),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notifications => "notifications",
            Self::Reminders => "reminders",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            _ => None,
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }
}
