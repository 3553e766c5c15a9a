use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Secrets that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "dev-secret-change-me"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{0} is still a placeholder value")]
    Placeholder(&'static str),

    #[error("{name} is not valid: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub site_url: Option<String>,
    pub gitlab_url: String,
    pub gitlab_org: Option<String>,
    pub encryption_key: String,
    pub command_token: String,
    pub events_secret: String,
    pub upstream_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |name: &'static str| optional(name).ok_or(ConfigurationError::Missing(name));
        let secret = |name: &'static str| {
            let value = required(name)?;
            if PLACEHOLDER_SECRETS.contains(&value.as_str()) {
                return Err(ConfigurationError::Placeholder(name));
            }
            Ok(value)
        };

        let port = match optional("GITLINK_PORT") {
            None => 3300,
            Some(v) => v.parse::<u16>().map_err(|_| ConfigurationError::Invalid {
                name: "GITLINK_PORT",
                value: v,
            })?,
        };

        let timeout_secs: u64 = match optional("GITLINK_UPSTREAM_TIMEOUT_SECS") {
            None => 15,
            Some(v) => v.parse::<u64>().ok().filter(|secs| *secs > 0).ok_or(ConfigurationError::Invalid {
                name: "GITLINK_UPSTREAM_TIMEOUT_SECS",
                value: v,
            })?,
        };

        let gitlab_url = required("GITLINK_GITLAB_URL")?;
        if !gitlab_url.starts_with("http://") && !gitlab_url.starts_with("https://") {
            return Err(ConfigurationError::Invalid {
                name: "GITLINK_GITLAB_URL",
                value: gitlab_url,
            });
        }

        Ok(Self {
            host: optional("GITLINK_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: optional("GITLINK_DB_PATH").unwrap_or_else(|| "gitlink.db".into()).into(),
            site_url: optional("GITLINK_SITE_URL"),
            gitlab_url: gitlab_url.trim_end_matches('/').to_string(),
            gitlab_org: optional("GITLINK_GITLAB_ORG"),
            encryption_key: secret("GITLINK_ENCRYPTION_KEY")?,
            command_token: secret("GITLINK_COMMAND_TOKEN")?,
            events_secret: secret("GITLINK_EVENTS_SECRET")?,
            upstream_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
