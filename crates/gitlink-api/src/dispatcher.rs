use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use gitlink_db::{Vault, VaultError};
use gitlink_gitlab::{Aggregator, ClientFactory};
use gitlink_types::api::{CommandRequest, CommandResponse};
use gitlink_types::events::ClientEvent;
use gitlink_types::models::LinkedIdentity;

use crate::command::{Command, SettingsChange, help_text, parse};
use crate::error::CommandError;
use crate::host::Host;
use crate::subscriptions::SubscriptionManager;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Public base URL of the messaging host; `connect` can't build a link without it.
    pub site_url: Option<String>,
    /// GitLab instance URL, used for profile links.
    pub gitlab_url: String,
}

/// Routes one `/gitlab` command line to its action. Stateless between calls;
/// everything durable lives in the vault and the subscription manager.
pub struct CommandDispatcher {
    config: DispatcherConfig,
    vault: Vault,
    clients: Arc<dyn ClientFactory>,
    aggregator: Aggregator,
    subscriptions: Arc<dyn SubscriptionManager>,
    host: Arc<dyn Host>,
}

impl CommandDispatcher {
    pub fn new(
        config: DispatcherConfig,
        vault: Vault,
        clients: Arc<dyn ClientFactory>,
        aggregator: Aggregator,
        subscriptions: Arc<dyn SubscriptionManager>,
        host: Arc<dyn Host>,
    ) -> Self {
        Self {
            config,
            vault,
            clients,
            aggregator,
            subscriptions,
            host,
        }
    }

    /// Execute a command. `None` means the line was not ours (wrong trigger
    /// or unknown action) and should be left to other handlers.
    pub async fn execute(&self, req: &CommandRequest, cancel: &CancellationToken) -> Option<CommandResponse> {
        let invocation = parse(&req.command)?;
        let action = invocation.action;

        let result = match invocation.command {
            Ok(Command::Connect) => self.connect(),
            command => self.run_linked(req, command, cancel).await,
        };

        let text = result.unwrap_or_else(|err| {
            match &err {
                CommandError::NotLinked | CommandError::Validation(_) | CommandError::Subscription(_) => {}
                other => error!(user_id = %req.user_id, ?action, "Command failed: {:#}", other),
            }
            err.user_message(action)
        });

        Some(CommandResponse::ephemeral(text))
    }

    fn connect(&self) -> Result<String, CommandError> {
        let site_url = self
            .config
            .site_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .ok_or_else(|| CommandError::Configuration("site URL is not configured".to_string()))?;

        Ok(format!(
            "[Click here to link your GitLab account.]({}/plugins/gitlab/oauth/connect)",
            site_url
        ))
    }

    /// Every action other than `connect` needs a linked account. Resolution
    /// comes first so an unlinked user gets the same answer whatever they typed.
    /// `disconnect` skips it: a record whose token no longer decrypts must
    /// still be removable.
    async fn run_linked(
        &self,
        req: &CommandRequest,
        command: Result<Command, CommandError>,
        cancel: &CancellationToken,
    ) -> Result<String, CommandError> {
        if let Ok(Command::Disconnect) = command {
            return self.disconnect(&req.user_id).await;
        }

        let identity = self.resolve(&req.user_id).await?;

        match command? {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect(&identity.user_id).await,
            Command::Help => Ok(help_text()),
            Command::Todo => self.todo(&identity, cancel).await,
            Command::Me => self.me(&identity).await,
            Command::Settings(change) => self.settings(&identity.user_id, change).await,
            Command::Subscribe { repo, features } => {
                self.subscribe(&identity, &repo, &req.channel_id, &features).await
            }
            Command::Unsubscribe { repo } => self.unsubscribe(&req.channel_id, &repo).await,
        }
    }

    async fn todo(&self, identity: &LinkedIdentity, cancel: &CancellationToken) -> Result<String, CommandError> {
        let client = self.clients.connect(&identity.token);
        let text = self
            .aggregator
            .summarize(&identity.gitlab_username, client.as_ref(), cancel)
            .await?;

        let user_id = identity.user_id.clone();
        let stamped = self
            .with_vault(move |vault| vault.record_todo_post(&user_id, chrono::Utc::now()))
            .await;
        match stamped {
            Ok(true) => {}
            Ok(false) => debug!(user_id = %identity.user_id, "Account unlinked while the todo summary ran"),
            Err(e) => warn!("Failed to record todo summary time: {}", e),
        }

        Ok(text)
    }

    async fn me(&self, identity: &LinkedIdentity) -> Result<String, CommandError> {
        let client = self.clients.connect(&identity.token);
        let user = client.current_user().await?;

        let profile_url = format!("{}/{}", self.config.gitlab_url.trim_end_matches('/'), user.username);
        let display_name = if user.name.is_empty() { &user.username } else { &user.name };

        Ok(format!(
            "You are connected to GitLab as:\n# [![image]({} =40x40)]({}) [{}]({})",
            user.avatar_url, profile_url, display_name, profile_url
        ))
    }

    /// The record and the reverse index change in one vault transaction.
    async fn settings(&self, user_id: &str, change: SettingsChange) -> Result<String, CommandError> {
        let owner = user_id.to_string();
        self.with_vault(move |vault| vault.update_settings(&owner, change.setting, change.toggle))
            .await?;

        info!(user_id = %user_id, setting = change.setting.as_str(), on = change.toggle.is_on(), "Settings updated");
        self.host.publish(user_id, ClientEvent::Refresh).await;

        Ok("Settings updated.".to_string())
    }

    async fn subscribe(
        &self,
        identity: &LinkedIdentity,
        repo: &str,
        channel_id: &str,
        features: &str,
    ) -> Result<String, CommandError> {
        let client = self.clients.connect(&identity.token);
        self.subscriptions
            .subscribe(identity, client.as_ref(), repo, channel_id, features)
            .await
            .map_err(|e| CommandError::Subscription(e.to_string()))?;

        Ok(format!("Successfully subscribed to {}.", repo))
    }

    async fn unsubscribe(&self, channel_id: &str, repo: &str) -> Result<String, CommandError> {
        self.subscriptions
            .unsubscribe(channel_id, repo)
            .await
            .map_err(|e| CommandError::Storage(e.into()))?;

        Ok(format!("Successfully unsubscribed from {}.", repo))
    }

    async fn disconnect(&self, user_id: &str) -> Result<String, CommandError> {
        let owner = user_id.to_string();
        if !self.with_vault(move |vault| vault.unlink(&owner)).await? {
            return Err(CommandError::NotLinked);
        }

        if let Err(e) = self.host.clear_account_marker(user_id).await {
            warn!(user_id = %user_id, "Failed to clear linked account marker: {:#}", e);
        }
        self.host.publish(user_id, ClientEvent::Disconnect).await;

        info!(user_id = %user_id, "GitLab account disconnected");
        Ok("Disconnected your GitLab account.".to_string())
    }

    async fn resolve(&self, user_id: &str) -> Result<LinkedIdentity, CommandError> {
        let user_id = user_id.to_string();
        self.with_vault(move |vault| vault.resolve(&user_id)).await
    }

    /// Run a vault call off the async runtime; the store may block on disk.
    async fn with_vault<T, F>(&self, f: F) -> Result<T, CommandError>
    where
        F: FnOnce(&Vault) -> Result<T, VaultError> + Send + 'static,
        T: Send + 'static,
    {
        let vault = self.vault.clone();
        tokio::task::spawn_blocking(move || f(&vault))
            .await
            .map_err(|e| CommandError::Storage(e.into()))?
            .map_err(CommandError::from)
    }
}
