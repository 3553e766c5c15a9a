use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use gitlink_db::KvStore;
use gitlink_gitlab::{GitLabApi, OrgScope, UpstreamError, parse_owner_and_repo};
use gitlink_types::models::LinkedIdentity;

const SUBSCRIPTIONS_KEY: &str = "subscriptions";

/// Display text is what the user sees after a failed `subscribe`, so it
/// must never carry internal detail.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Upstream(#[from] UpstreamError),

    #[error("Encountered an error saving the subscription.")]
    Storage(#[source] anyhow::Error),
}

/// Channel subscriptions to repository activity.
#[async_trait]
pub trait SubscriptionManager: Send + Sync {
    async fn subscribe(
        &self,
        identity: &LinkedIdentity,
        client: &dyn GitLabApi,
        repo: &str,
        channel_id: &str,
        features: &str,
    ) -> Result<(), SubscriptionError>;

    async fn unsubscribe(&self, channel_id: &str, repo: &str) -> Result<(), SubscriptionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub channel_id: String,
    pub creator_id: String,
    pub features: String,
    pub repository: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SubscriptionTable {
    /// repository -> subscriptions, one per channel
    repositories: BTreeMap<String, Vec<Subscription>>,
}

/// Subscriptions kept as one JSON document under the `subscriptions` key.
/// Updates are read-modify-write without locking.
pub struct KvSubscriptions {
    store: Arc<dyn KvStore>,
    scope: OrgScope,
    base_url: String,
}

impl KvSubscriptions {
    pub fn new(store: Arc<dyn KvStore>, scope: OrgScope, base_url: &str) -> Self {
        Self {
            store,
            scope,
            base_url: base_url.to_string(),
        }
    }

    /// Subscriptions for one `owner/repo`, used by notification delivery.
    pub async fn subscriptions_for(&self, repo: &str) -> Result<Vec<Subscription>, SubscriptionError> {
        let table = self.load().await?;
        Ok(table.repositories.get(repo).cloned().unwrap_or_default())
    }

    async fn load(&self) -> Result<SubscriptionTable, SubscriptionError> {
        let store = self.store.clone();
        let raw = tokio::task::spawn_blocking(move || store.get(SUBSCRIPTIONS_KEY))
            .await
            .map_err(|e| SubscriptionError::Storage(e.into()))?
            .map_err(SubscriptionError::Storage)?;

        match raw {
            None => Ok(SubscriptionTable::default()),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| SubscriptionError::Storage(e.into())),
        }
    }

    async fn save(&self, table: &SubscriptionTable) -> Result<(), SubscriptionError> {
        let json = serde_json::to_vec(table).map_err(|e| SubscriptionError::Storage(e.into()))?;
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.set(SUBSCRIPTIONS_KEY, &json))
            .await
            .map_err(|e| SubscriptionError::Storage(e.into()))?
            .map_err(SubscriptionError::Storage)
    }
}

#[async_trait]
impl SubscriptionManager for KvSubscriptions {
    async fn subscribe(
        &self,
        identity: &LinkedIdentity,
        client: &dyn GitLabApi,
        repo: &str,
        channel_id: &str,
        features: &str,
    ) -> Result<(), SubscriptionError> {
        let path = parse_owner_and_repo(repo, &self.base_url)
            .ok_or_else(|| SubscriptionError::Rejected("Invalid repository.".to_string()))?;

        if !self.scope.allows(&path.owner) {
            let org = self.scope.org().unwrap_or_default();
            return Err(SubscriptionError::Rejected(format!(
                "Only repositories in the {} organization are supported.",
                org
            )));
        }

        validate_features(features)?;

        let full_name = path.full_name();
        client.get_project(&full_name).await.map_err(|e| {
            if e.is_not_found() {
                SubscriptionError::Rejected(format!("Unable to find GitLab project {}.", full_name))
            } else {
                SubscriptionError::Upstream(e)
            }
        })?;

        let mut table = self.load().await?;
        let subs = table.repositories.entry(full_name.clone()).or_default();
        subs.retain(|s| s.channel_id != channel_id);
        subs.push(Subscription {
            channel_id: channel_id.to_string(),
            creator_id: identity.user_id.clone(),
            features: features.to_string(),
            repository: full_name.clone(),
        });

        self.save(&table).await.inspect_err(|e| {
            error!("Failed to save subscription for {}: {:?}", full_name, e);
        })?;

        info!(repo = %full_name, channel_id = %channel_id, "Channel subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, channel_id: &str, repo: &str) -> Result<(), SubscriptionError> {
        let full_name = parse_owner_and_repo(repo, &self.base_url)
            .map(|p| p.full_name())
            .ok_or_else(|| SubscriptionError::Rejected("Invalid repository.".to_string()))?;

        let mut table = self.load().await?;
        let Some(subs) = table.repositories.get_mut(&full_name) else {
            return Ok(());
        };

        let before = subs.len();
        subs.retain(|s| s.channel_id != channel_id);
        if subs.len() == before {
            return Ok(());
        }
        if subs.is_empty() {
            table.repositories.remove(&full_name);
        }

        self.save(&table).await?;
        info!(repo = %full_name, channel_id = %channel_id, "Channel unsubscribed");
        Ok(())
    }
}

/// Each comma-separated feature must be `issues`, `pulls` or `label:"<name>"`,
/// and a label only makes sense alongside `issues` or `pulls`.
fn validate_features(features: &str) -> Result<(), SubscriptionError> {
    let mut has_kind = false;
    let mut has_label = false;

    for feature in features.split(',').map(str::trim) {
        match feature {
            "issues" | "pulls" => has_kind = true,
            f if f.len() > "label:\"\"".len() && f.starts_with("label:\"") && f.ends_with('"') => {
                has_label = true
            }
            other => {
                return Err(SubscriptionError::Rejected(format!(
                    "Unknown feature \"{}\". Use `/gitlab help` for the accepted features.",
                    other
                )));
            }
        }
    }

    if has_label && !has_kind {
        return Err(SubscriptionError::Rejected(
            "A label requires \"pulls\" or \"issues\" in the feature list.".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitlink_db::MemoryStore;
    use gitlink_gitlab::testing::{Endpoint, StubGitLab, project};
    use gitlink_types::models::OAuthToken;

    fn manager(store: Arc<MemoryStore>, org: Option<&str>) -> KvSubscriptions {
        KvSubscriptions::new(store, OrgScope::new(org), "https://gitlab.example.com")
    }

    fn gitlab() -> StubGitLab {
        StubGitLab {
            projects: vec![project(1, "acme/widgets"), project(2, "other/widgets")],
            ..Default::default()
        }
    }

    fn alice() -> LinkedIdentity {
        LinkedIdentity::new("user-1", "alice", OAuthToken::bearer("t"))
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe() {
        let subs = manager(Arc::new(MemoryStore::new()), None);

        subs.subscribe(&alice(), &gitlab(), "acme/widgets", "chan-1", "pulls,issues")
            .await
            .unwrap();
        let stored = subs.subscriptions_for("acme/widgets").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].creator_id, "user-1");
        assert_eq!(stored[0].features, "pulls,issues");

        subs.unsubscribe("chan-1", "acme/widgets").await.unwrap();
        assert!(subs.subscriptions_for("acme/widgets").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resubscribing_a_channel_replaces_its_features() {
        let subs = manager(Arc::new(MemoryStore::new()), None);
        subs.subscribe(&alice(), &gitlab(), "acme/widgets", "chan-1", "pulls")
            .await
            .unwrap();
        subs.subscribe(&alice(), &gitlab(), "acme/widgets", "chan-1", "issues")
            .await
            .unwrap();

        let stored = subs.subscriptions_for("acme/widgets").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].features, "issues");
    }

    #[tokio::test]
    async fn unknown_project_is_a_readable_rejection() {
        let subs = manager(Arc::new(MemoryStore::new()), None);
        let err = subs
            .subscribe(&alice(), &gitlab(), "acme/nope", "chan-1", "pulls")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unable to find GitLab project acme/nope.");
    }

    #[tokio::test]
    async fn org_scope_is_enforced() {
        let subs = manager(Arc::new(MemoryStore::new()), Some("acme"));
        let err = subs
            .subscribe(&alice(), &gitlab(), "other/widgets", "chan-1", "pulls")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("acme organization"));
    }

    #[tokio::test]
    async fn upstream_failure_surfaces_its_message() {
        let stub = StubGitLab {
            failing: Some(Endpoint::Project),
            ..gitlab()
        };
        let subs = manager(Arc::new(MemoryStore::new()), None);
        let err = subs
            .subscribe(&alice(), &stub, "acme/widgets", "chan-1", "pulls")
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::Upstream(_)));
    }

    #[test]
    fn feature_validation() {
        assert!(validate_features("pulls,issues").is_ok());
        assert!(validate_features("issues, label:\"bug\"").is_ok());
        assert!(validate_features("label:\"bug\"").is_err());
        assert!(validate_features("pushes").is_err());
        assert!(validate_features("pulls,label:\"\"").is_err());
    }

    #[test]
    fn storage_error_text_is_generic() {
        let err = SubscriptionError::Storage(anyhow::anyhow!("database is locked"));
        assert!(!err.to_string().contains("locked"));
    }

    #[tokio::test]
    async fn unsubscribing_unknown_repo_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let subs = manager(store.clone(), None);
        subs.unsubscribe("chan-1", "acme/widgets").await.unwrap();
        assert_eq!(store.mutations(), 0);
    }
}
