use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use gitlink_types::gitlab::{GitLabUser, Issue, ListScope, MergeRequest, Project, Todo};
use gitlink_types::models::OAuthToken;

use crate::error::UpstreamError;
use crate::{ClientFactory, GitLabApi};

/// Largest page GitLab serves; the summary only ever shows the first page.
const PER_PAGE: &str = "100";

/// HTTP client for the GitLab v4 REST API, authenticated as one user.
pub struct GitLabClient {
    api_root: String,
    access_token: String,
    http: ReqwestClient,
}

impl GitLabClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - GitLab instance URL (e.g., "https://gitlab.example.com")
    /// * `token` - OAuth token of the user the calls are made as
    pub fn new(base_url: &str, token: &OAuthToken) -> Self {
        Self::with_http(ReqwestClient::new(), base_url, token)
    }

    /// Reuse an existing connection pool. Only the pool is shared; the
    /// credential is owned by this client.
    pub fn with_http(http: ReqwestClient, base_url: &str, token: &OAuthToken) -> Self {
        Self {
            api_root: format!("{}/api/v4", base_url.trim_end_matches('/')),
            access_token: token.access_token.clone(),
            http,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.api_root, path);
        debug!("GET {}", url);
        self.http.get(url).bearer_auth(&self.access_token)
    }

    /// Execute request and map non-success statuses to `UpstreamError::Status`
    async fn execute<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, UpstreamError> {
        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body
                .get("message")
                .or_else(|| body.get("error"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string());
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl GitLabApi for GitLabClient {
    async fn list_todos(&self) -> Result<Vec<Todo>, UpstreamError> {
        let req = self.get("/todos").query(&[("per_page", PER_PAGE)]);
        self.execute(req).await
    }

    async fn list_merge_requests(&self, scope: ListScope) -> Result<Vec<MergeRequest>, UpstreamError> {
        let req = self.get("/merge_requests").query(&[
            ("scope", scope.as_str()),
            ("state", "opened"),
            ("per_page", PER_PAGE),
        ]);
        self.execute(req).await
    }

    async fn list_issues(&self, scope: ListScope) -> Result<Vec<Issue>, UpstreamError> {
        let req = self.get("/issues").query(&[
            ("scope", scope.as_str()),
            ("state", "opened"),
            ("per_page", PER_PAGE),
        ]);
        self.execute(req).await
    }

    async fn current_user(&self) -> Result<GitLabUser, UpstreamError> {
        self.execute(self.get("/user")).await
    }

    async fn get_project(&self, path: &str) -> Result<Project, UpstreamError> {
        let req = self.get(&format!("/projects/{}", urlencoding::encode(path)));
        self.execute(req).await
    }
}

/// Production factory: one shared connection pool, one `GitLabClient` per
/// request carrying that request's token.
#[derive(Clone)]
pub struct HttpClientFactory {
    base_url: String,
    http: ReqwestClient,
}

impl HttpClientFactory {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: ReqwestClient::new(),
        }
    }
}

impl ClientFactory for HttpClientFactory {
    fn connect(&self, token: &OAuthToken) -> Arc<dyn GitLabApi> {
        Arc::new(GitLabClient::with_http(self.http.clone(), &self.base_url, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_root_ignores_trailing_slash() {
        let client = GitLabClient::new("https://gitlab.example.com/", &OAuthToken::bearer("t"));
        assert_eq!(client.api_root, "https://gitlab.example.com/api/v4");
    }
}
