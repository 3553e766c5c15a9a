//! GitLab side of gitlink: a per-request REST client, the organization scope
//! check and the todo aggregator that builds the `/gitlab todo` report.

pub mod aggregator;
pub mod client;
pub mod error;
pub mod repo;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use std::sync::Arc;

use async_trait::async_trait;

use gitlink_types::gitlab::{GitLabUser, Issue, ListScope, MergeRequest, Project, Todo};
use gitlink_types::models::OAuthToken;

pub use aggregator::{Aggregator, TodoSummary};
pub use client::{GitLabClient, HttpClientFactory};
pub use error::UpstreamError;
pub use repo::{OrgScope, RepoPath, parse_owner_and_repo};

/// The upstream calls gitlink makes, bound to one user's credentials.
#[async_trait]
pub trait GitLabApi: Send + Sync {
    /// Pending todos of the authenticated user.
    async fn list_todos(&self) -> Result<Vec<Todo>, UpstreamError>;

    /// Open merge requests in the given scope.
    async fn list_merge_requests(&self, scope: ListScope) -> Result<Vec<MergeRequest>, UpstreamError>;

    /// Open issues in the given scope.
    async fn list_issues(&self, scope: ListScope) -> Result<Vec<Issue>, UpstreamError>;

    async fn current_user(&self) -> Result<GitLabUser, UpstreamError>;

    /// Look up a project by its `owner/repo` path.
    async fn get_project(&self, path: &str) -> Result<Project, UpstreamError>;
}

/// Builds a client for exactly one request from that request's credentials.
/// Nothing is cached between requests, so one user's token can never leak
/// into another user's call.
pub trait ClientFactory: Send + Sync {
    fn connect(&self, token: &OAuthToken) -> Arc<dyn GitLabApi>;
}
