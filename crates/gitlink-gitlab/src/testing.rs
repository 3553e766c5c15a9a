//! In-memory `GitLabApi` for tests, here and in downstream crates
//! (enable the `test-support` feature).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use gitlink_types::gitlab::{GitLabUser, Issue, ListScope, MergeRequest, Project, ProjectRef, Todo};
use gitlink_types::models::OAuthToken;

use crate::error::UpstreamError;
use crate::{ClientFactory, GitLabApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Todos,
    CreatedMergeRequests,
    AssignedIssues,
    AssignedMergeRequests,
    CurrentUser,
    Project,
}

#[derive(Debug, Clone, Default)]
pub struct StubGitLab {
    pub todos: Vec<Todo>,
    pub created_merge_requests: Vec<MergeRequest>,
    pub assigned_issues: Vec<Issue>,
    pub assigned_merge_requests: Vec<MergeRequest>,
    pub user: Option<GitLabUser>,
    pub projects: Vec<Project>,
    /// This endpoint answers 500.
    pub failing: Option<Endpoint>,
    /// This endpoint never answers.
    pub hanging: Option<Endpoint>,
}

impl StubGitLab {
    async fn answer<T>(&self, endpoint: Endpoint, value: impl FnOnce() -> T) -> Result<T, UpstreamError> {
        if self.hanging == Some(endpoint) {
            std::future::pending::<()>().await;
        }
        if self.failing == Some(endpoint) {
            return Err(UpstreamError::Status {
                status: 500,
                message: "500 Internal Server Error".to_string(),
            });
        }
        Ok(value())
    }
}

#[async_trait]
impl GitLabApi for StubGitLab {
    async fn list_todos(&self) -> Result<Vec<Todo>, UpstreamError> {
        self.answer(Endpoint::Todos, || self.todos.clone()).await
    }

    async fn list_merge_requests(&self, scope: ListScope) -> Result<Vec<MergeRequest>, UpstreamError> {
        match scope {
            ListScope::CreatedByMe => {
                self.answer(Endpoint::CreatedMergeRequests, || self.created_merge_requests.clone())
                    .await
            }
            ListScope::AssignedToMe => {
                self.answer(Endpoint::AssignedMergeRequests, || self.assigned_merge_requests.clone())
                    .await
            }
        }
    }

    async fn list_issues(&self, scope: ListScope) -> Result<Vec<Issue>, UpstreamError> {
        match scope {
            ListScope::AssignedToMe => {
                self.answer(Endpoint::AssignedIssues, || self.assigned_issues.clone()).await
            }
            ListScope::CreatedByMe => Ok(vec![]),
        }
    }

    async fn current_user(&self) -> Result<GitLabUser, UpstreamError> {
        let user = self.answer(Endpoint::CurrentUser, || self.user.clone()).await?;
        user.ok_or_else(|| UpstreamError::Status {
            status: 401,
            message: "401 Unauthorized".to_string(),
        })
    }

    async fn get_project(&self, path: &str) -> Result<Project, UpstreamError> {
        let project = self
            .answer(Endpoint::Project, || {
                self.projects.iter().find(|p| p.path_with_namespace == path).cloned()
            })
            .await?;
        project.ok_or_else(|| UpstreamError::Status {
            status: 404,
            message: "404 Project Not Found".to_string(),
        })
    }
}

/// Hands out the same stub for every request and records the access tokens
/// it was asked to connect with.
#[derive(Default)]
pub struct StubFactory {
    pub stub: Arc<StubGitLab>,
    tokens: Mutex<Vec<String>>,
}

impl StubFactory {
    pub fn new(stub: StubGitLab) -> Self {
        Self {
            stub: Arc::new(stub),
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl ClientFactory for StubFactory {
    fn connect(&self, token: &OAuthToken) -> Arc<dyn GitLabApi> {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.push(token.access_token.clone());
        }
        self.stub.clone()
    }
}

pub fn todo(id: u64, state: &str, project: &str, target_url: &str) -> Todo {
    Todo {
        id,
        state: state.to_string(),
        target_url: target_url.to_string(),
        project: Some(ProjectRef {
            path_with_namespace: project.to_string(),
        }),
    }
}

pub fn merge_request(iid: u64, web_url: &str) -> MergeRequest {
    MergeRequest {
        iid,
        title: format!("MR {}", iid),
        web_url: web_url.to_string(),
    }
}

pub fn issue(iid: u64, web_url: &str) -> Issue {
    Issue {
        iid,
        title: format!("Issue {}", iid),
        web_url: web_url.to_string(),
    }
}

pub fn project(id: u64, path: &str) -> Project {
    Project {
        id,
        path_with_namespace: path.to_string(),
        web_url: format!("https://gitlab.example.com/{}", path),
    }
}
