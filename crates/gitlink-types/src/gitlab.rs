//! Subset of the GitLab v4 REST models the aggregator and command handlers read.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    #[serde(default)]
    pub path_with_namespace: String,
}

/// An entry of the user's todo list (unread notification).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: u64,
    pub state: String,
    #[serde(default)]
    pub target_url: String,
    #[serde(default)]
    pub project: Option<ProjectRef>,
}

impl Todo {
    pub fn is_done(&self) -> bool {
        self.state == "done"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub iid: u64,
    #[serde(default)]
    pub title: String,
    pub web_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub iid: u64,
    #[serde(default)]
    pub title: String,
    pub web_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabUser {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub path_with_namespace: String,
    #[serde(default)]
    pub web_url: String,
}

/// `scope` query values accepted by the merge request and issue list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    CreatedByMe,
    AssignedToMe,
}

impl ListScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatedByMe => "created_by_me",
            Self::AssignedToMe => "assigned_to_me",
        }
    }
}
