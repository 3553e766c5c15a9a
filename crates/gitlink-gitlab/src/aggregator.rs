use std::fmt::Write as _;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use gitlink_types::gitlab::{ListScope, Todo};

use crate::GitLabApi;
use crate::error::UpstreamError;
use crate::repo::{OrgScope, parse_owner_and_repo};

/// Work items gathered for one user, each list in upstream order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoSummary {
    /// Target URLs of pending todos inside the organization scope.
    pub todos: Vec<String>,
    /// Merge requests the user opened.
    pub open_merge_requests: Vec<String>,
    /// Assigned issues followed by assigned merge requests.
    pub assignments: Vec<String>,
}

impl TodoSummary {
    pub fn render(&self) -> String {
        let mut text = String::new();

        text.push_str("##### Todos\n");
        render_section(&mut text, &self.todos, "pending todos", "todos");

        text.push_str("##### Your Open Merge Requests\n");
        render_section(&mut text, &self.open_merge_requests, "open merge requests", "open merge requests");

        text.push_str("##### Your Assignments\n");
        render_section(&mut text, &self.assignments, "assignments", "assignments");

        text
    }
}

fn render_section(text: &mut String, urls: &[String], counted: &str, empty: &str) {
    if urls.is_empty() {
        let _ = writeln!(text, "You don't have any {}.", empty);
        return;
    }

    let _ = writeln!(text, "You have {} {}:", urls.len(), counted);
    for url in urls {
        let _ = writeln!(text, "* {}", url);
    }
}

/// Builds the todo report from four independent upstream queries.
#[derive(Debug, Clone)]
pub struct Aggregator {
    scope: OrgScope,
    base_url: String,
    timeout: Duration,
}

impl Aggregator {
    pub fn new(scope: OrgScope, base_url: &str, timeout: Duration) -> Self {
        Self {
            scope,
            base_url: base_url.to_string(),
            timeout,
        }
    }

    /// Fetch everything and render the report.
    pub async fn summarize(
        &self,
        gitlab_username: &str,
        client: &dyn GitLabApi,
        cancel: &CancellationToken,
    ) -> Result<String, UpstreamError> {
        Ok(self.collect(gitlab_username, client, cancel).await?.render())
    }

    /// Issue the four fetches concurrently and join them. The first failure,
    /// cancellation or the deadline aborts every fetch still in flight and no
    /// partial summary is produced.
    pub async fn collect(
        &self,
        gitlab_username: &str,
        client: &dyn GitLabApi,
        cancel: &CancellationToken,
    ) -> Result<TodoSummary, UpstreamError> {
        let cancel = cancel.child_token();

        let fetches = async {
            tokio::try_join!(
                guarded(&cancel, client.list_todos()),
                guarded(&cancel, client.list_merge_requests(ListScope::CreatedByMe)),
                guarded(&cancel, client.list_issues(ListScope::AssignedToMe)),
                guarded(&cancel, client.list_merge_requests(ListScope::AssignedToMe)),
            )
        };

        let (todos, created_mrs, assigned_issues, assigned_mrs) =
            match tokio::time::timeout(self.timeout, fetches).await {
                Ok(joined) => joined?,
                Err(_) => {
                    cancel.cancel();
                    return Err(UpstreamError::TimedOut(self.timeout));
                }
            };

        debug!(
            user = %gitlab_username,
            todos = todos.len(),
            created = created_mrs.len(),
            issues = assigned_issues.len(),
            assigned = assigned_mrs.len(),
            "Fetched work items"
        );

        let assignments = assigned_issues
            .into_iter()
            .map(|issue| issue.web_url)
            .chain(assigned_mrs.into_iter().map(|mr| mr.web_url))
            .collect();

        Ok(TodoSummary {
            todos: self.pending_todo_urls(&todos),
            open_merge_requests: created_mrs.into_iter().map(|mr| mr.web_url).collect(),
            assignments,
        })
    }

    /// Drop done todos and todos outside the organization scope. A todo whose
    /// project can't be determined is skipped on its own; it never fails the
    /// whole summary.
    fn pending_todo_urls(&self, todos: &[Todo]) -> Vec<String> {
        let mut urls = Vec::new();

        for todo in todos {
            if todo.is_done() {
                continue;
            }

            let Some(project) = &todo.project else {
                warn!(todo_id = todo.id, "Unable to get repository for todo. Skipping.");
                continue;
            };

            let Some(repo) = parse_owner_and_repo(&project.path_with_namespace, &self.base_url) else {
                warn!(
                    todo_id = todo.id,
                    path = %project.path_with_namespace,
                    "Unable to parse repository for todo. Skipping."
                );
                continue;
            };

            if !self.scope.allows(&repo.owner) {
                continue;
            }

            urls.push(todo.target_url.clone());
        }

        urls
    }
}

async fn guarded<T, F>(cancel: &CancellationToken, fetch: F) -> Result<T, UpstreamError>
where
    F: Future<Output = Result<T, UpstreamError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(UpstreamError::Cancelled),
        result = fetch => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Endpoint, StubGitLab, issue, merge_request, todo};

    fn aggregator(org: Option<&str>) -> Aggregator {
        Aggregator::new(OrgScope::new(org), "https://gitlab.example.com", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn renders_the_reference_scenario() {
        let stub = StubGitLab {
            todos: vec![
                todo(1, "done", "acme/widgets", "https://gl/acme/widgets/-/issues/1"),
                todo(2, "pending", "acme/widgets", "https://gl/acme/widgets/-/issues/2"),
            ],
            created_merge_requests: vec![merge_request(7, "https://gl/acme/widgets/-/merge_requests/7")],
            assigned_issues: vec![issue(3, "https://gl/acme/widgets/-/issues/3")],
            ..Default::default()
        };

        let report = aggregator(Some("acme"))
            .summarize("alice", &stub, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.contains("You have 1 pending todos:\n* https://gl/acme/widgets/-/issues/2\n"));
        assert!(!report.contains("issues/1"));
        assert!(report.contains("You have 1 open merge requests:\n* https://gl/acme/widgets/-/merge_requests/7\n"));
        assert!(report.contains("You have 1 assignments:\n* https://gl/acme/widgets/-/issues/3\n"));
    }

    #[tokio::test]
    async fn sections_appear_in_fixed_order_with_empty_sentences() {
        let report = aggregator(None)
            .summarize("alice", &StubGitLab::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            report,
            "##### Todos\n\
             You don't have any todos.\n\
             ##### Your Open Merge Requests\n\
             You don't have any open merge requests.\n\
             ##### Your Assignments\n\
             You don't have any assignments.\n"
        );
    }

    #[tokio::test]
    async fn org_scope_filters_todos_only() {
        let stub = StubGitLab {
            todos: vec![
                todo(1, "pending", "acme/widgets", "in"),
                todo(2, "pending", "other/widgets", "out"),
            ],
            created_merge_requests: vec![merge_request(1, "https://gl/other/widgets/-/merge_requests/1")],
            ..Default::default()
        };

        let scoped = aggregator(Some("acme"))
            .collect("alice", &stub, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(scoped.todos, vec!["in"]);
        assert_eq!(scoped.open_merge_requests.len(), 1);

        let open = aggregator(None)
            .collect("alice", &stub, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(open.todos, vec!["in", "out"]);
    }

    #[tokio::test]
    async fn unparseable_todo_is_skipped_not_fatal() {
        let mut orphan = todo(2, "pending", "x", "orphan");
        orphan.project = None;
        let stub = StubGitLab {
            todos: vec![
                todo(1, "pending", "acme/widgets", "first"),
                todo(3, "pending", "not-a-path", "broken"),
                orphan,
                todo(4, "pending", "acme/gadgets", "last"),
            ],
            ..Default::default()
        };

        let summary = aggregator(Some("acme"))
            .collect("alice", &stub, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.todos, vec!["first", "last"]);
    }

    #[tokio::test]
    async fn assignments_are_issues_then_merge_requests() {
        let stub = StubGitLab {
            assigned_issues: vec![issue(1, "issue-1"), issue(2, "issue-2")],
            assigned_merge_requests: vec![merge_request(9, "mr-9")],
            ..Default::default()
        };

        let summary = aggregator(None)
            .collect("alice", &stub, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.assignments, vec!["issue-1", "issue-2", "mr-9"]);
        assert!(summary.render().contains("You have 3 assignments:\n"));
    }

    #[tokio::test]
    async fn any_failed_fetch_fails_the_summary() {
        for endpoint in [
            Endpoint::Todos,
            Endpoint::CreatedMergeRequests,
            Endpoint::AssignedIssues,
            Endpoint::AssignedMergeRequests,
        ] {
            let stub = StubGitLab {
                todos: vec![todo(1, "pending", "acme/widgets", "u")],
                failing: Some(endpoint),
                ..Default::default()
            };

            let result = aggregator(None)
                .summarize("alice", &stub, &CancellationToken::new())
                .await;

            assert!(matches!(result, Err(UpstreamError::Status { status: 500, .. })), "{:?}", endpoint);
        }
    }

    #[tokio::test]
    async fn cancellation_abandons_hung_fetches() {
        let stub = StubGitLab {
            hanging: Some(Endpoint::AssignedIssues),
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = aggregator(None).collect("alice", &stub, &cancel).await;

        assert!(matches!(result, Err(UpstreamError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_the_fan_out() {
        let stub = StubGitLab {
            hanging: Some(Endpoint::Todos),
            ..Default::default()
        };
        let aggregator = Aggregator::new(OrgScope::unrestricted(), "", Duration::from_secs(2));

        let result = aggregator
            .collect("alice", &stub, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(UpstreamError::TimedOut(d)) if d == Duration::from_secs(2)));
    }
}
