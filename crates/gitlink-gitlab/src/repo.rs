/// A project path split into its top-level namespace (the organization) and
/// the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPath {
    pub owner: String,
    pub name: String,
}

impl RepoPath {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Parse `owner/repo` (or `group/subgroup/repo`), optionally given as a full
/// URL under `base_url`. Returns `None` when fewer than two non-empty
/// segments remain.
pub fn parse_owner_and_repo(full: &str, base_url: &str) -> Option<RepoPath> {
    let base = base_url.trim_end_matches('/');
    let path = if base.is_empty() {
        full
    } else {
        full.strip_prefix(base).unwrap_or(full)
    };
    let path = path.trim().trim_matches('/');

    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
        return None;
    }

    Some(RepoPath {
        owner: segments[0].to_string(),
        name: segments[1..].join("/"),
    })
}

/// Optional organization restriction. An empty or whitespace-only value
/// means "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrgScope(Option<String>);

impl OrgScope {
    pub fn new(org: Option<&str>) -> Self {
        Self(
            org.map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string),
        )
    }

    pub fn unrestricted() -> Self {
        Self(None)
    }

    pub fn org(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn allows(&self, owner: &str) -> bool {
        match &self.0 {
            Some(org) => org == owner,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_path() {
        let repo = parse_owner_and_repo("acme/widgets", "").unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "widgets");
        assert_eq!(repo.full_name(), "acme/widgets");
    }

    #[test]
    fn parses_full_url_under_base() {
        let repo = parse_owner_and_repo(
            "https://gitlab.example.com/acme/widgets/",
            "https://gitlab.example.com/",
        )
        .unwrap();
        assert_eq!(repo.full_name(), "acme/widgets");
    }

    #[test]
    fn keeps_subgroups_in_name() {
        let repo = parse_owner_and_repo("acme/platform/widgets", "").unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "platform/widgets");
    }

    #[test]
    fn rejects_unparseable_paths() {
        for bad in ["", "acme", "/acme/", "acme//widgets", "   "] {
            assert_eq!(parse_owner_and_repo(bad, ""), None, "{:?}", bad);
        }
    }

    #[test]
    fn org_scope_matching() {
        let scope = OrgScope::new(Some(" acme "));
        assert_eq!(scope.org(), Some("acme"));
        assert!(scope.allows("acme"));
        assert!(!scope.allows("other"));

        let open = OrgScope::new(Some("  "));
        assert_eq!(open, OrgScope::unrestricted());
        assert!(open.allows("other"));
    }
}
