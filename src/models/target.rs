//! Fact snapshots for labelling targets.
//!
//! A `Target` is a read-only view of everything a run needs to know about a
//! repository or one of its issues/pull requests: title/body text, comments,
//! changed-file stats, lifecycle state, and activity timestamps. Facts are
//! fetched once per run through the provider and never mutated by the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Open,
    Closed,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Open => "open",
            ItemState::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<ItemState> {
        match s {
            "open" => Some(ItemState::Open),
            "closed" => Some(ItemState::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// One comment on an issue/PR, in thread order.
pub struct CommentFacts {
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub from_maintainer: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Per-file diff stats for one changed file of a PR.
pub struct FileDiff {
    pub path: String,
    #[serde(default)]
    pub additions: i64,
    #[serde(default)]
    pub deletions: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Fetched facts for one issue or pull request.
pub struct ItemFacts {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub author: String,
    pub state: ItemState,
    #[serde(default)]
    pub is_pr: bool,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub draft: bool,
    /// True when the PR has at least one review and every review approved.
    #[serde(default)]
    pub approved: bool,
    /// The author's collaborator permission (e.g. `admin`, `write`), when
    /// the provider knows it.
    #[serde(default)]
    pub author_role: Option<String>,
    #[serde(default)]
    pub source_branch: Option<String>,
    #[serde(default)]
    pub target_branch: Option<String>,
    /// Name of the repository the source branch lives in.
    #[serde(default)]
    pub source_repo: Option<String>,
    #[serde(default)]
    pub comments: Vec<CommentFacts>,
    #[serde(default)]
    pub files: Vec<FileDiff>,
    /// Label names currently assigned to this item.
    #[serde(default)]
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ItemFacts {
    pub fn additions(&self) -> i64 {
        self.files.iter().map(|f| f.additions).sum()
    }

    pub fn deletions(&self) -> i64 {
        self.files.iter().map(|f| f.deletions).sum()
    }

    /// Timestamp of the most recent activity of any kind.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }

    /// Timestamp of the most recent comment, falling back to creation time.
    pub fn last_comment_at(&self) -> DateTime<Utc> {
        self.comments
            .iter()
            .map(|c| c.created_at)
            .max()
            .unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// Fetched facts for the repository itself.
pub struct RepoFacts {
    #[serde(default)]
    pub full_name: String,
    /// Full file tree paths, used by `files` selectors on repo targets.
    #[serde(default)]
    pub tree: Vec<String>,
}

#[derive(Debug, Clone)]
/// One labelling target: the repository, or a single issue/PR.
pub enum Target {
    Repository(RepoFacts),
    Item(ItemFacts),
}

impl Target {
    pub fn item(&self) -> Option<&ItemFacts> {
        match self {
            Target::Item(it) => Some(it),
            Target::Repository(_) => None,
        }
    }

    /// File paths visible to `files` selectors: the repository tree for repo
    /// targets, the changed-file list for PRs.
    pub fn file_paths(&self) -> Vec<&str> {
        match self {
            Target::Repository(repo) => repo.tree.iter().map(String::as_str).collect(),
            Target::Item(it) => it.files.iter().map(|f| f.path.as_str()).collect(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Target::Repository(repo) => format!("repository {}", repo.full_name),
            Target::Item(it) => {
                let kind = if it.is_pr { "pull" } else { "issue" };
                format!("{} #{}", kind, it.number)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_diff_totals_sum_over_files() {
        let item = ItemFacts {
            number: 1,
            title: "t".into(),
            body: String::new(),
            author: "a".into(),
            state: ItemState::Open,
            is_pr: true,
            merged: false,
            draft: false,
            approved: false,
            author_role: None,
            source_branch: None,
            target_branch: None,
            source_repo: None,
            comments: vec![],
            files: vec![
                FileDiff {
                    path: "a.rs".into(),
                    additions: 10,
                    deletions: 2,
                },
                FileDiff {
                    path: "b.rs".into(),
                    additions: 5,
                    deletions: 1,
                },
            ],
            labels: vec![],
            created_at: ts(1),
            updated_at: None,
        };
        assert_eq!(item.additions(), 15);
        assert_eq!(item.deletions(), 3);
    }

    #[test]
    fn test_last_comment_falls_back_to_creation() {
        let mut item = ItemFacts {
            number: 2,
            title: "t".into(),
            body: String::new(),
            author: "a".into(),
            state: ItemState::Open,
            is_pr: false,
            merged: false,
            draft: false,
            approved: false,
            author_role: None,
            source_branch: None,
            target_branch: None,
            source_repo: None,
            comments: vec![],
            files: vec![],
            labels: vec![],
            created_at: ts(1),
            updated_at: None,
        };
        assert_eq!(item.last_comment_at(), ts(1));
        item.comments.push(CommentFacts {
            author: "b".into(),
            body: "hi".into(),
            created_at: ts(5),
            from_maintainer: false,
        });
        assert_eq!(item.last_comment_at(), ts(5));
    }
}
