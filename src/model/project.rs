use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::paths::Paths;

/// How a project's version history is bucketed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VersionStyle {
    /// One version per git tag, ordered by author date.
    #[default]
    Tags,
    /// Fixed day-interval buckets over the full commit log.
    Interval,
}

/// A tracked repository. Built from `projects.yaml` at startup; immutable.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub owner: String,
    pub branch: String,
    pub git_url: String,
    /// Issue-tracker base URL, e.g. `https://issues.apache.org/jira`. Empty
    /// when the project has no tracker; the issues populator then refuses to run.
    pub issue_url: String,
    /// Persistent local mirror used for commit mining.
    pub mirror_path: PathBuf,
    pub version_style: VersionStyle,
    pub version_interval_days: i64,
}

impl Project {
    pub fn new(
        name: &str,
        owner: &str,
        branch: &str,
        git_url: &str,
        issue_url: &str,
        paths: &Paths,
    ) -> Self {
        let name = name.to_lowercase();
        let mirror_path = paths.mirror(&name);
        Project {
            name,
            owner: owner.to_string(),
            branch: branch.to_string(),
            git_url: git_url.to_string(),
            issue_url: issue_url.to_string(),
            mirror_path,
            version_style: VersionStyle::default(),
            version_interval_days: 60,
        }
    }

    /// Issue keys for this project look like `ZOOKEEPER-1234`.
    pub fn issue_key_prefix(&self) -> String {
        self.name.to_uppercase()
    }

    pub fn has_issue_tracker(&self) -> bool {
        !self.issue_url.is_empty()
    }
}
