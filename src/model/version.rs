use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tag or time-bucketed point in a project's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Tag name, or the bucket counter ("1", "2", …) for interval versions.
    pub id: String,
    pub hash: String,
    pub author_date: DateTime<Utc>,
}

impl Version {
    pub fn new(id: impl Into<String>, hash: impl Into<String>, author_date: DateTime<Utc>) -> Self {
        Version {
            id: id.into(),
            hash: hash.into(),
            author_date,
        }
    }

    /// Identifier safe to use as a directory name (tags may contain `/`).
    pub fn os_safe_id(&self) -> String {
        self.id.replace('/', "-")
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "version: {:<32} | hash: {:<40} | date: {}",
            self.id, self.hash, self.author_date
        )
    }
}
