//! Well-known locations under the data root.
//!
//! Layout:
//! - `<root>/database/harvest.db` — the relational store
//! - `<root>/backups/`            — timestamped backup files per (project, table)
//! - `<root>/repos/<name>`        — persistent local mirrors used for commit mining
//! - `<root>/processing/<name>`   — scratch area for the version walker and smell detector

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Paths { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_file(&self) -> PathBuf {
        self.root.join("database").join("harvest.db")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    pub fn mirrors_dir(&self) -> PathBuf {
        self.root.join("repos")
    }

    pub fn mirror(&self, project_name: &str) -> PathBuf {
        self.mirrors_dir().join(project_name)
    }

    pub fn processing_dir(&self, project_name: &str) -> PathBuf {
        self.root.join("processing").join(project_name)
    }
}
