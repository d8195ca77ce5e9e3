use std::path::PathBuf;

use thiserror::Error;

/// Domain errors that the CLI renders directly instead of as a bare chain.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("unknown project '{0}' (not declared in projects.yaml)")]
    UnknownProject(String),

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("invalid database action '{0}' (expected 'generate' or 'load')")]
    InvalidAction(String),

    #[error("tool '{0}' not declared in tools.yaml")]
    ToolNotConfigured(&'static str),

    #[error("tool '{name}' binary missing at {path}")]
    ToolMissing { name: &'static str, path: PathBuf },

    #[error("{tool} exited with status {status}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        status: i32,
        stderr: String,
    },

    #[error("no backup file with prefix '{prefix}' in {dir}")]
    MissingBackup { prefix: String, dir: PathBuf },

    #[error("database file {0} already exists; delete it first")]
    DatabaseExists(PathBuf),
}
