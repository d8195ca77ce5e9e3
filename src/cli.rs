use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Mines git repositories, analysis-tool reports and issue-tracker data into
/// a per-project SQLite dataset.
#[derive(Debug, Parser)]
#[command(name = "repoharvest", version, about)]
pub struct Cli {
    /// Data root holding the database, backups, mirrors and scratch space.
    #[arg(long, default_value = "data")]
    pub root: PathBuf,

    /// Directory with projects.yaml, tools.yaml and processing.yaml.
    #[arg(long, default_value = "config")]
    pub config_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the dataset database; refuses to clobber an existing one.
    CreateDb,
    /// Generate and load the primary tables for one or all projects.
    Autopopulate {
        /// Restrict the run to a single configured project.
        project: Option<String>,
    },
    /// Run the action, tables and projects declared in processing.yaml.
    Process,
    /// Delete all but the newest backup per (project, table).
    CleanupBackups,
    /// Print a dataset summary for one project.
    Report { project: String },
}
