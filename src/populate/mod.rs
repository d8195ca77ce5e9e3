//! The per-table populator protocol.
//!
//! Each table has exactly one populator with two capabilities: GENERATE
//! (derive raw records from git, the issue tracker or an analysis tool, and
//! append them to a timestamped backup file) and LOAD (read the newest backup
//! and bulk-insert it into the store in a single transaction). Some
//! populators run once per project, others once per checked-out version.

pub mod commit_changes;
pub mod commit_issues;
pub mod commit_versions;
pub mod commits;
pub mod issues;
pub mod manager;
pub mod project_versions;
pub mod projects;
pub mod refactorings;
pub mod smells;
pub mod static_metrics;

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use rusqlite::Connection;

use crate::config::ToolsConfig;
use crate::db::backup::read_csv_records;
use crate::db::BackupStore;
use crate::error::HarvestError;
use crate::model::Project;
use crate::paths::Paths;
use crate::walker::RepoState;

pub use manager::PopulatorManager;

/// Whether a run writes backups or loads them into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Generate,
    Load,
}

impl Action {
    pub fn verb(self) -> &'static str {
        match self {
            Action::Generate => "generating",
            Action::Load => "loading",
        }
    }
}

impl FromStr for Action {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('-').to_lowercase().as_str() {
            "generate" | "g" | "0" => Ok(Action::Generate),
            "load" | "l" | "1" => Ok(Action::Load),
            other => Err(HarvestError::InvalidAction(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Generate => write!(f, "Generate"),
            Action::Load => write!(f, "Load"),
        }
    }
}

/// The dataset tables, one populator each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Projects,
    ProjectVersions,
    Commits,
    CommitChanges,
    CommitVersions,
    CommitIssues,
    Issues,
    Refactorings,
    DesignSmells,
    StaticMetrics,
}

impl Table {
    pub const ALL: [Table; 10] = [
        Table::Projects,
        Table::ProjectVersions,
        Table::Commits,
        Table::CommitChanges,
        Table::CommitVersions,
        Table::CommitIssues,
        Table::Issues,
        Table::Refactorings,
        Table::DesignSmells,
        Table::StaticMetrics,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Projects => "projects",
            Table::ProjectVersions => "project_versions",
            Table::Commits => "commits",
            Table::CommitChanges => "commit_changes",
            Table::CommitVersions => "commit_versions",
            Table::CommitIssues => "commit_issues",
            Table::Issues => "issues",
            Table::Refactorings => "refactorings",
            Table::DesignSmells => "design_smells",
            Table::StaticMetrics => "static_metrics",
        }
    }

    pub fn from_name(name: &str) -> Option<Table> {
        Table::ALL
            .into_iter()
            .find(|table| table.name() == name.to_lowercase())
    }

    /// Column order shared by backup records and INSERT statements. Every
    /// backup record must round-trip losslessly into exactly these columns.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Table::Projects => &["project_name", "git_url", "issue_url"],
            Table::ProjectVersions => &[
                "project_name",
                "version",
                "commit_hash",
                "author_date",
                "previous_version",
            ],
            Table::Commits => &[
                "project_name",
                "commit_hash",
                "commit_message",
                "author",
                "author_date",
                "author_tz_offset_min",
                "committer",
                "committer_date",
                "committer_tz_offset_min",
                "on_main_line",
                "merge",
                "parents",
            ],
            Table::CommitChanges => &[
                "project_name",
                "commit_hash",
                "old_path",
                "new_path",
                "change_type",
                "diff",
                "lines_added",
                "lines_removed",
                "nloc",
                "complexity",
                "token_count",
                "methods",
            ],
            Table::CommitVersions => &["project_name", "commit_hash", "author_date", "version"],
            Table::CommitIssues => &["project_name", "issue_key", "commit_hash"],
            Table::Issues => &[
                "project_name",
                "issue_key",
                "creation_date",
                "resolution_date",
                "update_date",
                "due_date",
                "resolution",
                "type",
                "priority",
                "fix_versions",
                "affects_versions",
                "time_spent",
                "aggregated_time_spent",
                "time_estimate",
                "aggregated_time_estimate",
                "progress_percent",
                "description",
                "summary",
                "watch_count",
                "votes",
                "creator",
                "assignee",
                "reporter",
            ],
            Table::Refactorings => &[
                "project_name",
                "commit_hash",
                "refactoring_type",
                "refactoring_detail",
                "refactoring_path",
                "package",
            ],
            Table::DesignSmells => &["project_name", "version", "package", "smell", "cause"],
            Table::StaticMetrics => &[
                "project_name",
                "package",
                "version",
                "pkg_files",
                "pkg_loc",
                "pkg_tokens",
                "pkg_cc",
                "pkg_average_loc",
                "pkg_average_cc",
                "pkg_average_tokens",
            ],
        }
    }

    fn insert_sql(self) -> String {
        let columns = self.columns();
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            self.name(),
            columns.join(", ")
        )
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a populator needs for one project run.
pub struct PopulateContext<'a> {
    pub project: &'a Project,
    pub conn: &'a Connection,
    pub backups: &'a BackupStore,
    pub tools: &'a ToolsConfig,
    pub paths: &'a Paths,
}

/// A per-table unit of work.
///
/// Per-project populators implement `generate`; per-version populators set
/// `per_version` and implement `generate_at` (called once per checked-out
/// [`RepoState`]) plus `finish` (called after the walk completes).
pub trait Populator {
    fn table(&self) -> Table;

    fn per_version(&self) -> bool {
        false
    }

    fn generate(&mut self, _ctx: &PopulateContext<'_>) -> Result<()> {
        Ok(())
    }

    fn generate_at(&mut self, _ctx: &PopulateContext<'_>, _state: &RepoState) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, _ctx: &PopulateContext<'_>) -> Result<()> {
        Ok(())
    }

    fn load(&mut self, ctx: &PopulateContext<'_>) -> Result<()> {
        load_newest_backup(ctx, self.table())
    }
}

pub fn populator_for(table: Table) -> Box<dyn Populator> {
    match table {
        Table::Projects => Box::new(projects::ProjectsPopulator),
        Table::ProjectVersions => Box::new(project_versions::ProjectVersionsPopulator),
        Table::Commits => Box::new(commits::CommitsPopulator),
        Table::CommitChanges => Box::new(commit_changes::CommitChangesPopulator),
        Table::CommitVersions => Box::new(commit_versions::CommitVersionsPopulator),
        Table::CommitIssues => Box::new(commit_issues::CommitIssuesPopulator),
        Table::Issues => Box::new(issues::IssuesPopulator),
        Table::Refactorings => Box::new(refactorings::RefactoringsPopulator),
        Table::DesignSmells => Box::new(smells::DesignSmellsPopulator::default()),
        Table::StaticMetrics => Box::new(static_metrics::StaticMetricsPopulator::default()),
    }
}

/// Default LOAD: read the newest CSV backup for (project, table), then replace
/// the project's rows inside a single transaction. Deleting first makes LOAD
/// idempotent — re-running against an unchanged backup leaves the table
/// unchanged.
pub fn load_newest_backup(ctx: &PopulateContext<'_>, table: Table) -> Result<()> {
    let path = ctx.backups.newest(&ctx.project.name, table.name())?;
    let records = read_csv_records(&path)?;
    insert_records(ctx, table, &records)
}

pub(crate) fn insert_records(
    ctx: &PopulateContext<'_>,
    table: Table,
    records: &[Vec<String>],
) -> Result<()> {
    let expected = table.columns().len();

    let tx = ctx.conn.unchecked_transaction()?;
    tx.execute(
        &format!("DELETE FROM {} WHERE project_name = ?1", table.name()),
        rusqlite::params![ctx.project.name],
    )?;
    {
        let mut stmt = tx.prepare(&table.insert_sql())?;
        for record in records {
            if record.len() != expected {
                bail!(
                    "backup record for {table} has {} fields, expected {expected}",
                    record.len()
                );
            }
            stmt.execute(rusqlite::params_from_iter(record.iter()))?;
        }
    }
    tx.commit()?;

    log::info!(
        "{}: loaded {} rows into {table}",
        ctx.project.name,
        records.len()
    );
    Ok(())
}
