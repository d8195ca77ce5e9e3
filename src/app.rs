//! Subcommand entry points: wire configuration, database, backups and
//! populators together.

use anyhow::{Context, Result};

use crate::cli::{Cli, Command};
use crate::config::{load_processing, load_projects, load_tools};
use crate::db::{create_database, open_database, BackupStore};
use crate::error::HarvestError;
use crate::model::Project;
use crate::paths::Paths;
use crate::populate::{Action, PopulateContext, PopulatorManager, Table};
use crate::report;
use crate::walker::ensure_mirror;

/// Tables the autopopulate pass covers: everything derivable from the mirror
/// and the tracker without external tools or a version walk. Generation order
/// follows the table dependencies.
const PRIMARY_TABLES: [Table; 6] = [
    Table::Projects,
    Table::ProjectVersions,
    Table::Commits,
    Table::CommitChanges,
    Table::CommitVersions,
    Table::Issues,
];

pub fn run(cli: Cli) -> Result<()> {
    let paths = Paths::new(&cli.root);
    match &cli.command {
        Command::CreateDb => create_db(&paths),
        Command::Autopopulate { project } => autopopulate(&cli, &paths, project.as_deref()),
        Command::Process => process_by_config(&cli, &paths),
        Command::CleanupBackups => cleanup_backups(&paths),
        Command::Report { project } => print_report(&paths, project),
    }
}

fn create_db(paths: &Paths) -> Result<()> {
    let db_path = paths.database_file();
    create_database(&db_path)?;
    log::info!("created dataset database at {}", db_path.display());
    Ok(())
}

fn autopopulate(cli: &Cli, paths: &Paths, only: Option<&str>) -> Result<()> {
    let all_projects = load_projects(&cli.config_dir, paths)?;
    let tools = load_tools(&cli.config_dir)?;

    let selected: Vec<Project> = match only {
        Some(name) => {
            let project = all_projects
                .get(&name.to_lowercase())
                .ok_or_else(|| HarvestError::UnknownProject(name.to_string()))?;
            vec![project.clone()]
        }
        None => all_projects.values().cloned().collect(),
    };

    let conn = open_database(&paths.database_file())?;
    let backups = BackupStore::open(paths.backups_dir())?;

    for project in &selected {
        ensure_mirror(project, true)?;
        let ctx = PopulateContext {
            project,
            conn: &conn,
            backups: &backups,
            tools: &tools,
            paths,
        };

        let primary = PopulatorManager::new(PRIMARY_TABLES.to_vec());
        primary.run(Action::Generate, &ctx)?;
        primary.run(Action::Load, &ctx)?;

        // Commit/issue links need the issues rows in place first.
        let linker = PopulatorManager::new(vec![Table::CommitIssues]);
        linker.run(Action::Generate, &ctx)?;
        linker.run(Action::Load, &ctx)?;
    }
    Ok(())
}

fn process_by_config(cli: &Cli, paths: &Paths) -> Result<()> {
    let all_projects = load_projects(&cli.config_dir, paths)?;
    let tools = load_tools(&cli.config_dir)?;
    let processing = load_processing(&cli.config_dir, &all_projects)?;

    let conn = open_database(&paths.database_file())?;
    let backups = BackupStore::open(paths.backups_dir())?;
    let manager = PopulatorManager::new(processing.tables.clone());

    for project in &processing.projects {
        if processing.action == Action::Generate {
            ensure_mirror(project, false)?;
        }
        let ctx = PopulateContext {
            project,
            conn: &conn,
            backups: &backups,
            tools: &tools,
            paths,
        };
        manager.run(processing.action, &ctx)?;
    }
    Ok(())
}

fn cleanup_backups(paths: &Paths) -> Result<()> {
    let backups = BackupStore::open(paths.backups_dir())?;
    let removed = backups.cleanup()?;
    log::info!("removed {removed} stale backup file(s)");
    Ok(())
}

fn print_report(paths: &Paths, project: &str) -> Result<()> {
    let db_path = paths.database_file();
    if !db_path.exists() {
        anyhow::bail!("no dataset database at {}", db_path.display());
    }
    let conn = open_database(&db_path).context("failed to open dataset database")?;
    let project = project.to_lowercase();

    println!("== dataset summary for {project} ==");
    for (table, count) in report::summary(&conn, &project)? {
        println!("{table:<18} {count:>8}");
    }

    let versions = report::version_history(&conn, &project)?;
    if !versions.is_empty() {
        println!("\n-- versions ({}) --", versions.len());
        for row in &versions {
            println!("{:<24} {} {}", row.version, row.author_date, row.commit_hash);
        }
    }

    let effort = report::issue_effort(&conn, &project)?;
    if !effort.is_empty() {
        println!("\n-- issues with recorded effort ({}) --", effort.len());
        for row in effort.iter().take(20) {
            println!("{:<16} {:>8}s", row.issue_key, row.time_spent);
        }
    }

    let refactorings = report::issue_refactoring_counts(&conn, &project)?;
    if !refactorings.is_empty() {
        println!("\n-- refactorings per issue (top 20) --");
        for row in refactorings.iter().take(20) {
            println!("{:<16} {:>5}", row.issue_key, row.refactorings);
        }
    }

    let metrics = report::issue_commit_metrics(&conn, &project)?;
    if !metrics.is_empty() {
        println!("\n-- issue footprint over Java sources (top 20 by churn) --");
        let mut by_churn = metrics;
        by_churn.sort_by_key(|row| std::cmp::Reverse(row.churn));
        for row in by_churn.iter().take(20) {
            println!(
                "{:<16} commits {:>4}  +{:<6} -{:<6} churn {:>6}",
                row.issue_key, row.commits, row.lines_added, row.lines_removed, row.churn
            );
        }
    }

    let packages = report::package_version_metrics(&conn, &project)?;
    if !packages.is_empty() {
        println!("\n-- package metrics per version ({} rows) --", packages.len());
        for row in packages.iter().take(40) {
            println!(
                "{:<48} {:<16} loc {:>6} cc {:>5} smells {:>4}",
                row.package, row.version, row.nloc, row.complexity, row.smells
            );
        }
    }

    let issue_packages = report::issue_packages(&conn, &project)?;
    if !issue_packages.is_empty() {
        println!("\n-- packages touched per issue --");
        for (issue, packages) in issue_packages.iter().take(20) {
            println!("{:<16} {}", issue, packages.join(", "));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn create_db_subcommand_runs_end_to_end() {
        let root = tempfile::tempdir().expect("tempdir");
        let root_arg = root.path().to_str().expect("utf8 path");
        let cli = Cli::parse_from(["repoharvest", "--root", root_arg, "create-db"]);
        run(cli).expect("create-db");
        assert!(Paths::new(root.path()).database_file().exists());

        // A second run refuses to clobber the existing database.
        let cli = Cli::parse_from(["repoharvest", "--root", root_arg, "create-db"]);
        assert!(run(cli).is_err());
    }
}
