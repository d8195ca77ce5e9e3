use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;

use crate::error::HarvestError;

const DB_SCHEMA_VERSION: i64 = 1;

/// Open the dataset database, creating the schema if needed.
pub fn open_database(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;
    initialize_schema(&conn)?;
    Ok(conn)
}

/// Create a fresh dataset database; refuses to clobber an existing file.
pub fn create_database(db_path: &Path) -> Result<Connection> {
    if db_path.exists() {
        return Err(HarvestError::DatabaseExists(db_path.to_path_buf()).into());
    }
    open_database(db_path)
}

pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;

    let mut version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        apply_migration_1(conn)?;
        version = 1;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version > DB_SCHEMA_VERSION {
        // Future schema; do not fail reads/writes for forward-compatible changes.
        conn.pragma_update(None, "user_version", version)?;
    }

    Ok(())
}

fn apply_migration_1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS projects (
            project_name TEXT NOT NULL,
            git_url TEXT NOT NULL,
            issue_url TEXT
        );

        CREATE TABLE IF NOT EXISTS project_versions (
            project_name TEXT NOT NULL,
            version TEXT NOT NULL,
            commit_hash TEXT NOT NULL,
            author_date TEXT NOT NULL,
            previous_version TEXT
        );

        CREATE TABLE IF NOT EXISTS commits (
            project_name TEXT NOT NULL,
            commit_hash TEXT NOT NULL,
            commit_message TEXT,
            author TEXT,
            author_date TEXT,
            author_tz_offset_min INTEGER,
            committer TEXT,
            committer_date TEXT,
            committer_tz_offset_min INTEGER,
            on_main_line INTEGER,
            merge INTEGER,
            parents TEXT
        );

        CREATE TABLE IF NOT EXISTS commit_changes (
            project_name TEXT NOT NULL,
            commit_hash TEXT NOT NULL,
            old_path TEXT,
            new_path TEXT,
            change_type TEXT,
            diff TEXT,
            lines_added INTEGER,
            lines_removed INTEGER,
            nloc INTEGER,
            complexity INTEGER,
            token_count INTEGER,
            methods TEXT
        );

        CREATE TABLE IF NOT EXISTS commit_versions (
            project_name TEXT NOT NULL,
            commit_hash TEXT NOT NULL,
            author_date TEXT,
            version TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS commit_issues (
            project_name TEXT NOT NULL,
            issue_key TEXT NOT NULL,
            commit_hash TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS issues (
            project_name TEXT NOT NULL,
            issue_key TEXT NOT NULL,
            creation_date TEXT,
            resolution_date TEXT,
            update_date TEXT,
            due_date TEXT,
            resolution TEXT,
            type TEXT,
            priority TEXT,
            fix_versions TEXT,
            affects_versions TEXT,
            time_spent NUMERIC,
            aggregated_time_spent NUMERIC,
            time_estimate NUMERIC,
            aggregated_time_estimate NUMERIC,
            progress_percent NUMERIC,
            description TEXT,
            summary TEXT,
            watch_count NUMERIC,
            votes NUMERIC,
            creator TEXT,
            assignee TEXT,
            reporter TEXT
        );

        CREATE TABLE IF NOT EXISTS refactorings (
            project_name TEXT NOT NULL,
            commit_hash TEXT NOT NULL,
            refactoring_type TEXT NOT NULL,
            refactoring_detail TEXT,
            refactoring_path TEXT,
            package TEXT
        );

        CREATE TABLE IF NOT EXISTS design_smells (
            project_name TEXT NOT NULL,
            version TEXT NOT NULL,
            package TEXT NOT NULL,
            smell TEXT NOT NULL,
            cause TEXT
        );

        CREATE TABLE IF NOT EXISTS static_metrics (
            project_name TEXT NOT NULL,
            package TEXT NOT NULL,
            version TEXT NOT NULL,
            pkg_files NUMERIC,
            pkg_loc NUMERIC,
            pkg_tokens NUMERIC,
            pkg_cc NUMERIC,
            pkg_average_loc NUMERIC,
            pkg_average_cc NUMERIC,
            pkg_average_tokens NUMERIC
        );

        CREATE INDEX IF NOT EXISTS idx_commits_project_hash ON commits(project_name, commit_hash);
        CREATE INDEX IF NOT EXISTS idx_commit_changes_hash ON commit_changes(project_name, commit_hash);
        CREATE INDEX IF NOT EXISTS idx_commit_versions_hash ON commit_versions(project_name, commit_hash);
        CREATE INDEX IF NOT EXISTS idx_commit_issues_key ON commit_issues(project_name, issue_key);
        CREATE INDEX IF NOT EXISTS idx_issues_key ON issues(project_name, issue_key);
        CREATE INDEX IF NOT EXISTS idx_static_metrics_pv ON static_metrics(project_name, package, version);
        ",
    )
}

/// Names of the user tables currently in the database.
pub fn table_names(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .filter_map(|r| r.ok())
        .filter(|name| name != "sqlite_sequence")
        .collect();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_initializes_with_expected_version() {
        let conn = Connection::open_in_memory().expect("in-memory db");
        initialize_schema(&conn).expect("schema init");
        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("schema version");
        assert_eq!(version, DB_SCHEMA_VERSION);
    }

    #[test]
    fn schema_creation_is_reentrant() {
        let conn = Connection::open_in_memory().expect("in-memory db");
        initialize_schema(&conn).expect("first init");
        initialize_schema(&conn).expect("second init");
        let tables = table_names(&conn).expect("table names");
        assert!(tables.contains(&"commits".to_string()));
        assert!(tables.contains(&"design_smells".to_string()));
        assert_eq!(tables.len(), 10);
    }

    #[test]
    fn create_database_refuses_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("database").join("harvest.db");
        create_database(&db_path).expect("first create");
        let err = create_database(&db_path).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
