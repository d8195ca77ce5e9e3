use anyhow::Result;

use super::{populator_for, Action, PopulateContext, Populator, Table};
use crate::walker::RepoVersionWalker;

/// Runs one action over a set of tables for one project.
///
/// GENERATE splits the populators into per-project ones (run directly against
/// the mirror) and per-version ones, which share a single walk over a scratch
/// clone so every version is checked out exactly once.
pub struct PopulatorManager {
    tables: Vec<Table>,
}

impl PopulatorManager {
    pub fn new(tables: Vec<Table>) -> Self {
        PopulatorManager { tables }
    }

    pub fn run(&self, action: Action, ctx: &PopulateContext<'_>) -> Result<()> {
        log::info!(
            "{}: {} {} table(s)",
            ctx.project.name,
            action.verb(),
            self.tables.len()
        );
        match action {
            Action::Generate => self.generate(ctx),
            Action::Load => self.load(ctx),
        }
    }

    fn generate(&self, ctx: &PopulateContext<'_>) -> Result<()> {
        let mut per_project: Vec<Box<dyn Populator>> = Vec::new();
        let mut per_version: Vec<Box<dyn Populator>> = Vec::new();
        for table in &self.tables {
            let populator = populator_for(*table);
            if populator.per_version() {
                per_version.push(populator);
            } else {
                per_project.push(populator);
            }
        }

        for populator in &mut per_project {
            log::info!("{}: generating {}", ctx.project.name, populator.table());
            populator.generate(ctx)?;
        }

        if per_version.is_empty() {
            return Ok(());
        }

        let walker = RepoVersionWalker::open(ctx.project, ctx.paths)?;
        for version in walker.versions().to_vec() {
            let state = walker.checkout(&version)?;
            for populator in &mut per_version {
                log::info!(
                    "{}: generating {} at {}",
                    ctx.project.name,
                    populator.table(),
                    version.id
                );
                populator.generate_at(ctx, &state)?;
            }
        }
        for populator in &mut per_version {
            populator.finish(ctx)?;
        }
        Ok(())
    }

    fn load(&self, ctx: &PopulateContext<'_>) -> Result<()> {
        for table in &self.tables {
            log::info!("{}: loading {table}", ctx.project.name);
            populator_for(*table).load(ctx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolsConfig;
    use crate::db::{initialize_schema, BackupStore};
    use crate::model::Project;
    use crate::paths::Paths;
    use crate::testutil::ScratchRepo;
    use crate::walker::ensure_mirror;

    #[test]
    fn per_version_tables_are_flagged() {
        assert!(populator_for(Table::DesignSmells).per_version());
        assert!(populator_for(Table::StaticMetrics).per_version());
        assert!(!populator_for(Table::Commits).per_version());
        assert!(!populator_for(Table::Issues).per_version());
    }

    #[test]
    fn commits_generate_then_load_end_to_end() {
        let scratch = ScratchRepo::new();
        scratch.commit_file("a.txt", "a", "first commit", 1_000);
        scratch.commit_file("b.txt", "b", "second commit", 2_000);

        let root = tempfile::tempdir().expect("tempdir");
        let paths = Paths::new(root.path());
        let project = Project::new(
            "demo",
            "tester",
            "",
            scratch.path().to_str().expect("utf8 path"),
            "",
            &paths,
        );
        ensure_mirror(&project, false).expect("mirror");

        let conn = rusqlite::Connection::open_in_memory().expect("open db");
        initialize_schema(&conn).expect("schema");
        let backups = BackupStore::open(paths.backups_dir()).expect("backups");
        let tools = ToolsConfig::default();
        let ctx = PopulateContext {
            project: &project,
            conn: &conn,
            backups: &backups,
            tools: &tools,
            paths: &paths,
        };

        let manager = PopulatorManager::new(vec![Table::Commits, Table::CommitVersions]);
        manager.run(Action::Generate, &ctx).expect("generate");
        manager.run(Action::Load, &ctx).expect("load");

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM commits WHERE project_name = 'demo'",
                [],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(count, 2);

        // The untagged repository has no versions; its attribution backup is
        // empty but still loadable.
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM commit_versions", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 0);

        // Loading the same backup again replaces rather than duplicates.
        manager.run(Action::Load, &ctx).expect("reload");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM commits", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 2);
    }

    #[test]
    fn trackerless_projects_generate_loadable_issue_backups() {
        let root = tempfile::tempdir().expect("tempdir");
        let paths = Paths::new(root.path());
        // No jira_link configured, no mirror needed: both populators skip
        // before touching the tracker or the repository.
        let project = Project::new("demo", "tester", "", "unused-url", "", &paths);

        let conn = rusqlite::Connection::open_in_memory().expect("open db");
        initialize_schema(&conn).expect("schema");
        let backups = BackupStore::open(paths.backups_dir()).expect("backups");
        let tools = ToolsConfig::default();
        let ctx = PopulateContext {
            project: &project,
            conn: &conn,
            backups: &backups,
            tools: &tools,
            paths: &paths,
        };

        let manager = PopulatorManager::new(vec![Table::Issues, Table::CommitIssues]);
        manager.run(Action::Generate, &ctx).expect("generate");
        manager.run(Action::Load, &ctx).expect("load");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 0);
    }
}
