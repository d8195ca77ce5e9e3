use anyhow::Result;
use git2::Repository;

use super::{PopulateContext, Populator, Table};
use crate::walker::version_history;

/// One row per version, chained to its predecessor, derived from the
/// project's local mirror.
pub struct ProjectVersionsPopulator;

impl Populator for ProjectVersionsPopulator {
    fn table(&self) -> Table {
        Table::ProjectVersions
    }

    fn generate(&mut self, ctx: &PopulateContext<'_>) -> Result<()> {
        let repo = Repository::open(&ctx.project.mirror_path)?;
        let versions = version_history(&repo, ctx.project)?;

        let mut writer = ctx.backups.create_csv(&ctx.project.name, self.table().name())?;
        let mut previous = String::new();
        for version in versions {
            writer.write_record([
                ctx.project.name.clone(),
                version.id.clone(),
                version.hash.clone(),
                version.author_date.format("%Y-%m-%d %H:%M:%S").to_string(),
                previous,
            ])?;
            previous = version.id;
        }
        writer.finish()?;
        Ok(())
    }
}
