use anyhow::Result;

use super::{PopulateContext, Populator, Table};

/// The project's own row; the record comes straight from configuration.
pub struct ProjectsPopulator;

impl Populator for ProjectsPopulator {
    fn table(&self) -> Table {
        Table::Projects
    }

    fn generate(&mut self, ctx: &PopulateContext<'_>) -> Result<()> {
        let mut writer = ctx.backups.create_csv(&ctx.project.name, self.table().name())?;
        writer.write_record([
            ctx.project.name.as_str(),
            ctx.project.git_url.as_str(),
            ctx.project.issue_url.as_str(),
        ])?;
        writer.finish()?;
        Ok(())
    }
}
