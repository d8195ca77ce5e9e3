use anyhow::Result;

use super::{PopulateContext, Populator, Table};
use crate::analysis::metrics::analyze_package;
use crate::db::backup::BackupWriter;
use crate::walker::RepoState;

/// Per-package static metrics, one batch of rows per version.
#[derive(Default)]
pub struct StaticMetricsPopulator {
    writer: Option<BackupWriter>,
}

impl Populator for StaticMetricsPopulator {
    fn table(&self) -> Table {
        Table::StaticMetrics
    }

    fn per_version(&self) -> bool {
        true
    }

    fn generate_at(&mut self, ctx: &PopulateContext<'_>, state: &RepoState) -> Result<()> {
        if self.writer.is_none() {
            self.writer = Some(ctx.backups.create_csv(&ctx.project.name, self.table().name())?);
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("metrics backup writer not open"))?;

        let mut count = 0usize;
        for package in &state.packages {
            let metrics = analyze_package(package)?;
            if metrics.files == 0 {
                continue;
            }
            writer.write_record([
                ctx.project.name.clone(),
                state.local_package_path(package),
                state.version.id.clone(),
                metrics.files.to_string(),
                metrics.nloc.to_string(),
                metrics.token_count.to_string(),
                metrics.complexity.to_string(),
                format!("{:.2}", metrics.average_nloc()),
                format!("{:.2}", metrics.average_complexity()),
                format!("{:.2}", metrics.average_tokens()),
            ])?;
            count += 1;
        }

        log::info!(
            "{} {}: measured {count} packages",
            ctx.project.name,
            state.version.id
        );
        Ok(())
    }

    fn finish(&mut self, ctx: &PopulateContext<'_>) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let path = writer.finish()?;
            log::info!(
                "{}: static-metrics backup at {}",
                ctx.project.name,
                path.display()
            );
        }
        Ok(())
    }
}
