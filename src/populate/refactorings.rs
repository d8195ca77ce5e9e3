use std::fs;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{insert_records, PopulateContext, Populator, Table};
use crate::tools::run_refactoring_detector;

/// Refactorings detected by the external miner. GENERATE hands the whole
/// mirror to the tool, which writes its own JSON report straight into the
/// backup directory; LOAD flattens that report into rows.
pub struct RefactoringsPopulator;

impl Populator for RefactoringsPopulator {
    fn table(&self) -> Table {
        Table::Refactorings
    }

    fn generate(&mut self, ctx: &PopulateContext<'_>) -> Result<()> {
        let output = ctx
            .backups
            .allocate(&ctx.project.name, self.table().name(), "json");
        run_refactoring_detector(
            ctx.tools,
            &ctx.project.mirror_path,
            &ctx.project.branch,
            &output,
        )?;
        log::info!(
            "{}: refactoring report written to {}",
            ctx.project.name,
            output.display()
        );
        Ok(())
    }

    fn load(&mut self, ctx: &PopulateContext<'_>) -> Result<()> {
        let path = ctx.backups.newest(&ctx.project.name, self.table().name())?;
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read refactoring report {}", path.display()))?;
        let report: MinerReport = serde_json::from_str(&raw)
            .with_context(|| format!("malformed refactoring report {}", path.display()))?;

        let records = flatten_report(&ctx.project.name, &report);
        insert_records(ctx, self.table(), &records)
    }
}

#[derive(Debug, Deserialize)]
struct MinerReport {
    #[serde(default)]
    commits: Vec<MinerCommit>,
}

#[derive(Debug, Deserialize)]
struct MinerCommit {
    sha1: String,
    #[serde(default)]
    refactorings: Vec<MinerRefactoring>,
}

#[derive(Debug, Deserialize)]
struct MinerRefactoring {
    #[serde(rename = "type")]
    kind: String,
    description: String,
    #[serde(rename = "leftSideLocations", default)]
    left_side_locations: Vec<MinerLocation>,
}

#[derive(Debug, Deserialize)]
struct MinerLocation {
    #[serde(rename = "filePath")]
    file_path: String,
}

/// One row per refactoring; the path and package come from the first
/// left-side location.
fn flatten_report(project: &str, report: &MinerReport) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    for commit in &report.commits {
        for refactoring in &commit.refactorings {
            let path = refactoring
                .left_side_locations
                .first()
                .map(|location| location.file_path.as_str())
                .unwrap_or("");
            records.push(vec![
                project.to_string(),
                commit.sha1.clone(),
                refactoring.kind.clone(),
                refactoring.description.clone(),
                path.to_string(),
                package_of(path).to_string(),
            ]);
        }
    }
    records
}

/// Directory part of a source path; the file's package in tree form.
fn package_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}
