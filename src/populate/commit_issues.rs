use std::collections::{BTreeSet, HashSet};

use anyhow::Result;
use git2::Repository;
use regex::Regex;

use super::{PopulateContext, Populator, Table};

/// Links commits to tracker issues by scanning commit messages for issue
/// keys. Only keys already present in the issues table are recorded, so this
/// populator runs after the issues have been loaded.
pub struct CommitIssuesPopulator;

impl Populator for CommitIssuesPopulator {
    fn table(&self) -> Table {
        Table::CommitIssues
    }

    fn generate(&mut self, ctx: &PopulateContext<'_>) -> Result<()> {
        // The backup is written even when there is nothing to link, so LOAD
        // always has a file to read for this project.
        let mut writer = ctx.backups.create_csv(&ctx.project.name, self.table().name())?;

        if !ctx.project.has_issue_tracker() {
            log::info!("{}: no issue tracker configured", ctx.project.name);
            writer.finish()?;
            return Ok(());
        }

        let known = known_issue_keys(ctx)?;
        if known.is_empty() {
            log::warn!(
                "{}: issues table is empty; load issues before linking commits",
                ctx.project.name
            );
            writer.finish()?;
            return Ok(());
        }

        let pattern = Regex::new(&format!(
            r"\b{}-\d+\b",
            regex::escape(&ctx.project.issue_key_prefix())
        ))?;

        let repo = Repository::open(&ctx.project.mirror_path)?;
        let mut count = 0usize;

        let mut revwalk = repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(git2::Sort::TIME | git2::Sort::REVERSE)?;

        for oid in revwalk {
            let oid = oid?;
            let commit = repo.find_commit(oid)?;
            let message = commit.message().unwrap_or("");

            for key in mentioned_keys(&pattern, message) {
                if !known.contains(&key) {
                    continue;
                }
                writer.write_record([ctx.project.name.clone(), key, oid.to_string()])?;
                count += 1;
            }
        }

        writer.finish()?;
        log::info!("{}: linked {count} commit/issue pairs", ctx.project.name);
        Ok(())
    }
}

/// Distinct keys mentioned in one message, in first-seen order.
fn mentioned_keys(pattern: &Regex, message: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut keys = Vec::new();
    for found in pattern.find_iter(message) {
        if seen.insert(found.as_str()) {
            keys.push(found.as_str().to_string());
        }
    }
    keys
}

fn known_issue_keys(ctx: &PopulateContext<'_>) -> Result<HashSet<String>> {
    let mut stmt = ctx
        .conn
        .prepare("SELECT issue_key FROM issues WHERE project_name = ?1")?;
    let keys = stmt
        .query_map(rusqlite::params![ctx.project.name], |row| row.get(0))?
        .collect::<Result<HashSet<String>, _>>()?;
    Ok(keys)
}
