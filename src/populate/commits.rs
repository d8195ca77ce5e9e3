use std::collections::HashSet;

use anyhow::Result;
use git2::{Oid, Repository};

use super::{PopulateContext, Populator, Table};
use crate::walker::versions::commit_author_date;

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Full commit log of the project's mirror, oldest to newest.
pub struct CommitsPopulator;

impl Populator for CommitsPopulator {
    fn table(&self) -> Table {
        Table::Commits
    }

    fn generate(&mut self, ctx: &PopulateContext<'_>) -> Result<()> {
        let repo = Repository::open(&ctx.project.mirror_path)?;
        let main_line = first_parent_chain(&repo)?;

        let mut writer = ctx.backups.create_csv(&ctx.project.name, self.table().name())?;
        let mut count = 0usize;

        let mut revwalk = repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(git2::Sort::TIME | git2::Sort::REVERSE)?;

        for oid in revwalk {
            let oid = oid?;
            let commit = repo.find_commit(oid)?;

            let author = commit.author();
            let committer = commit.committer();
            let parents = commit
                .parent_ids()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(" ");

            writer.write_record([
                ctx.project.name.clone(),
                oid.to_string(),
                commit.message().unwrap_or("").to_string(),
                author.name().unwrap_or("").to_string(),
                commit_author_date(&commit).format(DATE_FORMAT).to_string(),
                author.when().offset_minutes().to_string(),
                committer.name().unwrap_or("").to_string(),
                chrono::DateTime::from_timestamp(committer.when().seconds(), 0)
                    .unwrap_or_default()
                    .format(DATE_FORMAT)
                    .to_string(),
                committer.when().offset_minutes().to_string(),
                bool_field(main_line.contains(&oid)).to_string(),
                bool_field(commit.parent_count() > 1).to_string(),
                parents,
            ])?;
            count += 1;
        }

        writer.finish()?;
        log::info!("{}: generated {count} commit records", ctx.project.name);
        Ok(())
    }
}

fn bool_field(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Commits on the first-parent chain of HEAD — the "main line" of history.
pub fn first_parent_chain(repo: &Repository) -> Result<HashSet<Oid>> {
    let mut chain = HashSet::new();
    let mut current = Some(repo.head()?.peel_to_commit()?);
    while let Some(commit) = current {
        chain.insert(commit.id());
        current = commit.parent(0).ok();
    }
    Ok(chain)
}
