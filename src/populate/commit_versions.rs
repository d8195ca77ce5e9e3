use anyhow::Result;
use chrono::{DateTime, Utc};
use git2::Repository;

use super::commits::DATE_FORMAT;
use super::{PopulateContext, Populator, Table};
use crate::model::Version;
use crate::walker::version_history;
use crate::walker::versions::commit_author_date;

/// Attribute every commit to the version it lands in.
pub struct CommitVersionsPopulator;

impl Populator for CommitVersionsPopulator {
    fn table(&self) -> Table {
        Table::CommitVersions
    }

    fn generate(&mut self, ctx: &PopulateContext<'_>) -> Result<()> {
        let repo = Repository::open(&ctx.project.mirror_path)?;
        let versions = version_history(&repo, ctx.project)?;
        // An empty backup still gets written, so LOAD has a file to read.
        let mut writer = ctx.backups.create_csv(&ctx.project.name, self.table().name())?;
        if versions.is_empty() {
            log::warn!("{}: no versions; skipping commit attribution", ctx.project.name);
            writer.finish()?;
            return Ok(());
        }

        let mut cursor = VersionCursor::new(&versions);
        let mut count = 0usize;

        let mut revwalk = repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(git2::Sort::TIME | git2::Sort::REVERSE)?;

        for oid in revwalk {
            let oid = oid?;
            let commit = repo.find_commit(oid)?;
            let author_date = commit_author_date(&commit);

            let Some(version) = cursor.version_for(author_date) else {
                log::info!(
                    "{}: commits past the final version; stopping attribution walk",
                    ctx.project.name
                );
                break;
            };

            writer.write_record([
                ctx.project.name.clone(),
                oid.to_string(),
                author_date.format(DATE_FORMAT).to_string(),
                version.id.clone(),
            ])?;
            count += 1;
        }

        writer.finish()?;
        log::info!("{}: attributed {count} commits to versions", ctx.project.name);
        Ok(())
    }
}

/// Advances through the ordered version list, mapping each commit to the
/// earliest version whose author date is not before the commit's.
pub struct VersionCursor<'a> {
    versions: &'a [Version],
    index: usize,
}

impl<'a> VersionCursor<'a> {
    pub fn new(versions: &'a [Version]) -> Self {
        VersionCursor { versions, index: 0 }
    }

    /// `None` once the commit is dated after every known version.
    pub fn version_for(&mut self, commit_date: DateTime<Utc>) -> Option<&'a Version> {
        while let Some(version) = self.versions.get(self.index) {
            if commit_date <= version.author_date {
                return Some(version);
            }
            self.index += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn versions() -> Vec<Version> {
        vec![
            Version::new("v1", "a", at(100)),
            Version::new("v2", "b", at(200)),
            Version::new("v3", "c", at(300)),
        ]
    }

    #[test]
    fn commits_map_to_earliest_covering_version() {
        let versions = versions();
        let mut cursor = VersionCursor::new(&versions);
        assert_eq!(cursor.version_for(at(50)).unwrap().id, "v1");
        assert_eq!(cursor.version_for(at(100)).unwrap().id, "v1");
        assert_eq!(cursor.version_for(at(101)).unwrap().id, "v2");
        assert_eq!(cursor.version_for(at(250)).unwrap().id, "v3");
    }

    #[test]
    fn commits_past_the_final_version_end_the_walk() {
        let versions = versions();
        let mut cursor = VersionCursor::new(&versions);
        assert!(cursor.version_for(at(301)).is_none());
    }

    #[test]
    fn cursor_skips_whole_versions_without_commits() {
        let versions = versions();
        let mut cursor = VersionCursor::new(&versions);
        // First commit already past v1 and v2
        assert_eq!(cursor.version_for(at(201)).unwrap().id, "v3");
    }
}
