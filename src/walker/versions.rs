//! Version enumeration: git tags ordered chronologically, or fixed
//! day-interval buckets over the full commit log.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use git2::Repository;

use crate::model::{Project, Version, VersionStyle};

/// Enumerate a project's versions, ordered oldest to newest.
pub fn version_history(repo: &Repository, project: &Project) -> Result<Vec<Version>> {
    match project.version_style {
        VersionStyle::Tags => tag_versions(repo),
        VersionStyle::Interval => interval_versions(repo, project.version_interval_days),
    }
}

/// One version per git tag, ordered by the tagged commit's author date.
pub fn tag_versions(repo: &Repository) -> Result<Vec<Version>> {
    let mut versions = Vec::new();

    let tag_names = repo.tag_names(None)?;
    for name in tag_names.iter().flatten() {
        let reference = format!("refs/tags/{name}");
        let object = repo
            .revparse_single(&reference)
            .with_context(|| format!("failed to resolve {reference}"))?;
        // Annotated tags need peeling to reach the commit.
        let commit = object
            .peel_to_commit()
            .with_context(|| format!("{reference} does not point at a commit"))?;

        versions.push(Version::new(
            name,
            commit.id().to_string(),
            commit_author_date(&commit),
        ));
    }

    versions.sort_by_key(|v| v.author_date);
    Ok(versions)
}

/// Bucket the commit log into versions spanning `interval_days` each. A new
/// version opens at the first commit authored after the previous bucket's end
/// date; versions are numbered 1, 2, 3, …
pub fn interval_versions(repo: &Repository, interval_days: i64) -> Result<Vec<Version>> {
    let mut versions = Vec::new();
    let mut bucket_end: Option<DateTime<Utc>> = None;
    let mut counter = 1u32;

    let mut revwalk = repo.revwalk()?;
    revwalk.push_head()?;
    revwalk.set_sorting(git2::Sort::TIME | git2::Sort::REVERSE)?;

    for oid in revwalk {
        let oid = oid?;
        let commit = repo.find_commit(oid)?;
        let author_date = commit_author_date(&commit);

        let open_bucket = match bucket_end {
            None => true,
            Some(end) => author_date > end,
        };
        if open_bucket {
            versions.push(Version::new(
                counter.to_string(),
                oid.to_string(),
                author_date,
            ));
            bucket_end = Some(author_date + Duration::days(interval_days));
            counter += 1;
        }
    }

    Ok(versions)
}

pub(crate) fn commit_author_date(commit: &git2::Commit<'_>) -> DateTime<Utc> {
    Utc.timestamp_opt(commit.author().when().seconds(), 0)
        .single()
        .unwrap_or_default()
}
