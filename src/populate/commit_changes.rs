use anyhow::Result;
use git2::{Delta, DiffOptions, Patch, Repository};

use super::{PopulateContext, Populator, Table};
use crate::analysis::metrics::{analyze_source, FileMetrics};

/// Per-file changes of every commit: patch text, line stats, and static
/// metrics of the post-image for Java sources.
pub struct CommitChangesPopulator;

impl Populator for CommitChangesPopulator {
    fn table(&self) -> Table {
        Table::CommitChanges
    }

    fn generate(&mut self, ctx: &PopulateContext<'_>) -> Result<()> {
        let repo = Repository::open(&ctx.project.mirror_path)?;
        let mut writer = ctx.backups.create_csv(&ctx.project.name, self.table().name())?;
        let mut count = 0usize;

        let mut revwalk = repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(git2::Sort::TIME | git2::Sort::REVERSE)?;

        for oid in revwalk {
            let oid = oid?;
            let commit = repo.find_commit(oid)?;
            let tree = commit.tree()?;
            let parent_tree = commit.parent(0).ok().and_then(|p| p.tree().ok());

            let mut opts = DiffOptions::new();
            opts.ignore_filemode(true);
            let mut diff =
                repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;
            diff.find_similar(None)?; // rename detection

            for idx in 0..diff.deltas().len() {
                let Some(delta) = diff.get_delta(idx) else {
                    continue;
                };
                let old_path = delta
                    .old_file()
                    .path()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .filter(|_| delta.status() != Delta::Added)
                    .unwrap_or_default();
                let new_path = delta
                    .new_file()
                    .path()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .filter(|_| delta.status() != Delta::Deleted)
                    .unwrap_or_default();

                let (diff_text, lines_added, lines_removed) =
                    match Patch::from_diff(&diff, idx)? {
                        Some(mut patch) => {
                            let (_, additions, deletions) = patch.line_stats()?;
                            let text = patch
                                .to_buf()
                                .ok()
                                .and_then(|buf| buf.as_str().map(|s| s.to_string()))
                                .unwrap_or_default();
                            (text, additions, deletions)
                        }
                        None => (String::new(), 0, 0),
                    };

                let metrics = post_image_metrics(&repo, &delta, &new_path);
                let methods = serde_json::to_string(&metrics.methods)?;

                writer.write_record([
                    ctx.project.name.clone(),
                    oid.to_string(),
                    old_path,
                    new_path,
                    change_type(delta.status()).to_string(),
                    diff_text,
                    lines_added.to_string(),
                    lines_removed.to_string(),
                    metrics.nloc.to_string(),
                    metrics.complexity.to_string(),
                    metrics.token_count.to_string(),
                    methods,
                ])?;
                count += 1;
            }
        }

        writer.finish()?;
        log::info!("{}: generated {count} change records", ctx.project.name);
        Ok(())
    }
}

/// Static metrics of the new blob, computed for Java sources only.
fn post_image_metrics(repo: &Repository, delta: &git2::DiffDelta<'_>, new_path: &str) -> FileMetrics {
    if !new_path.ends_with(".java") {
        return FileMetrics::default();
    }
    let Ok(blob) = repo.find_blob(delta.new_file().id()) else {
        return FileMetrics::default();
    };
    match std::str::from_utf8(blob.content()) {
        Ok(source) => analyze_source(source),
        Err(_) => FileMetrics::default(),
    }
}

fn change_type(status: Delta) -> &'static str {
    match status {
        Delta::Added => "ADD",
        Delta::Deleted => "DELETE",
        Delta::Modified => "MODIFY",
        Delta::Renamed => "RENAME",
        Delta::Copied => "COPY",
        Delta::Typechange => "TYPECHANGE",
        _ => "UNKNOWN",
    }
}
