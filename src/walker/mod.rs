//! Version walking over a scratch clone.
//!
//! The walker owns all destructive git operations: it clones a project into a
//! scratch directory, enumerates its versions, and checks each one out with
//! `--force` semantics before handing back a [`RepoState`] snapshot of the
//! tree. The working tree is mutated in place and only restored by the next
//! checkout, so a walk is stateful and must never be iterated concurrently.

pub mod versions;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{AutotagOption, FetchOptions, Oid, Repository, ResetType};
use walkdir::WalkDir;

use crate::model::{Project, Version};
use crate::paths::Paths;

pub use versions::{interval_versions, tag_versions, version_history};

/// Snapshot of a project's working tree at one checked-out version.
#[derive(Debug)]
pub struct RepoState {
    pub version: Version,
    pub repo_root: PathBuf,
    /// All `.java` sources under the tree.
    pub java_files: Vec<PathBuf>,
    /// Unique directories containing at least one Java source ("packages").
    pub packages: BTreeSet<PathBuf>,
}

impl RepoState {
    pub fn capture(repo_root: &Path, version: Version) -> Self {
        let mut java_files = Vec::new();
        for entry in WalkDir::new(repo_root)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git")
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("java"))
                    .unwrap_or(false)
            {
                java_files.push(path.to_path_buf());
            }
        }
        java_files.sort();

        let packages = java_files
            .iter()
            .filter_map(|file| file.parent())
            .map(|dir| dir.to_path_buf())
            .collect();

        RepoState {
            version,
            repo_root: repo_root.to_path_buf(),
            java_files,
            packages,
        }
    }

    /// A package path relative to the repository root.
    pub fn local_package_path(&self, package: &Path) -> String {
        package
            .strip_prefix(&self.repo_root)
            .unwrap_or(package)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Identify macro-package roots for the smell detector.
    ///
    /// The detector reports packages as dotted names (`org.apache.foo`) with
    /// no clue which source root they came from. For every Java file whose
    /// directory contains a `/java/org/` segment we keep the prefix up to and
    /// including `/java/` as a macro-package root; the dotted remainder is
    /// recoverable from the detector output. Files without the marker are
    /// logged and skipped.
    pub fn macro_package_roots(&self) -> BTreeSet<PathBuf> {
        const MARKER: &str = "/java/org/";

        let mut roots = BTreeSet::new();
        for file in &self.java_files {
            let Some(dir) = file.parent() else { continue };
            let normalized = dir.to_string_lossy().replace('\\', "/");
            match normalized.rfind(MARKER) {
                Some(idx) => {
                    let root = &normalized[..idx + "/java/".len()];
                    roots.insert(PathBuf::from(root));
                }
                None => {
                    log::warn!("source without a recognizable package root: {}", file.display());
                }
            }
        }
        roots
    }
}

/// Walks a project's versions over a dedicated scratch clone.
pub struct RepoVersionWalker {
    repo_path: PathBuf,
    versions: Vec<Version>,
}

impl RepoVersionWalker {
    /// Prepare the scratch clone and enumerate versions. Any stale clone from
    /// an earlier run is removed first.
    pub fn open(project: &Project, paths: &Paths) -> Result<Self> {
        let temp_repo = paths.processing_dir(&project.name).join("temp_repo");
        if temp_repo.exists() {
            fs::remove_dir_all(&temp_repo)
                .with_context(|| format!("failed to clear {}", temp_repo.display()))?;
        }
        fs::create_dir_all(&temp_repo)?;

        let repo_path = temp_repo.join(&project.name);
        log::info!("cloning scratch repo from {}", project.git_url);
        let repo = clone(&project.git_url, &project.branch, &repo_path)?;

        let versions = version_history(&repo, project)?;
        log::info!(
            "{}: walking {} versions ({:?} style)",
            project.name,
            versions.len(),
            project.version_style
        );

        Ok(RepoVersionWalker {
            repo_path,
            versions,
        })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// Force-checkout one version and capture the tree. Discards whatever the
    /// previous per-version processing left in the working tree.
    pub fn checkout(&self, version: &Version) -> Result<RepoState> {
        log::info!("moving head to {} ({})", version.hash, version.id);
        let repo = Repository::open(&self.repo_path)?;
        checkout_commit(&repo, &version.hash)?;
        Ok(RepoState::capture(&self.repo_path, version.clone()))
    }
}

/// Clone `url` into `path`, checking out `branch` when the remote has it.
pub fn clone(url: &str, branch: &str, path: &Path) -> Result<Repository> {
    let mut builder = RepoBuilder::new();
    if !branch.is_empty() {
        builder.branch(branch);
    }
    builder
        .clone(url, path)
        .with_context(|| format!("failed to clone {url} into {}", path.display()))
}

/// Make sure a project's persistent mirror exists and, optionally, matches
/// the remote branch head (fetch + hard reset, tags included).
pub fn ensure_mirror(project: &Project, update_if_exists: bool) -> Result<()> {
    if !project.mirror_path.exists() {
        log::info!("cloning mirror for {} from {}", project.name, project.git_url);
        clone(&project.git_url, &project.branch, &project.mirror_path)?;
        return Ok(());
    }

    if !update_if_exists {
        return Ok(());
    }

    log::info!("updating mirror for {}", project.name);
    let repo = Repository::open(&project.mirror_path)
        .with_context(|| format!("failed to open mirror {}", project.mirror_path.display()))?;

    let mut remote = repo.find_remote("origin")?;
    let mut opts = FetchOptions::new();
    opts.download_tags(AutotagOption::All);
    let refspec = format!(
        "+refs/heads/{branch}:refs/remotes/origin/{branch}",
        branch = project.branch
    );
    remote
        .fetch(&[refspec.as_str()], Some(&mut opts), None)
        .with_context(|| format!("failed to fetch {}", project.git_url))?;

    let remote_head = repo.refname_to_id(&format!("refs/remotes/origin/{}", project.branch))?;
    let object = repo.find_object(remote_head, None)?;
    repo.reset(&object, ResetType::Hard, None)?;
    Ok(())
}

/// `git checkout -f <hash>`: reset the tree to a commit, discarding local
/// modifications and untracked leftovers.
pub fn checkout_commit(repo: &Repository, hash: &str) -> Result<()> {
    let oid = Oid::from_str(hash).with_context(|| format!("invalid commit hash {hash}"))?;
    let object = repo.find_object(oid, None)?;

    let mut checkout = CheckoutBuilder::new();
    checkout.force().remove_untracked(true);
    repo.checkout_tree(&object, Some(&mut checkout))
        .with_context(|| format!("forced checkout of {hash} failed"))?;
    repo.set_head_detached(oid)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScratchRepo;

    const JAVA_SOURCE: &str = "package org.apache.demo;\npublic class Demo {}\n";

    #[test]
    fn repo_state_enumerates_java_files_and_packages() {
        let scratch = ScratchRepo::new();
        scratch.commit_file("server/src/main/java/org/apache/demo/Demo.java", JAVA_SOURCE, "a", 0);
        scratch.commit_file("server/src/main/java/org/apache/demo/Other.java", JAVA_SOURCE, "b", 1);
        scratch.commit_file("README.md", "docs", "c", 2);

        let state = RepoState::capture(
            scratch.path(),
            Version::new("1", "deadbeef", chrono::Utc::now()),
        );
        assert_eq!(state.java_files.len(), 2);
        assert_eq!(state.packages.len(), 1);
    }

    #[test]
    fn macro_package_roots_keep_the_java_prefix() {
        let scratch = ScratchRepo::new();
        scratch.commit_file("server/src/main/java/org/apache/demo/Demo.java", JAVA_SOURCE, "a", 0);
        scratch.commit_file("client/src/main/java/org/apache/cli/Cli.java", JAVA_SOURCE, "b", 1);
        scratch.commit_file("scripts/Helper.java", "public class Helper {}", "c", 2);

        let state = RepoState::capture(
            scratch.path(),
            Version::new("1", "deadbeef", chrono::Utc::now()),
        );
        let roots = state.macro_package_roots();
        assert_eq!(roots.len(), 2, "one root per source tree; markerless file skipped");
        for root in &roots {
            assert!(root.to_string_lossy().ends_with("/java/"));
        }
    }

    #[test]
    fn checkout_restores_earlier_tree() {
        let scratch = ScratchRepo::new();
        let first = scratch.commit_file("a/Main.java", JAVA_SOURCE, "add main", 0);
        scratch.commit_removal("a/Main.java", "remove main", 10);

        let repo = scratch.repo();
        assert!(!scratch.path().join("a/Main.java").exists());
        checkout_commit(&repo, &first).expect("forced checkout");
        assert!(scratch.path().join("a/Main.java").exists());
    }

    #[test]
    fn walker_clones_and_walks_local_repo() {
        let scratch = ScratchRepo::new();
        scratch.commit_file("x/src/main/java/org/demo/A.java", JAVA_SOURCE, "first", 1_000);
        scratch.tag("v1");
        scratch.commit_file("x/src/main/java/org/demo/B.java", JAVA_SOURCE, "second", 2_000);
        scratch.tag("v2");

        let root = tempfile::tempdir().expect("tempdir");
        let paths = Paths::new(root.path());
        let project = Project::new(
            "demo",
            "tester",
            "", // default branch of the local clone
            scratch.path().to_str().expect("utf8 path"),
            "",
            &paths,
        );

        let walker = RepoVersionWalker::open(&project, &paths).expect("open walker");
        assert_eq!(walker.versions().len(), 2);

        let first = walker.versions()[0].clone();
        let state = walker.checkout(&first).expect("checkout v1");
        assert_eq!(state.java_files.len(), 1, "second file absent at v1");

        let second = walker.versions()[1].clone();
        let state = walker.checkout(&second).expect("checkout v2");
        assert_eq!(state.java_files.len(), 2);
    }
}
