//! Throwaway git repositories for unit tests.

use std::fs;
use std::path::Path;

use git2::{Repository, Signature, Time};
use tempfile::TempDir;

pub struct ScratchRepo {
    dir: TempDir,
}

impl ScratchRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        Repository::init(dir.path()).expect("init git repo");
        ScratchRepo { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn repo(&self) -> Repository {
        Repository::open(self.dir.path()).expect("open git repo")
    }

    /// Write `content` to `relative_path` and commit it with the given author
    /// and committer time (epoch seconds), so ordering is deterministic.
    pub fn commit_file(&self, relative_path: &str, content: &str, message: &str, when: i64) -> String {
        let absolute = self.dir.path().join(relative_path);
        fs::create_dir_all(absolute.parent().expect("parent")).expect("create parent dirs");
        fs::write(&absolute, content).expect("write source file");

        let repo = self.repo();
        let mut index = repo.index().expect("open git index");
        index
            .add_path(Path::new(relative_path))
            .expect("add file to index");
        index.write().expect("write git index");
        let tree_id = index.write_tree().expect("write tree");
        let tree = repo.find_tree(tree_id).expect("find tree");

        let signature =
            Signature::new("Test User", "test@example.com", &Time::new(when, 0)).expect("signature");
        let parent = repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let oid = repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .expect("commit");
        oid.to_string()
    }

    /// Remove `relative_path` and commit the deletion.
    pub fn commit_removal(&self, relative_path: &str, message: &str, when: i64) -> String {
        let absolute = self.dir.path().join(relative_path);
        fs::remove_file(&absolute).expect("remove file");

        let repo = self.repo();
        let mut index = repo.index().expect("open git index");
        index
            .remove_path(Path::new(relative_path))
            .expect("remove file from index");
        index.write().expect("write git index");
        let tree_id = index.write_tree().expect("write tree");
        let tree = repo.find_tree(tree_id).expect("find tree");

        let signature =
            Signature::new("Test User", "test@example.com", &Time::new(when, 0)).expect("signature");
        let parent = repo.head().expect("head").peel_to_commit().expect("commit");

        let oid = repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &[&parent])
            .expect("commit removal");
        oid.to_string()
    }

    pub fn tag(&self, name: &str) {
        let repo = self.repo();
        let head = repo.head().expect("head").peel(git2::ObjectType::Commit).expect("peel");
        repo.tag_lightweight(name, &head, false).expect("tag");
    }
}
