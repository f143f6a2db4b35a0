use git2::{Commit, Repository, RepositoryInitOptions, Signature};
use std::fs;
use std::path::Path;

/// Write `rel` in the work tree and commit it on HEAD.
pub fn commit_file(repo: &Repository, rel: &str, contents: &str, msg: &str) {
    let workdir = repo.workdir().unwrap();
    let file = workdir.join(rel);
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&file, contents).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(rel)).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::now("Orion Test", "test@example.com").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &parents)
        .unwrap();
}

/// A non-bare repository with one commit (`README.md`) on `branch`.
pub fn upstream_repo(dir: &Path, branch: &str) -> Repository {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head(branch);
    let repo = Repository::init_opts(dir, &opts).unwrap();
    commit_file(&repo, "README.md", "hello\n", "initial");
    repo
}
