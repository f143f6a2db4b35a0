//! Git integration layer.
//!
//! The rest of the crate talks to git only through the [`Vcs`] trait.
//! [`Git2Vcs`] is the production backend (libgit2 via the `git2` crate);
//! tests swap in an in-memory fake so the directory and branch decision
//! tables can be exercised without a network.

mod git2_backend;

#[cfg(test)]
pub(crate) mod fake;
#[cfg(test)]
pub(crate) mod testutil;

use std::path::Path;

pub use git2_backend::Git2Vcs;

/// Options for a fresh clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloneOptions {
    /// Report transfer progress while cloning.
    pub progress: bool,
    /// Limit history to this many commits (`Some(1)` for a shallow clone).
    pub depth: Option<u32>,
}

impl CloneOptions {
    pub fn new(shallow: bool) -> Self {
        Self {
            progress: true,
            depth: shallow.then_some(1),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error("{0}")]
    Message(String),
}

/// Version-control operations used by setup.
///
/// Every method takes the checkout path explicitly and re-opens the
/// repository, so no state is cached between calls.
pub trait Vcs {
    fn clone_repo(&self, url: &str, dest: &Path, opts: &CloneOptions) -> Result<(), VcsError>;

    /// `true` only when `path` itself is the root of a non-bare checkout.
    fn is_repository(&self, path: &Path) -> bool;

    fn fetch(&self, path: &Path, remote: &str) -> Result<(), VcsError>;

    /// Switch the working tree to `branch`, creating a local tracking branch
    /// from `origin/<branch>` when only the remote one exists. With `force`
    /// modifications to tracked files are discarded; untracked files stay.
    fn checkout(&self, path: &Path, branch: &str, force: bool) -> Result<(), VcsError>;

    /// Fast-forward `branch` to `<remote>/<branch>`. Anything else is an error.
    fn pull(&self, path: &Path, remote: &str, branch: &str) -> Result<(), VcsError>;

    /// Create `name` at HEAD and attach HEAD to it. Fails if it already exists.
    fn create_and_switch_branch(&self, path: &Path, name: &str) -> Result<(), VcsError>;

    fn switch_branch(&self, path: &Path, name: &str) -> Result<(), VcsError>;

    /// Branch named by `refs/remotes/<remote>/HEAD`, if that symbolic ref exists.
    fn symbolic_remote_head(&self, path: &Path, remote: &str) -> Result<Option<String>, VcsError>;

    /// Default branch as advertised by the remote itself.
    fn remote_advertised_head(&self, path: &Path, remote: &str)
    -> Result<Option<String>, VcsError>;

    /// Remote-tracking branches as `<remote>/<name>`, without `HEAD`.
    fn list_remote_branches(&self, path: &Path) -> Result<Vec<String>, VcsError>;

    fn list_local_branches(&self, path: &Path) -> Result<Vec<String>, VcsError>;

    /// Branch HEAD is attached to, `None` when detached or unborn.
    fn current_branch(&self, path: &Path) -> Result<Option<String>, VcsError>;

    /// Number of untracked (not ignored) files in the working tree.
    fn untracked_count(&self, path: &Path) -> Result<usize, VcsError>;
}
