//! Repository acquisition and synchronization.
//!
//! [`RepositorySynchronizer`] makes sure a target directory holds a usable
//! checkout of a notebook repository, and can bring an existing checkout up
//! to date before starting a fresh session branch. It never assumes
//! exclusive access to the directory: every decision re-probes the disk.

pub mod branch;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::env::Env;
use crate::error::SetupError;
use crate::git::{CloneOptions, Vcs, VcsError};
use branch::{detect_default_branch, session_branch_name};

/// Remote that refreshes fetch from and pull against.
pub const DEFAULT_REMOTE: &str = "origin";

/// One synchronization target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    pub remote_url: String,
    pub local_path: PathBuf,
}

impl RepositoryDescriptor {
    pub fn new(remote_url: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            remote_url: remote_url.into(),
            local_path: local_path.into(),
        }
    }
}

/// What a target directory looks like right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryState {
    Absent,
    Empty,
    NonEmptyNotRepo,
    NonEmptyIsRepo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneOutcome {
    Cloned,
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub new_branch_name: String,
}

/// Classify `path`. Anything that exists but is not a directory is treated
/// as non-empty foreign content.
pub fn probe_directory<V: Vcs + ?Sized>(
    vcs: &V,
    path: &Path,
) -> Result<DirectoryState, SetupError> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(DirectoryState::Absent),
        Err(e) => return Err(SetupError::io(path, e)),
    };
    if !meta.is_dir() {
        return Ok(DirectoryState::NonEmptyNotRepo);
    }
    let mut entries = fs::read_dir(path).map_err(|e| SetupError::io(path, e))?;
    if entries.next().is_none() {
        return Ok(DirectoryState::Empty);
    }
    if vcs.is_repository(path) {
        Ok(DirectoryState::NonEmptyIsRepo)
    } else {
        Ok(DirectoryState::NonEmptyNotRepo)
    }
}

type BranchAttempt<V> = fn(&V, &Path, &str) -> Result<(), VcsError>;

pub struct RepositorySynchronizer<V, E> {
    vcs: V,
    env: E,
}

impl<V: Vcs, E: Env> RepositorySynchronizer<V, E> {
    pub fn new(vcs: V, env: E) -> Self {
        Self { vcs, env }
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    pub fn is_repository(&self, path: &Path) -> bool {
        self.vcs.is_repository(path)
    }

    /// Make sure `repo.local_path` holds a checkout of some repository.
    ///
    /// | directory                 | action                          |
    /// |---------------------------|---------------------------------|
    /// | absent                    | create (with parents), clone    |
    /// | empty                     | clone into it                   |
    /// | non-empty, a checkout     | nothing, `AlreadyPresent`       |
    /// | non-empty, not a checkout | `UnsafeTargetDirectory`         |
    ///
    /// With `branch`, the checkout then moves to a new branch of that name,
    /// or to the existing one if creation fails. Failing both only logs a
    /// warning; the checkout itself is still usable.
    pub fn ensure_cloned(
        &self,
        repo: &RepositoryDescriptor,
        branch: Option<&str>,
        shallow: bool,
    ) -> Result<CloneOutcome, SetupError> {
        let path = &repo.local_path;
        let state = probe_directory(&self.vcs, path)?;
        debug!(path = %path.display(), ?state, "probed target directory");

        let outcome = match state {
            DirectoryState::Absent => {
                fs::create_dir_all(path).map_err(|e| SetupError::io(path, e))?;
                self.clone_into(repo, shallow, true)?
            }
            DirectoryState::Empty => self.clone_into(repo, shallow, false)?,
            DirectoryState::NonEmptyIsRepo => {
                info!(path = %path.display(), "already a git repository, skipping clone");
                CloneOutcome::AlreadyPresent
            }
            DirectoryState::NonEmptyNotRepo => {
                return Err(SetupError::UnsafeTargetDirectory { path: path.clone() });
            }
        };

        if let Some(name) = branch {
            self.enter_branch(path, name);
        }
        Ok(outcome)
    }

    fn clone_into(
        &self,
        repo: &RepositoryDescriptor,
        shallow: bool,
        created: bool,
    ) -> Result<CloneOutcome, SetupError> {
        info!(url = %repo.remote_url, path = %repo.local_path.display(), shallow, "cloning");
        let opts = CloneOptions::new(shallow);
        let vcs = &self.vcs;
        match vcs.clone_repo(&repo.remote_url, &repo.local_path, &opts) {
            Ok(()) => Ok(CloneOutcome::Cloned),
            Err(source) => {
                // Only undo a directory this call created.
                if created && let Err(e) = fs::remove_dir_all(&repo.local_path) {
                    warn!(
                        path = %repo.local_path.display(),
                        error = %e,
                        "could not remove partial clone"
                    );
                }
                Err(SetupError::CloneFailed {
                    url: repo.remote_url.clone(),
                    source,
                })
            }
        }
    }

    fn enter_branch(&self, path: &Path, name: &str) {
        let attempts: [(&str, BranchAttempt<V>); 2] = [
            ("create", V::create_and_switch_branch),
            ("switch", V::switch_branch),
        ];
        let mut last_err = None;
        for (how, attempt) in attempts {
            match attempt(&self.vcs, path, name) {
                Ok(()) => {
                    info!(branch = name, how, "checked out branch");
                    return;
                }
                Err(e) => {
                    debug!(branch = name, how, error = %e, "branch attempt failed");
                    last_err = Some(e);
                }
            }
        }
        if let Some(e) = last_err {
            warn!(
                branch = name,
                error = %e,
                "could not check out branch, staying on the current one"
            );
        }
    }

    /// Bring an existing checkout to the tip of its default branch and start
    /// a new session branch there.
    ///
    /// Tracked modifications are discarded by the forced checkout; untracked
    /// files are never touched. Every step is fatal on failure.
    pub fn refresh(&self, path: &Path) -> Result<SyncResult, SetupError> {
        if !self.vcs.is_repository(path) {
            return Err(SetupError::NotARepository {
                path: path.to_path_buf(),
            });
        }

        info!(path = %path.display(), "fetching {DEFAULT_REMOTE}");
        self.vcs
            .fetch(path, DEFAULT_REMOTE)
            .map_err(|source| SetupError::FetchFailed { source })?;

        let branch = detect_default_branch(&self.vcs, path, DEFAULT_REMOTE);
        info!(%branch, "switching to default branch");
        self.vcs
            .checkout(path, &branch, true)
            .map_err(|source| SetupError::CheckoutFailed {
                branch: branch.clone(),
                source,
            })?;

        self.vcs
            .pull(path, DEFAULT_REMOTE, &branch)
            .map_err(|source| SetupError::PullFailed {
                branch: branch.clone(),
                source,
            })?;

        self.start_session(path)
    }

    /// Create and switch to a fresh `<user>-session-<timestamp>` branch at HEAD.
    pub fn start_session(&self, path: &Path) -> Result<SyncResult, SetupError> {
        let name = session_branch_name(&self.env);
        self.vcs
            .create_and_switch_branch(path, &name)
            .map_err(|source| SetupError::BranchCreationFailed {
                branch: name.clone(),
                source,
            })?;
        info!(branch = %name, "started session branch");
        Ok(SyncResult {
            new_branch_name: name,
        })
    }
}
