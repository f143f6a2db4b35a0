use git2::{
    BranchType, Cred, Direction, ErrorCode, FetchOptions, Reference, RemoteCallbacks, Repository,
    StatusOptions,
    build::{CheckoutBuilder, RepoBuilder},
};
use std::path::Path;
use tracing::{debug, trace};

use super::{CloneOptions, Vcs, VcsError};

/// libgit2-backed implementation of [`Vcs`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Git2Vcs;

/// Build `RemoteCallbacks` with SSH-agent credentials enabled.
///
/// If no agent key is available it falls back to default credentials.
/// With `progress`, transfer statistics are logged every 10% and sideband
/// messages from the server are logged at trace level.
fn callbacks(progress: bool) -> RemoteCallbacks<'static> {
    let mut cb = RemoteCallbacks::new();
    cb.credentials(|_url, username_from_url, _allowed| {
        Cred::ssh_key_from_agent(username_from_url.unwrap_or("git")).or_else(|_| Cred::default())
    });

    if progress {
        let mut last_step = None;
        cb.transfer_progress(move |stats| {
            let total = stats.total_objects();
            if total > 0 {
                let step = stats.received_objects() * 10 / total;
                if last_step != Some(step) {
                    last_step = Some(step);
                    debug!(
                        target: "orion::git",
                        received = stats.received_objects(),
                        total,
                        bytes = stats.received_bytes(),
                        "receiving objects"
                    );
                }
            }
            true
        });
        cb.sideband_progress(|data| {
            trace!(target: "orion::git", "remote: {}", String::from_utf8_lossy(data).trim_end());
            true
        });
    }
    cb
}

fn fetch_options(progress: bool, depth: Option<u32>) -> FetchOptions<'static> {
    let mut fo = FetchOptions::new();
    fo.remote_callbacks(callbacks(progress));
    if let Some(d) = depth {
        fo.depth(i32::try_from(d).unwrap_or(i32::MAX));
    }
    fo
}

fn open(path: &Path) -> Result<Repository, VcsError> {
    Ok(Repository::open(path)?)
}

fn checkout_builder(force: bool) -> CheckoutBuilder<'static> {
    let mut cb = CheckoutBuilder::new();
    if force {
        cb.force();
    } else {
        cb.safe();
    }
    cb
}

/// Perform `git fetch <remote>` for branches and tags.
fn fetch_remote(repo: &Repository, remote: &str) -> Result<(), VcsError> {
    let mut fo = fetch_options(false, None);
    let heads = format!("refs/heads/*:refs/remotes/{remote}/*");
    let mut r = repo.find_remote(remote)?;
    r.fetch(
        &[heads.as_str(), "refs/tags/*:refs/tags/*"],
        Some(&mut fo),
        None,
    )?;
    Ok(())
}

/// Find the local branch `name`, creating it from `origin/<name>` (with
/// upstream tracking) when only the remote branch exists.
fn local_branch<'r>(repo: &'r Repository, name: &str) -> Result<Reference<'r>, VcsError> {
    if let Ok(b) = repo.find_branch(name, BranchType::Local) {
        return Ok(b.into_reference());
    }
    let remote_ref = repo
        .find_reference(&format!("refs/remotes/origin/{name}"))
        .map_err(|_| VcsError::Message(format!("no local or remote branch named {name}")))?;
    let tip = remote_ref.peel_to_commit()?;
    let mut b = repo.branch(name, &tip, false)?;
    b.set_upstream(Some(&format!("origin/{name}")))?;
    Ok(b.into_reference())
}

/// Check out the tree of `reference` and attach HEAD to it.
///
/// The tree is written before HEAD moves so that a safe checkout compares
/// against the branch being left.
fn attach(repo: &Repository, reference: &Reference, force: bool) -> Result<(), VcsError> {
    let name = reference
        .name()
        .ok_or_else(|| VcsError::Message("invalid reference name".into()))?;
    let commit = reference.peel_to_commit()?;
    repo.checkout_tree(commit.as_object(), Some(&mut checkout_builder(force)))?;
    repo.set_head(name)?;
    Ok(())
}

fn branch_names(repo: &Repository, kind: BranchType) -> Result<Vec<String>, VcsError> {
    let mut out = Vec::new();
    for item in repo.branches(Some(kind))? {
        let (b, _) = item?;
        if let Some(name) = b.name()?
            && !name.ends_with("/HEAD")
        {
            out.push(name.to_string());
        }
    }
    Ok(out)
}

impl Vcs for Git2Vcs {
    fn clone_repo(&self, url: &str, dest: &Path, opts: &CloneOptions) -> Result<(), VcsError> {
        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch_options(opts.progress, opts.depth));
        builder.clone(url, dest)?;
        Ok(())
    }

    fn is_repository(&self, path: &Path) -> bool {
        Repository::open(path)
            .map(|r| !r.is_bare())
            .unwrap_or(false)
    }

    fn fetch(&self, path: &Path, remote: &str) -> Result<(), VcsError> {
        fetch_remote(&open(path)?, remote)
    }

    fn checkout(&self, path: &Path, branch: &str, force: bool) -> Result<(), VcsError> {
        let repo = open(path)?;
        let reference = local_branch(&repo, branch)?;
        attach(&repo, &reference, force)
    }

    fn pull(&self, path: &Path, remote: &str, branch: &str) -> Result<(), VcsError> {
        let repo = open(path)?;
        let on_branch = repo
            .head()
            .ok()
            .filter(|h| h.is_branch())
            .and_then(|h| h.shorthand().map(str::to_string));
        if on_branch.as_deref() != Some(branch) {
            return Err(VcsError::Message(format!("HEAD is not on {branch}")));
        }

        fetch_remote(&repo, remote)?;
        let remote_ref = repo.find_reference(&format!("refs/remotes/{remote}/{branch}"))?;
        let incoming = repo.reference_to_annotated_commit(&remote_ref)?;
        let (analysis, _) = repo.merge_analysis(&[&incoming])?;
        if analysis.is_up_to_date() {
            return Ok(());
        }
        if !analysis.is_fast_forward() {
            return Err(VcsError::Message(format!(
                "{branch} has diverged from {remote}/{branch}, not a fast-forward"
            )));
        }

        let target = repo.find_commit(incoming.id())?;
        repo.checkout_tree(target.as_object(), Some(&mut checkout_builder(false)))?;
        let mut local = repo.find_reference(&format!("refs/heads/{branch}"))?;
        local.set_target(
            incoming.id(),
            &format!("pull: fast-forward to {remote}/{branch}"),
        )?;
        Ok(())
    }

    fn create_and_switch_branch(&self, path: &Path, name: &str) -> Result<(), VcsError> {
        let repo = open(path)?;
        let head = repo.head()?.peel_to_commit()?;
        let b = repo.branch(name, &head, false)?;
        let refname = b
            .get()
            .name()
            .ok_or_else(|| VcsError::Message("invalid reference name".into()))?
            .to_string();
        repo.set_head(&refname)?;
        Ok(())
    }

    fn switch_branch(&self, path: &Path, name: &str) -> Result<(), VcsError> {
        self.checkout(path, name, false)
    }

    fn symbolic_remote_head(&self, path: &Path, remote: &str) -> Result<Option<String>, VcsError> {
        let repo = open(path)?;
        let Ok(reference) = repo.find_reference(&format!("refs/remotes/{remote}/HEAD")) else {
            return Ok(None);
        };
        let prefix = format!("refs/remotes/{remote}/");
        Ok(reference
            .symbolic_target()
            .and_then(|t| t.strip_prefix(prefix.as_str()))
            .map(str::to_string))
    }

    fn remote_advertised_head(
        &self,
        path: &Path,
        remote: &str,
    ) -> Result<Option<String>, VcsError> {
        let repo = open(path)?;
        let mut r = repo.find_remote(remote)?;
        let conn = r.connect_auth(Direction::Fetch, Some(callbacks(false)), None)?;
        let buf = conn.default_branch()?;
        let name = buf
            .as_str()
            .and_then(|s| s.strip_prefix("refs/heads/"))
            .map(str::to_string);
        Ok(name)
    }

    fn list_remote_branches(&self, path: &Path) -> Result<Vec<String>, VcsError> {
        branch_names(&open(path)?, BranchType::Remote)
    }

    fn list_local_branches(&self, path: &Path) -> Result<Vec<String>, VcsError> {
        branch_names(&open(path)?, BranchType::Local)
    }

    fn current_branch(&self, path: &Path) -> Result<Option<String>, VcsError> {
        let repo = open(path)?;
        let head = match repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if head.is_branch() {
            Ok(head.shorthand().map(str::to_string))
        } else {
            Ok(None)
        }
    }

    fn untracked_count(&self, path: &Path) -> Result<usize, VcsError> {
        let repo = open(path)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = repo.statuses(Some(&mut opts))?;
        Ok(statuses.iter().filter(|e| e.status().is_wt_new()).count())
    }
}
