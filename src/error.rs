use std::path::PathBuf;

use crate::git::VcsError;

/// Everything that can go wrong while setting up a workspace.
///
/// Repository variants are fatal for the flow that raised them.
/// `ProvisionFailed` is downgraded to a warning by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("{} exists, is not empty, and is not a git repository", .path.display())]
    UnsafeTargetDirectory { path: PathBuf },

    #[error("git clone {url} failed")]
    CloneFailed {
        url: String,
        #[source]
        source: VcsError,
    },

    #[error("{} is not a git repository", .path.display())]
    NotARepository { path: PathBuf },

    #[error("git fetch origin failed")]
    FetchFailed {
        #[source]
        source: VcsError,
    },

    #[error("checkout of {branch} failed")]
    CheckoutFailed {
        branch: String,
        #[source]
        source: VcsError,
    },

    #[error("fast-forward pull of {branch} failed")]
    PullFailed {
        branch: String,
        #[source]
        source: VcsError,
    },

    #[error("could not create branch {branch}")]
    BranchCreationFailed {
        branch: String,
        #[source]
        source: VcsError,
    },

    #[error("failed to install pixi: {reason}")]
    ManagerInstallFailed { reason: String },

    #[error("pixi install exited with {}", .exit_code.map_or_else(|| "no status".to_string(), |c| format!("code {c}")))]
    ProvisionFailed { exit_code: Option<i32> },

    #[error("another setup is running for this target (remove {} if it is stale)", .lock.display())]
    TargetBusy { lock: PathBuf },

    #[error("{}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {}: {reason}", .path.display())]
    Settings { path: PathBuf, reason: String },
}

impl SetupError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
