//! Environment provisioning with pixi.
//!
//! The provisioner has two jobs: make sure a `pixi` executable is reachable
//! (installing it into `~/.pixi` when it is not), and run `pixi install` in
//! a workspace so its declared environment exists.

mod installer;

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::env::Env;
use crate::error::SetupError;
use crate::process::ProcessRunner;
use crate::settings::ManagerSettings;

const MANAGER_BIN: &str = "pixi";

/// Result of [`EnvironmentProvisioner::ensure_installed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerStatus {
    AlreadyInstalled,
    Installed,
}

pub struct EnvironmentProvisioner<R, E> {
    runner: R,
    env: E,
    install_url: String,
    install_sha256: Option<String>,
    shell: String,
}

impl<R: ProcessRunner, E: Env> EnvironmentProvisioner<R, E> {
    pub fn new(runner: R, env: E, manager: &ManagerSettings) -> Self {
        Self {
            runner,
            env,
            install_url: manager.install_url.clone(),
            install_sha256: manager.install_sha256.clone(),
            shell: manager.shell.clone(),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// `~/.pixi/bin/pixi` when that file exists, otherwise bare `pixi`
    /// resolved through `PATH`.
    pub fn manager_path(&self) -> PathBuf {
        if let Some(home) = self.env.home_dir() {
            let local = home.join(".pixi").join("bin").join(MANAGER_BIN);
            if local.is_file() {
                return local;
            }
        }
        PathBuf::from(MANAGER_BIN)
    }

    /// `true` when `pixi --version` runs and exits 0.
    pub fn is_installed(&self) -> bool {
        let manager = self.manager_path();
        match self.runner.capture(&manager, &["--version"]) {
            Ok(out) if out.success() => {
                debug!(manager = %manager.display(), version = out.stdout.trim(), "pixi found");
                true
            }
            Ok(out) => {
                debug!(manager = %manager.display(), status = ?out.status, "pixi --version failed");
                false
            }
            Err(e) => {
                debug!(manager = %manager.display(), error = %e, "pixi not runnable");
                false
            }
        }
    }

    /// Install pixi with its published script unless it already runs.
    ///
    /// The script is downloaded to a temp file and run with the configured
    /// shell from the home directory.
    pub fn ensure_installed(&self) -> Result<ManagerStatus, SetupError> {
        if self.is_installed() {
            return Ok(ManagerStatus::AlreadyInstalled);
        }

        info!(url = %self.install_url, "installing pixi");
        let failed = |reason: String| SetupError::ManagerInstallFailed { reason };

        let client = installer::http_client().map_err(|e| failed(format!("{e:#}")))?;
        let script = installer::download_script(&client, &self.install_url)
            .map_err(|e| failed(format!("download of {} failed: {e:#}", self.install_url)))?;

        let digest = installer::sha256_file(script.path()).map_err(|e| failed(format!("{e:#}")))?;
        info!(sha256 = %digest, "downloaded install script");
        if let Some(want) = &self.install_sha256
            && !want.trim().eq_ignore_ascii_case(&digest)
        {
            return Err(failed(format!(
                "install script checksum mismatch (expected {}, got {digest})",
                want.trim()
            )));
        }

        let cwd = self.env.home_dir().unwrap_or_else(std::env::temp_dir);
        let script_path = script.path().to_string_lossy().into_owned();
        match self
            .runner
            .stream(Path::new(&self.shell), &[script_path.as_str()], &cwd)
        {
            Ok(Some(0)) => {
                info!(manager = %self.manager_path().display(), "pixi installed");
                Ok(ManagerStatus::Installed)
            }
            Ok(Some(code)) => Err(failed(format!("install script exited with code {code}"))),
            Ok(None) => Err(failed("install script was terminated".to_string())),
            Err(e) => Err(failed(format!("could not run {}: {e}", self.shell))),
        }
    }

    /// Run `pixi install` inside `target_dir`.
    pub fn provision(&self, target_dir: &Path) -> Result<(), SetupError> {
        let manager = self.manager_path();
        info!(dir = %target_dir.display(), manager = %manager.display(), "running pixi install");
        match self.runner.stream(&manager, &["install"], target_dir) {
            Ok(Some(0)) => Ok(()),
            Ok(exit_code) => Err(SetupError::ProvisionFailed { exit_code }),
            Err(e) => {
                warn!(manager = %manager.display(), error = %e, "could not start pixi");
                Err(SetupError::ProvisionFailed { exit_code: None })
            }
        }
    }
}
