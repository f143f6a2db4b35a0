//! Setup flows: existing directory, clone, and express.
//!
//! [`Orchestrator`] drives one flow end to end. The `cmd_*` functions wire
//! it to the real git, process and environment backends for the CLI, or
//! print the equivalent shell script for a remote host instead.

pub mod remote;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use indicatif::ProgressBar;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

use crate::env::{Env, SystemEnv};
use crate::error::SetupError;
use crate::git::{Git2Vcs, Vcs, VcsError};
use crate::lock::PathLock;
use crate::paths::{Paths, absolutize, expand_tilde, paths};
use crate::pixi::EnvironmentProvisioner;
use crate::process::{ProcessRunner, SystemRunner};
use crate::progress::{err_style, ok_style, spinner, warn_style};
use crate::repo::{RepositoryDescriptor, RepositorySynchronizer};
use crate::settings::{ManagerSettings, Settings, load_settings};
use crate::state::{SetupRecord, last_target_dir, save_record};
use remote::{ScriptPlan, render_script};

pub use crate::state::SetupMode;

/// One setup to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupRequest {
    pub mode: SetupMode,
    pub target_dir: PathBuf,
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub shallow: bool,
}

impl SetupRequest {
    pub fn existing(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: SetupMode::Existing,
            target_dir: target_dir.into(),
            repo_url: None,
            branch: None,
            shallow: false,
        }
    }

    pub fn clone_into(url: impl Into<String>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: SetupMode::Clone,
            repo_url: Some(url.into()),
            ..Self::existing(target_dir)
        }
    }

    pub fn express(url: impl Into<String>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: SetupMode::Express,
            repo_url: Some(url.into()),
            ..Self::existing(target_dir)
        }
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_shallow(mut self, shallow: bool) -> Self {
        self.shallow = shallow;
        self
    }
}

/// What a successful setup produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupOutcome {
    pub target_dir: PathBuf,
    /// Branch the checkout ended up on, if any.
    pub branch_name: Option<String>,
    /// Downgraded failures, e.g. a failed `pixi install`.
    pub warnings: Vec<String>,
}

pub struct Orchestrator<V, R, E> {
    sync: RepositorySynchronizer<V, E>,
    provisioner: EnvironmentProvisioner<R, E>,
    env: E,
    paths: Paths,
}

impl<V: Vcs, R: ProcessRunner, E: Env + Clone> Orchestrator<V, R, E> {
    pub fn new(vcs: V, runner: R, env: E, manager: &ManagerSettings, paths: Paths) -> Self {
        Self {
            sync: RepositorySynchronizer::new(vcs, env.clone()),
            provisioner: EnvironmentProvisioner::new(runner, env.clone(), manager),
            env,
            paths,
        }
    }

    pub fn synchronizer(&self) -> &RepositorySynchronizer<V, E> {
        &self.sync
    }

    pub fn provisioner(&self) -> &EnvironmentProvisioner<R, E> {
        &self.provisioner
    }

    /// Run one setup flow.
    ///
    /// Steps, each re-probing the disk:
    /// 1. Lock the target against a concurrent setup.
    /// 2. Repository work for the mode (none for `Existing`).
    /// 3. Make sure pixi is installed. Failure here is fatal.
    /// 4. `pixi install` in the target. Failure becomes a warning.
    /// 5. Save the setup record.
    pub fn run(&self, req: &SetupRequest, pb: &ProgressBar) -> Result<SetupOutcome, SetupError> {
        let dir = req.target_dir.as_path();
        let _lock = PathLock::acquire(&self.paths.locks, dir)?;

        let mut outcome = SetupOutcome {
            target_dir: req.target_dir.clone(),
            branch_name: None,
            warnings: Vec::new(),
        };

        match req.mode {
            SetupMode::Existing => {
                pb.set_message(format!("using {}", dir.display()));
                require_directory(dir)?;
                outcome.branch_name = self.current_branch(dir);
            }
            SetupMode::Clone => {
                let repo = self.descriptor(req)?;
                pb.set_message(format!("cloning {}", repo.remote_url));
                self.sync
                    .ensure_cloned(&repo, req.branch.as_deref(), req.shallow)?;
                outcome.branch_name = self.current_branch(dir);
            }
            SetupMode::Express => {
                let result = if self.sync.is_repository(dir) {
                    pb.set_message(format!("updating {}", dir.display()));
                    self.sync.refresh(dir)?
                } else {
                    let repo = self.descriptor(req)?;
                    pb.set_message(format!("downloading {}", repo.remote_url));
                    self.sync.ensure_cloned(&repo, None, false)?;
                    self.sync.start_session(dir)?
                };
                outcome.branch_name = Some(result.new_branch_name);
            }
        }

        pb.set_message("checking pixi");
        self.provisioner.ensure_installed()?;

        pb.set_message("installing environment (pixi install)");
        if let Err(e) = self.provisioner.provision(dir) {
            warn!(dir = %dir.display(), error = %e, "environment setup failed, continuing");
            let hint = format!("{e}; run `pixi install` in {} to retry", dir.display());
            outcome.warnings.push(hint);
        }

        let record = SetupRecord {
            mode: req.mode,
            target_dir: req.target_dir.clone(),
            branch_name: outcome.branch_name.clone(),
            setup_date: self.env.now(),
            repo_url: req.repo_url.clone(),
            shallow: req.shallow,
        };
        if let Err(e) = save_record(&self.paths.state, &record) {
            warn!(error = %e, "could not save setup record");
            let note = format!("setup record not saved: {e}");
            outcome.warnings.push(note);
        }

        info!(dir = %dir.display(), mode = ?req.mode, "setup complete");
        Ok(outcome)
    }

    fn descriptor(&self, req: &SetupRequest) -> Result<RepositoryDescriptor, SetupError> {
        match req.repo_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(url) => Ok(RepositoryDescriptor::new(url, &req.target_dir)),
            None => Err(SetupError::CloneFailed {
                url: String::new(),
                source: VcsError::Message("no repository url given".into()),
            }),
        }
    }

    fn current_branch(&self, dir: &Path) -> Option<String> {
        if !self.sync.is_repository(dir) {
            return None;
        }
        self.sync.vcs().current_branch(dir).ok().flatten()
    }
}

fn require_directory(dir: &Path) -> Result<(), SetupError> {
    let meta = fs::metadata(dir).map_err(|e| SetupError::io(dir, e))?;
    if meta.is_dir() {
        Ok(())
    } else {
        Err(SetupError::io(
            dir,
            io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
        ))
    }
}

/// How the finished workspace should be handed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Spawn the configured open command afterwards.
    pub open: bool,
    /// Print a shell script for a remote host instead of running locally.
    pub emit_script: bool,
}

/// `orion express`: set up a registry repository with a fresh session branch.
pub fn cmd_express(repo_id: Option<&str>, opts: RunOptions) -> Result<()> {
    let env = SystemEnv;
    let p = paths(&env)?;
    let settings = load_settings(&p.settings)?;
    let entry = settings.repository(repo_id)?;

    let target = resolve_target(&entry.target_dir, &env, opts.emit_script)?;
    let req = SetupRequest::express(entry.url.clone(), target);
    execute(&settings, &p, &req, &entry.target_dir, opts)
}

/// `orion setup existing <DIR>`.
pub fn cmd_setup_existing(dir: &Path, opts: RunOptions) -> Result<()> {
    let env = SystemEnv;
    let p = paths(&env)?;
    let settings = load_settings(&p.settings)?;

    let target = if opts.emit_script {
        dir.to_path_buf()
    } else {
        absolutize(dir)?
    };
    let req = SetupRequest::existing(&target);
    execute(&settings, &p, &req, &target.to_string_lossy(), opts)
}

/// Arguments of `orion setup clone`.
#[derive(Debug, Clone, Default)]
pub struct CloneArgs {
    pub repo: Option<String>,
    pub url: Option<String>,
    pub target: Option<PathBuf>,
    pub branch: Option<String>,
    pub shallow: bool,
}

/// `orion setup clone`: a registry entry or an explicit URL and target.
pub fn cmd_setup_clone(args: CloneArgs, opts: RunOptions) -> Result<()> {
    let env = SystemEnv;
    let p = paths(&env)?;
    let settings = load_settings(&p.settings)?;

    let (url, target_text) = match (&args.url, &args.target) {
        (Some(url), Some(target)) => (url.clone(), target.to_string_lossy().into_owned()),
        (Some(_), None) => bail!("--target is required with --url"),
        (None, target) => {
            let entry = settings.repository(args.repo.as_deref())?;
            let text = match target {
                Some(t) => t.to_string_lossy().into_owned(),
                None => entry.target_dir.clone(),
            };
            (entry.url.clone(), text)
        }
    };

    let target = resolve_target(&target_text, &env, opts.emit_script)?;
    let req = SetupRequest::clone_into(url, target)
        .with_branch(args.branch)
        .with_shallow(args.shallow);
    execute(&settings, &p, &req, &target_text, opts)
}

/// Expand `~` and, for local runs, make the target absolute so the lock
/// and the saved record do not depend on the working directory.
fn resolve_target(text: &str, env: &impl Env, emit_script: bool) -> Result<PathBuf> {
    let target = expand_tilde(text, env);
    if emit_script {
        Ok(target)
    } else {
        absolutize(&target)
    }
}

fn execute(
    settings: &Settings,
    p: &Paths,
    req: &SetupRequest,
    script_target: &str,
    opts: RunOptions,
) -> Result<()> {
    let open_command = settings
        .workspace
        .open_command
        .as_deref()
        .filter(|_| opts.open);

    if opts.emit_script {
        let plan = ScriptPlan::new(req, script_target, &settings.manager, open_command);
        print!("{}", render_script(&plan));
        return Ok(());
    }

    let pb = spinner("starting setup");
    let orchestrator = Orchestrator::new(
        Git2Vcs,
        SystemRunner,
        SystemEnv,
        &settings.manager,
        p.clone(),
    );

    let outcome = match orchestrator.run(req, &pb) {
        Ok(o) => o,
        Err(e) => {
            pb.set_style(err_style());
            pb.finish_with_message("setup failed");
            return Err(e.into());
        }
    };

    let ready = match &outcome.branch_name {
        Some(b) => format!("workspace ready on branch {b}"),
        None => "workspace ready".to_string(),
    };
    if outcome.warnings.is_empty() {
        pb.set_style(ok_style());
    } else {
        pb.set_style(warn_style());
    }
    pb.finish_with_message(ready);
    for w in &outcome.warnings {
        eprintln!("{} {w}", "warning:".yellow().bold());
    }

    open_workspace(&outcome.target_dir, open_command);
    Ok(())
}

/// Print `dir` and, when configured, launch the open command on it.
///
/// The command is split on whitespace, so `code -n` works. Failing to
/// start it is only a warning.
pub fn open_workspace(dir: &Path, open_command: Option<&str>) {
    println!("{}", dir.display());

    let Some(cmdline) = open_command else {
        return;
    };
    let mut words = cmdline.split_whitespace();
    let Some(program) = words.next() else {
        return;
    };
    match Command::new(program).args(words).arg(dir).spawn() {
        Ok(child) => info!(program, pid = child.id(), "opened workspace"),
        Err(e) => eprintln!(
            "{} could not run {program}: {e}",
            "warning:".yellow().bold()
        ),
    }
}

/// `orion launch`: reopen the last workspace, or show what can be set up.
pub fn cmd_launch(open: bool) -> Result<()> {
    let env = SystemEnv;
    let p = paths(&env)?;

    if let Some(dir) = last_target_dir(&p.state) {
        info!(dir = %dir.display(), "resuming last workspace");
        let settings = load_settings(&p.settings)
            .with_context(|| format!("failed to load {}", p.settings.display()))?;
        let cmd = settings.workspace.open_command.as_deref().filter(|_| open);
        open_workspace(&dir, cmd);
        return Ok(());
    }

    crate::status::cmd_status()?;
    eprintln!();
    eprintln!("no workspace set up yet. Next steps:");
    eprintln!("  orion express               clone the default notebooks and start a session");
    eprintln!("  orion setup clone --url URL --target DIR");
    eprintln!("  orion setup existing DIR    use a folder you already have");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::FixedEnv;
    use crate::git::fake::FakeVcs;
    use crate::pixi::fake::FakeRunner;
    use chrono::{TimeZone, Utc};
    use tempfile::{TempDir, tempdir};

    const URL: &str = "https://example.test/notebooks.git";

    struct Fixture {
        _td: TempDir,
        home: PathBuf,
        paths: Paths,
    }

    fn fixture() -> Fixture {
        let td = tempdir().unwrap();
        let home = td.path().join("home");
        let orion = home.join(".orion-studio");
        fs::create_dir_all(&orion).unwrap();
        Fixture {
            paths: Paths {
                state: orion.join("config.json"),
                settings: orion.join("settings.toml"),
                locks: orion.join("locks"),
                home: orion,
            },
            home,
            _td: td,
        }
    }

    fn orchestrator(
        fx: &Fixture,
        vcs: FakeVcs,
        runner: FakeRunner,
    ) -> Orchestrator<FakeVcs, FakeRunner, FixedEnv> {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let env = FixedEnv::new(&fx.home, now).with_var("USER", "alice");
        let manager = ManagerSettings {
            // Nothing listens here; only reached when pixi is missing.
            install_url: "http://127.0.0.1:9/install.sh".into(),
            shell: "bash".into(),
            install_sha256: None,
        };
        Orchestrator::new(vcs, runner, env, &manager, fx.paths.clone())
    }

    fn saved(fx: &Fixture) -> SetupRecord {
        serde_json::from_str(&fs::read_to_string(&fx.paths.state).unwrap()).unwrap()
    }

    #[test]
    fn express_on_fresh_target_clones_and_starts_session() {
        let fx = fixture();
        let target = fx.home.join("orion_notebooks");
        let orch = orchestrator(&fx, FakeVcs::new(), FakeRunner::new());

        let out = orch
            .run(&SetupRequest::express(URL, &target), &ProgressBar::hidden())
            .unwrap();

        let session = "alice-session-20240101-120000";
        assert_eq!(out.branch_name.as_deref(), Some(session));
        assert!(out.warnings.is_empty());
        assert_eq!(
            orch.synchronizer().vcs().calls(),
            vec![
                format!("clone {URL} {}", target.display()),
                format!("create_branch {session}"),
            ]
        );

        let runs = orch.provisioner().runner().calls();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].args, vec!["--version"]);
        assert_eq!(runs[1].args, vec!["install"]);
        assert_eq!(runs[1].cwd.as_deref(), Some(target.as_path()));

        let rec = saved(&fx);
        assert_eq!(rec.mode, SetupMode::Express);
        assert_eq!(rec.target_dir, target);
        assert_eq!(rec.branch_name.as_deref(), Some(session));
        assert_eq!(rec.repo_url.as_deref(), Some(URL));
        assert!(!rec.shallow);
    }

    #[test]
    fn express_on_checkout_refreshes() {
        let fx = fixture();
        let target = fx.home.join("orion_notebooks");
        fs::create_dir_all(&target).unwrap();
        let vcs = FakeVcs::new();
        vcs.with(|s| {
            s.repos.insert(target.clone());
            s.remote_branches = vec!["origin/main".into()];
        });
        let orch = orchestrator(&fx, vcs, FakeRunner::new());

        let out = orch
            .run(&SetupRequest::express(URL, &target), &ProgressBar::hidden())
            .unwrap();

        let vcs = orch.synchronizer().vcs();
        assert_eq!(vcs.count("clone"), 0);
        assert_eq!(vcs.count("fetch"), 1);
        assert_eq!(vcs.count("pull"), 1);
        assert_eq!(
            out.branch_name.as_deref(),
            Some("alice-session-20240101-120000")
        );
    }

    #[test]
    fn provision_failure_is_a_warning() {
        let fx = fixture();
        let target = fx.home.join("ws");
        let orch = orchestrator(&fx, FakeVcs::new(), FakeRunner::new().stream_exits(Some(1)));

        let req = SetupRequest::clone_into(URL, &target);
        let out = orch.run(&req, &ProgressBar::hidden()).unwrap();

        assert_eq!(out.warnings.len(), 1);
        let warning = &out.warnings[0];
        assert!(warning.starts_with("pixi install exited with code 1"));
        assert_eq!(saved(&fx).mode, SetupMode::Clone);
    }

    #[test]
    fn manager_install_failure_is_fatal_and_saves_nothing() {
        let fx = fixture();
        let target = fx.home.join("ws");
        let orch = orchestrator(&fx, FakeVcs::new(), FakeRunner::new().version_missing());

        let req = SetupRequest::clone_into(URL, &target);
        let err = orch.run(&req, &ProgressBar::hidden()).unwrap_err();

        assert!(matches!(err, SetupError::ManagerInstallFailed { .. }));
        assert!(!fx.paths.state.exists());
        // The lock is released even on failure.
        assert_eq!(fs::read_dir(&fx.paths.locks).unwrap().count(), 0);
    }

    #[test]
    fn busy_target_fails_before_any_work() {
        let fx = fixture();
        let target = fx.home.join("ws");
        let _held = PathLock::acquire(&fx.paths.locks, &target).unwrap();
        let orch = orchestrator(&fx, FakeVcs::new(), FakeRunner::new());

        let err = orch
            .run(&SetupRequest::express(URL, &target), &ProgressBar::hidden())
            .unwrap_err();

        assert!(matches!(err, SetupError::TargetBusy { .. }));
        assert!(orch.synchronizer().vcs().calls().is_empty());
        assert!(orch.provisioner().runner().calls().is_empty());
        assert!(!target.exists());
    }

    #[test]
    fn clone_into_foreign_directory_stops_early() {
        let fx = fixture();
        let target = fx.home.join("thesis");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("chapter1.tex"), "draft").unwrap();
        let orch = orchestrator(&fx, FakeVcs::new(), FakeRunner::new());

        let req = SetupRequest::clone_into(URL, &target);
        let err = orch.run(&req, &ProgressBar::hidden()).unwrap_err();

        assert!(matches!(err, SetupError::UnsafeTargetDirectory { .. }));
        assert!(orch.provisioner().runner().calls().is_empty());
        assert!(!fx.paths.state.exists());
    }

    #[test]
    fn clone_with_branch_reports_it() {
        let fx = fixture();
        let target = fx.home.join("ws");
        let orch = orchestrator(&fx, FakeVcs::new(), FakeRunner::new());
        let req = SetupRequest::clone_into(URL, &target)
            .with_branch(Some("analysis".into()))
            .with_shallow(true);

        let out = orch.run(&req, &ProgressBar::hidden()).unwrap();

        assert_eq!(out.branch_name.as_deref(), Some("analysis"));
        assert_eq!(
            orch.synchronizer().vcs().calls()[0],
            format!("clone {URL} {} depth=1", target.display())
        );
        assert!(saved(&fx).shallow);
    }

    #[test]
    fn existing_mode_skips_git_and_provisions() {
        let fx = fixture();
        let target = fx.home.join("mine");
        fs::create_dir_all(&target).unwrap();
        let orch = orchestrator(&fx, FakeVcs::new(), FakeRunner::new());

        let out = orch
            .run(&SetupRequest::existing(&target), &ProgressBar::hidden())
            .unwrap();

        assert_eq!(out.branch_name, None);
        assert!(orch.synchronizer().vcs().calls().is_empty());
        assert_eq!(orch.provisioner().runner().calls().len(), 2);
        let rec = saved(&fx);
        assert_eq!(rec.mode, SetupMode::Existing);
        assert_eq!(rec.repo_url, None);
    }

    #[test]
    fn existing_mode_requires_directory() {
        let fx = fixture();
        let orch = orchestrator(&fx, FakeVcs::new(), FakeRunner::new());
        let err = orch
            .run(
                &SetupRequest::existing(fx.home.join("nowhere")),
                &ProgressBar::hidden(),
            )
            .unwrap_err();
        assert!(matches!(err, SetupError::Io { .. }));
    }

    #[test]
    fn missing_url_is_a_clone_failure() {
        let fx = fixture();
        let orch = orchestrator(&fx, FakeVcs::new(), FakeRunner::new());
        let mut req = SetupRequest::clone_into("", fx.home.join("ws"));
        req.repo_url = None;
        let err = orch.run(&req, &ProgressBar::hidden()).unwrap_err();
        assert!(matches!(err, SetupError::CloneFailed { .. }));
    }

    #[test]
    fn local_targets_are_made_absolute() {
        let env = FixedEnv::new("/home/alice", Utc::now());

        let relative = resolve_target("notebooks/ws", &env, false).unwrap();
        assert!(relative.is_absolute());
        assert!(relative.ends_with("notebooks/ws"));

        assert_eq!(
            resolve_target("~/ws", &env, false).unwrap(),
            PathBuf::from("/home/alice/ws")
        );
        assert_eq!(
            resolve_target("notebooks/ws", &env, true).unwrap(),
            PathBuf::from("notebooks/ws")
        );
    }
}
