use anyhow::Result;
use colored::Colorize;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::env::{Env, SystemEnv};
use crate::git::{Git2Vcs, Vcs};
use crate::paths::paths;
use crate::repo::branch::is_session_branch;
use crate::settings::{RepoEntry, load_settings};

/// State of a registry repository's target directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoStatus {
    /// Not a checkout yet; express setup will download it.
    Missing,
    Ready,
    /// A checkout with untracked files, which a refresh keeps.
    HasChanges { untracked: usize },
}

/// Classify `dir`. A failing untracked-file probe is logged and treated
/// as [`RepoStatus::Ready`].
pub fn repo_status<V: Vcs + ?Sized>(vcs: &V, dir: &Path) -> RepoStatus {
    if !vcs.is_repository(dir) {
        return RepoStatus::Missing;
    }
    match vcs.untracked_count(dir) {
        Ok(0) => RepoStatus::Ready,
        Ok(untracked) => RepoStatus::HasChanges { untracked },
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "could not count untracked files");
            RepoStatus::Ready
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub entry: RepoEntry,
    pub target: PathBuf,
    pub status: RepoStatus,
    pub branch: Option<String>,
}

/// Status of every entry, evaluated in parallel. Order follows `entries`.
pub fn collect_statuses<V: Vcs + Sync + ?Sized>(
    vcs: &V,
    entries: &[RepoEntry],
    env: &impl Env,
) -> Vec<StatusLine> {
    let targets: Vec<(RepoEntry, PathBuf)> = entries
        .iter()
        .map(|e| (e.clone(), e.target_path(env)))
        .collect();

    targets
        .into_par_iter()
        .map(|(entry, target)| {
            let status = repo_status(vcs, &target);
            let branch = match status {
                RepoStatus::Missing => None,
                _ => vcs.current_branch(&target).ok().flatten(),
            };
            StatusLine {
                entry,
                target,
                status,
                branch,
            }
        })
        .collect()
}

/// Plain-text summary shown next to a repository.
pub fn describe(status: RepoStatus) -> String {
    match status {
        RepoStatus::Ready => "ready, no unsaved work".to_string(),
        RepoStatus::HasChanges { untracked: 1 } => {
            "1 untracked file, it will be preserved".to_string()
        }
        RepoStatus::HasChanges { untracked } => {
            format!("{untracked} untracked files, these will be preserved")
        }
        RepoStatus::Missing => "not downloaded, will download on first use".to_string(),
    }
}

fn render(line: &StatusLine) -> String {
    let summary = describe(line.status);
    let summary = match line.status {
        RepoStatus::Ready => summary.green(),
        RepoStatus::HasChanges { .. } => summary.truecolor(249, 115, 22),
        RepoStatus::Missing => summary.bright_black(),
    };
    let mut out = format!(
        "{} ({})\n    {}  {}",
        line.entry.display().bold(),
        line.entry.id,
        line.target.display(),
        summary
    );
    if let Some(branch) = &line.branch {
        let marker = if is_session_branch(branch) {
            " (session)".dimmed().to_string()
        } else {
            String::new()
        };
        out.push_str(&format!("\n    branch: {}{marker}", branch.cyan()));
    }
    if let Some(desc) = &line.entry.description {
        out.push_str(&format!("\n    {}", desc.dimmed()));
    }
    out
}

/// `orion status`: one line per registry repository.
pub fn cmd_status() -> Result<()> {
    let env = SystemEnv;
    let p = paths(&env)?;
    let settings = load_settings(&p.settings)?;

    for line in collect_statuses(&Git2Vcs, &settings.repositories, &env) {
        println!("{}", render(&line));
    }
    Ok(())
}
