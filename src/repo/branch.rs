use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

use crate::env::Env;
use crate::git::{Vcs, VcsError};

/// Default branches in priority order when nothing names one explicitly.
pub const CANDIDATE_BRANCHES: [&str; 4] = ["next", "main", "master", "develop"];

/// Used when every detection strategy comes up empty.
pub const FALLBACK_BRANCH: &str = "main";

static SESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+-session-\d{8}-\d{6}$").unwrap());

type Attempt<'a> = Box<dyn Fn() -> Result<Option<String>, VcsError> + 'a>;

/// Work out which branch `remote` considers its default.
///
/// Strategies are tried in order and the first non-empty answer wins:
/// 1. `refs/remotes/<remote>/HEAD`
/// 2. the HEAD branch advertised by the remote itself
/// 3. remote-tracking branches matched against [`CANDIDATE_BRANCHES`]
/// 4. local branches matched against [`CANDIDATE_BRANCHES`]
///
/// Errors inside a strategy only move on to the next one. If all of them
/// fail the result is [`FALLBACK_BRANCH`]; this function never fails.
pub fn detect_default_branch<V: Vcs + ?Sized>(vcs: &V, path: &Path, remote: &str) -> String {
    let prefix = format!("{remote}/");
    let attempts: [(&str, Attempt<'_>); 4] = [
        (
            "symbolic ref",
            Box::new(|| vcs.symbolic_remote_head(path, remote)),
        ),
        (
            "remote HEAD",
            Box::new(|| vcs.remote_advertised_head(path, remote)),
        ),
        (
            "remote branches",
            Box::new(|| {
                let names = vcs.list_remote_branches(path)?;
                Ok(pick_candidate(
                    names.iter().filter_map(|b| b.strip_prefix(prefix.as_str())),
                ))
            }),
        ),
        (
            "local branches",
            Box::new(|| {
                let names = vcs.list_local_branches(path)?;
                Ok(pick_candidate(names.iter().map(String::as_str)))
            }),
        ),
    ];

    for (strategy, attempt) in &attempts {
        match attempt() {
            Ok(Some(branch)) if !branch.is_empty() => {
                debug!(strategy, %branch, "default branch detected");
                return branch;
            }
            Ok(_) => debug!(strategy, "no default branch from strategy"),
            Err(e) => debug!(strategy, error = %e, "default branch strategy failed"),
        }
    }

    debug!(branch = FALLBACK_BRANCH, "falling back to default branch");
    FALLBACK_BRANCH.to_string()
}

fn pick_candidate<'a>(names: impl Iterator<Item = &'a str>) -> Option<String> {
    let present: Vec<&str> = names.collect();
    CANDIDATE_BRANCHES
        .iter()
        .find(|c| present.contains(c))
        .map(|c| c.to_string())
}

/// Name for a fresh working branch: `<user>-session-<YYYYMMDD>-<HHMMSS>` (UTC).
///
/// Two calls within the same second for the same user produce the same
/// name; creating the second branch then fails.
pub fn session_branch_name(env: &impl Env) -> String {
    let user = sanitize_user(&env.username());
    format!("{user}-session-{}", env.now().format("%Y%m%d-%H%M%S"))
}

/// `true` for names produced by [`session_branch_name`].
pub fn is_session_branch(name: &str) -> bool {
    SESSION_RE.is_match(name)
}

// Keep the user part a single valid ref component.
fn sanitize_user(raw: &str) -> String {
    let mapped: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_whitespace() || c.is_control() || "~^:?*[\\/{".contains(c) {
                '-'
            } else {
                c
            }
        })
        .collect();
    let cleaned = mapped
        .replace("..", "-")
        .trim_matches(|c| c == '.' || c == '-')
        .to_string();
    if cleaned.is_empty() {
        "user".to_string()
    } else {
        cleaned
    }
}
