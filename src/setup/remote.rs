//! Shell rendition of a setup for hosts orion does not run on.
//!
//! The script does what [`super::Orchestrator`] does, with plain `git`,
//! `curl` and `pixi`, so it can be pasted into a remote terminal.

use std::fmt::Write as _;

use super::{SetupMode, SetupRequest};
use crate::repo::DEFAULT_REMOTE;
use crate::repo::branch::{CANDIDATE_BRANCHES, FALLBACK_BRANCH};
use crate::settings::ManagerSettings;

// Same rules as the local session name: one ref component, no leading or
// trailing `.` or `-`, `user` when nothing is left.
const SESSION_USER_SH: &str = r#"SESSION_USER=$(printf '%s' "${USER:-${USERNAME:-user}}" | tr -c 'A-Za-z0-9._-' '-' | sed -e 's/\.\./-/g' -e 's/^[.-]*//' -e 's/[.-]*$//')
SESSION_USER=${SESSION_USER:-user}
"#;

/// Everything the script needs, as the user wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPlan {
    pub mode: SetupMode,
    /// Target as given; a leading `~/` is resolved on the remote host.
    pub target_dir: String,
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub shallow: bool,
    pub install_url: String,
    pub install_sha256: Option<String>,
    pub shell: String,
    pub open_command: Option<String>,
}

impl ScriptPlan {
    pub fn new(
        req: &SetupRequest,
        target_dir: &str,
        manager: &ManagerSettings,
        open_command: Option<&str>,
    ) -> Self {
        Self {
            mode: req.mode,
            target_dir: target_dir.to_string(),
            repo_url: req.repo_url.clone(),
            branch: req.branch.clone(),
            shallow: req.shallow,
            install_url: manager.install_url.clone(),
            install_sha256: manager.install_sha256.clone(),
            shell: manager.shell.clone(),
            open_command: open_command.map(str::to_string),
        }
    }
}

/// Single-quote `s` for POSIX shells.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

// `~` and `~/rest` become `"$HOME"` based; everything else is quoted as-is.
fn quote_target(s: &str) -> String {
    match s.strip_prefix('~') {
        Some("") => "\"$HOME\"".to_string(),
        Some(rest) if rest.starts_with('/') => format!("\"$HOME\"{}", shell_quote(rest)),
        _ => shell_quote(s),
    }
}

/// Render the bash script for `plan`.
pub fn render_script(plan: &ScriptPlan) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "#!/usr/bin/env bash");
    let _ = writeln!(
        s,
        "# orion {}: {:?} setup",
        env!("CARGO_PKG_VERSION"),
        plan.mode
    );
    s.push_str("set -eo pipefail\n\n");
    s.push_str("warn() { printf 'warning: %s\\n' \"$*\" >&2; }\n");
    let _ = writeln!(s, "TARGET={}", quote_target(&plan.target_dir));
    if let Some(url) = &plan.repo_url {
        let _ = writeln!(s, "REPO_URL={}", shell_quote(url));
    }
    s.push('\n');

    match plan.mode {
        SetupMode::Existing => {
            s.push_str("if [ ! -d \"$TARGET\" ]; then\n");
            s.push_str("  echo \"error: $TARGET is not a directory\" >&2\n");
            s.push_str("  exit 1\n");
            s.push_str("fi\n");
        }
        SetupMode::Clone => {
            push_clone(&mut s, plan.shallow);
            if let Some(branch) = &plan.branch {
                let b = shell_quote(branch);
                let _ = writeln!(
                    s,
                    "git -C \"$TARGET\" checkout -b {b} 2>/dev/null || git -C \"$TARGET\" checkout {b} || warn \"could not check out branch\" {b}"
                );
            }
        }
        SetupMode::Express => {
            s.push_str("if [ -d \"$TARGET/.git\" ]; then\n");
            s.push_str("  cd \"$TARGET\"\n");
            let _ = writeln!(s, "  git fetch {DEFAULT_REMOTE}");
            push_detect_branch(&mut s);
            s.push_str("  git checkout -f \"$BRANCH\"\n");
            let _ = writeln!(s, "  git pull --ff-only {DEFAULT_REMOTE} \"$BRANCH\"");
            s.push_str("else\n");
            let mut clone = String::new();
            push_clone(&mut clone, false);
            for line in clone.lines() {
                let _ = writeln!(s, "  {line}");
            }
            s.push_str("  cd \"$TARGET\"\n");
            s.push_str("fi\n");
            s.push_str(SESSION_USER_SH);
            s.push_str(
                "git checkout -b \"${SESSION_USER}-session-$(date -u +%Y%m%d-%H%M%S)\"\n",
            );
        }
    }
    s.push('\n');

    push_pixi(&mut s, plan);

    if let Some(cmd) = &plan.open_command {
        let words: Vec<String> = cmd.split_whitespace().map(shell_quote).collect();
        if !words.is_empty() {
            let _ = writeln!(
                s,
                "{} \"$TARGET\" || warn \"could not open workspace\"",
                words.join(" ")
            );
        }
    }
    s.push_str("echo \"workspace ready: $TARGET\"\n");
    s
}

fn push_clone(s: &mut String, shallow: bool) {
    let depth = if shallow { " --depth 1" } else { "" };
    let _ = writeln!(s, "if [ ! -e \"$TARGET\" ]; then");
    s.push_str("  mkdir -p \"$TARGET\"\n");
    let _ = writeln!(s, "  git clone{depth} \"$REPO_URL\" \"$TARGET\"");
    s.push_str("elif [ -d \"$TARGET/.git\" ]; then\n");
    s.push_str("  echo \"$TARGET is already a git repository, skipping clone\"\n");
    s.push_str("elif [ -d \"$TARGET\" ] && [ -z \"$(ls -A \"$TARGET\")\" ]; then\n");
    let _ = writeln!(s, "  git clone{depth} \"$REPO_URL\" \"$TARGET\"");
    s.push_str("else\n");
    s.push_str(
        "  echo \"error: $TARGET exists, is not empty, and is not a git repository\" >&2\n",
    );
    s.push_str("  exit 1\n");
    s.push_str("fi\n");
}

fn push_detect_branch(s: &mut String) {
    let remote = DEFAULT_REMOTE;
    let candidates = CANDIDATE_BRANCHES.join(" ");
    let _ = writeln!(
        s,
        "  BRANCH=$(git symbolic-ref --quiet --short refs/remotes/{remote}/HEAD 2>/dev/null | sed 's@^{remote}/@@' || true)"
    );
    s.push_str("  if [ -z \"$BRANCH\" ]; then\n");
    let _ = writeln!(
        s,
        "    BRANCH=$(git remote show {remote} 2>/dev/null | sed -n 's/.*HEAD branch: //p' || true)"
    );
    s.push_str("  fi\n");
    s.push_str("  if [ \"$BRANCH\" = \"(unknown)\" ]; then BRANCH=\"\"; fi\n");
    for refs in [format!("refs/remotes/{remote}"), "refs/heads".to_string()] {
        s.push_str("  if [ -z \"$BRANCH\" ]; then\n");
        let _ = writeln!(s, "    for b in {candidates}; do");
        let _ = writeln!(
            s,
            "      if git show-ref --verify --quiet \"{refs}/$b\"; then BRANCH=$b; break; fi"
        );
        s.push_str("    done\n");
        s.push_str("  fi\n");
    }
    let _ = writeln!(s, "  BRANCH=${{BRANCH:-{FALLBACK_BRANCH}}}");
}

fn push_pixi(s: &mut String, plan: &ScriptPlan) {
    s.push_str("PIXI=\"$HOME/.pixi/bin/pixi\"\n");
    s.push_str("if [ ! -x \"$PIXI\" ]; then\n");
    s.push_str("  if command -v pixi >/dev/null 2>&1; then\n");
    s.push_str("    PIXI=pixi\n");
    s.push_str("  else\n");
    s.push_str("    echo \"installing pixi\"\n");
    let url = shell_quote(&plan.install_url);
    let shell = shell_quote(&plan.shell);
    match plan.install_sha256.as_deref().map(str::trim) {
        Some(sha) => {
            s.push_str("    SCRIPT=$(mktemp)\n");
            let _ = writeln!(s, "    curl -fsSL {url} -o \"$SCRIPT\"");
            let _ = writeln!(
                s,
                "    printf '%s  %s\\n' {} \"$SCRIPT\" | sha256sum -c -",
                shell_quote(&sha.to_ascii_lowercase())
            );
            let _ = writeln!(s, "    {shell} \"$SCRIPT\"");
            s.push_str("    rm -f \"$SCRIPT\"\n");
        }
        None => {
            let _ = writeln!(s, "    curl -fsSL {url} | {shell}");
        }
    }
    s.push_str("  fi\n");
    s.push_str("fi\n");
    s.push_str("export PATH=\"$HOME/.pixi/bin:$PATH\"\n");
    s.push_str(
        "(cd \"$TARGET\" && \"$PIXI\" install) || warn \"pixi install failed; run it again in $TARGET\"\n",
    );
}
