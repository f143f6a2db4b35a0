use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};

use crate::env::Env;

#[derive(Debug, Clone)]
pub struct Paths {
    pub home: PathBuf,
    pub state: PathBuf,
    pub settings: PathBuf,
    pub locks: PathBuf,
}

/// Per-user directory for orion's own files.
///
/// `$ORION_HOME` wins when set; otherwise `~/.orion-studio`.
pub fn orion_home(env: &impl Env) -> Result<PathBuf> {
    if let Some(dir) = env.var("ORION_HOME").filter(|s| !s.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = env
        .home_dir()
        .ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".orion-studio"))
}

pub fn paths(env: &impl Env) -> Result<Paths> {
    let home = orion_home(env)?;
    Ok(Paths {
        state: home.join("config.json"),
        settings: home.join("settings.toml"),
        locks: home.join("locks"),
        home,
    })
}

/// Expand a leading `~` against the accessor's home directory.
pub fn expand_tilde(path: &str, env: &impl Env) -> PathBuf {
    let home = env.home_dir();
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(h)) => h,
        (Some(rest), Some(h)) if rest.starts_with('/') => h.join(rest.trim_start_matches('/')),
        _ => PathBuf::from(path),
    }
}

/// Turn a relative target into an absolute one without touching the disk.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::FixedEnv;
    use chrono::Utc;

    #[test]
    fn orion_home_defaults_under_home() {
        let env = FixedEnv::new("/home/alice", Utc::now());
        let p = paths(&env).unwrap();
        assert_eq!(p.home, PathBuf::from("/home/alice/.orion-studio"));
        assert_eq!(
            p.state,
            PathBuf::from("/home/alice/.orion-studio/config.json")
        );
        assert_eq!(p.locks, PathBuf::from("/home/alice/.orion-studio/locks"));
    }

    #[test]
    fn orion_home_honours_override() {
        let env = FixedEnv::new("/home/alice", Utc::now()).with_var("ORION_HOME", "/srv/orion");
        assert_eq!(orion_home(&env).unwrap(), PathBuf::from("/srv/orion"));
    }

    #[test]
    fn expand_tilde_variants() {
        let env = FixedEnv::new("/home/alice", Utc::now());
        assert_eq!(expand_tilde("~", &env), PathBuf::from("/home/alice"));
        assert_eq!(
            expand_tilde("~/orion_notebooks", &env),
            PathBuf::from("/home/alice/orion_notebooks")
        );
        assert_eq!(expand_tilde("~bob/x", &env), PathBuf::from("~bob/x"));
        assert_eq!(expand_tilde("/abs/dir", &env), PathBuf::from("/abs/dir"));
    }
}
