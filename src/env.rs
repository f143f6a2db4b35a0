use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;

/// Access to process-wide state: environment variables, the home
/// directory and the wall clock.
///
/// Everything that would otherwise read `std::env` or `Utc::now()` goes
/// through this trait, so session branch names and install locations are
/// deterministic under test.
pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
    fn home_dir(&self) -> Option<PathBuf>;
    fn now(&self) -> DateTime<Utc>;

    /// Login name for session branches: `USER`, then `USERNAME`, then `"user"`.
    fn username(&self) -> String {
        self.var("USER")
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.var("USERNAME").filter(|s| !s.trim().is_empty()))
            .unwrap_or_else(|| "user".to_string())
    }
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Env for SystemEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        std::env::var_os("HOME")
            .filter(|h| !h.is_empty())
            .map(PathBuf::from)
            .or_else(dirs::home_dir)
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed values for tests and dry runs.
#[derive(Debug, Clone)]
pub struct FixedEnv {
    pub vars: HashMap<String, String>,
    pub home: Option<PathBuf>,
    pub now: DateTime<Utc>,
}

impl FixedEnv {
    pub fn new(home: impl Into<PathBuf>, now: DateTime<Utc>) -> Self {
        Self {
            vars: HashMap::new(),
            home: Some(home.into()),
            now,
        }
    }

    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }
}

impl Env for FixedEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.home.clone()
    }

    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}
