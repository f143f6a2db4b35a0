use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{CloneOptions, Vcs, VcsError};

/// In-memory [`Vcs`] that records every call.
///
/// Operations listed in `fail` return an error; names match the entries
/// written to `calls` (`clone`, `fetch`, `checkout`, ...).
#[derive(Default)]
pub struct FakeVcs {
    state: Mutex<FakeState>,
}

#[derive(Default)]
pub struct FakeState {
    pub repos: HashSet<PathBuf>,
    pub calls: Vec<String>,
    pub fail: HashSet<&'static str>,
    pub local_branches: Vec<String>,
    pub remote_branches: Vec<String>,
    pub symbolic_head: Option<String>,
    pub advertised_head: Option<String>,
    pub current: Option<String>,
    pub untracked: usize,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(op))
            .count()
    }

    pub fn current(&self) -> Option<String> {
        self.state.lock().unwrap().current.clone()
    }

    fn record(&self, op: &'static str, detail: String) -> Result<(), VcsError> {
        let mut s = self.state.lock().unwrap();
        let call = format!("{op} {detail}");
        s.calls.push(call.trim_end().to_string());
        if s.fail.contains(op) {
            return Err(VcsError::Message(format!("{op} failed")));
        }
        Ok(())
    }
}

impl Vcs for FakeVcs {
    fn clone_repo(&self, url: &str, dest: &Path, opts: &CloneOptions) -> Result<(), VcsError> {
        let depth = match opts.depth {
            Some(d) => format!(" depth={d}"),
            None => String::new(),
        };
        self.record("clone", format!("{url} {}{depth}", dest.display()))?;
        fs::create_dir_all(dest.join(".git")).map_err(|e| VcsError::Message(e.to_string()))?;
        let mut s = self.state.lock().unwrap();
        s.repos.insert(dest.to_path_buf());
        if s.local_branches.is_empty() {
            s.local_branches.push("main".into());
        }
        s.current = Some("main".into());
        Ok(())
    }

    fn is_repository(&self, path: &Path) -> bool {
        self.state.lock().unwrap().repos.contains(path)
    }

    fn fetch(&self, _path: &Path, remote: &str) -> Result<(), VcsError> {
        self.record("fetch", remote.to_string())
    }

    fn checkout(&self, _path: &Path, branch: &str, force: bool) -> Result<(), VcsError> {
        self.record("checkout", format!("{branch} force={force}"))?;
        self.state.lock().unwrap().current = Some(branch.to_string());
        Ok(())
    }

    fn pull(&self, _path: &Path, remote: &str, branch: &str) -> Result<(), VcsError> {
        self.record("pull", format!("{remote} {branch}"))
    }

    fn create_and_switch_branch(&self, _path: &Path, name: &str) -> Result<(), VcsError> {
        self.record("create_branch", name.to_string())?;
        let mut s = self.state.lock().unwrap();
        if s.local_branches.iter().any(|b| b == name) {
            return Err(VcsError::Message(format!("branch {name} already exists")));
        }
        s.local_branches.push(name.to_string());
        s.current = Some(name.to_string());
        Ok(())
    }

    fn switch_branch(&self, _path: &Path, name: &str) -> Result<(), VcsError> {
        self.record("switch_branch", name.to_string())?;
        let mut s = self.state.lock().unwrap();
        if !s.local_branches.iter().any(|b| b == name) {
            return Err(VcsError::Message(format!("no branch {name}")));
        }
        s.current = Some(name.to_string());
        Ok(())
    }

    fn symbolic_remote_head(
        &self,
        _path: &Path,
        _remote: &str,
    ) -> Result<Option<String>, VcsError> {
        self.record("symbolic_head", String::new())?;
        Ok(self.state.lock().unwrap().symbolic_head.clone())
    }

    fn remote_advertised_head(
        &self,
        _path: &Path,
        _remote: &str,
    ) -> Result<Option<String>, VcsError> {
        self.record("advertised_head", String::new())?;
        Ok(self.state.lock().unwrap().advertised_head.clone())
    }

    fn list_remote_branches(&self, _path: &Path) -> Result<Vec<String>, VcsError> {
        self.record("list_remote", String::new())?;
        Ok(self.state.lock().unwrap().remote_branches.clone())
    }

    fn list_local_branches(&self, _path: &Path) -> Result<Vec<String>, VcsError> {
        self.record("list_local", String::new())?;
        Ok(self.state.lock().unwrap().local_branches.clone())
    }

    fn current_branch(&self, _path: &Path) -> Result<Option<String>, VcsError> {
        Ok(self.state.lock().unwrap().current.clone())
    }

    fn untracked_count(&self, _path: &Path) -> Result<usize, VcsError> {
        self.record("untracked", String::new())?;
        Ok(self.state.lock().unwrap().untracked)
    }
}
