use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::error::SetupError;

/// Advisory per-target lock held for the duration of one setup.
///
/// The lock is a file under the locks directory, never inside the target,
/// so it does not make an empty target look non-empty. It is removed on
/// drop; a crashed run leaves it behind.
#[derive(Debug)]
pub struct PathLock {
    path: PathBuf,
}

impl PathLock {
    /// Lock `target`, keyed by its resolved path.
    ///
    /// The file is named after the SHA-256 of that path and holds the pid
    /// and the path itself.
    pub fn acquire(locks_dir: &Path, target: &Path) -> Result<Self, SetupError> {
        fs::create_dir_all(locks_dir).map_err(|e| SetupError::io(locks_dir, e))?;
        let resolved = resolve(target).map_err(|e| SetupError::io(target, e))?;
        let path = locks_dir.join(format!("{}.lock", key(&resolved)));

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SetupError::TargetBusy { lock: path });
            }
            Err(e) => return Err(SetupError::io(&path, e)),
        };
        let lock = Self { path };
        writeln!(file, "{}\n{}", std::process::id(), resolved.display())
            .map_err(|e| SetupError::io(&lock.path, e))?;
        debug!(
            lock = %lock.path.display(),
            target = %resolved.display(),
            "acquired target lock"
        );
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!(lock = %self.path.display(), error = %e, "could not remove lock");
        }
    }
}

/// Absolute form of `target` with `.`, `..` and trailing separators gone.
///
/// Symlinks are resolved in the longest prefix that exists, so the key
/// stays the same before and after the target is created.
fn resolve(target: &Path) -> io::Result<PathBuf> {
    let absolute = if target.is_absolute() {
        target.to_path_buf()
    } else {
        std::env::current_dir()?.join(target)
    };

    let mut normal = PathBuf::new();
    for part in absolute.components() {
        match part {
            Component::CurDir => {}
            Component::ParentDir => {
                normal.pop();
            }
            other => normal.push(other),
        }
    }
    for existing in normal.ancestors() {
        if let Ok(real) = fs::canonicalize(existing)
            && let Ok(rest) = normal.strip_prefix(existing)
        {
            return Ok(if rest.as_os_str().is_empty() {
                real
            } else {
                real.join(rest)
            });
        }
    }
    Ok(normal)
}

fn key(resolved: &Path) -> String {
    let digest = Sha256::digest(resolved.as_os_str().as_encoded_bytes());
    hex::encode(digest)
}
