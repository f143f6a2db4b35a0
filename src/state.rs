use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::SetupError;

/// How a workspace was set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SetupMode {
    /// Use a directory as-is.
    Existing,
    /// Clone a repository into a chosen directory.
    Clone,
    /// One-click setup of a registry repository with a session branch.
    Express,
}

/// The last completed setup, stored as `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupRecord {
    pub mode: SetupMode,
    pub target_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    pub setup_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub shallow: bool,
}

/// Write `record` to `path`, replacing any previous one.
///
/// The JSON goes to a temp file in the same directory first and is then
/// renamed over the old file.
pub fn save_record(path: &Path, record: &SetupRecord) -> Result<(), SetupError> {
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(|e| SetupError::io(dir, e))?;

    let json = serde_json::to_string_pretty(record)
        .map_err(|e| SetupError::io(path, io::Error::other(e)))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| SetupError::io(dir, e))?;
    writeln!(tmp, "{json}").map_err(|e| SetupError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| SetupError::io(path, e.error))?;
    debug!(path = %path.display(), "saved setup record");
    Ok(())
}

/// Target directory of the last setup, if the state file names one.
///
/// Only `targetDir` is looked at; a missing or unreadable file, or one
/// where that field is not a non-empty string, yields `None`.
pub fn last_target_dir(path: &Path) -> Option<PathBuf> {
    let txt = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no setup record");
            return None;
        }
    };
    let value: serde_json::Value = match serde_json::from_str(&txt) {
        Ok(v) => v,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "unreadable setup record");
            return None;
        }
    };
    value
        .get("targetDir")
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn record() -> SetupRecord {
        SetupRecord {
            mode: SetupMode::Express,
            target_dir: PathBuf::from("/home/alice/orion_notebooks"),
            branch_name: Some("alice-session-20240101-120000".into()),
            setup_date: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            repo_url: Some("https://github.com/neutronimaging/python_notebooks".into()),
            shallow: false,
        }
    }

    #[test]
    fn record_uses_camel_case_keys() {
        let td = tempdir().unwrap();
        let p = td.path().join("nested").join("config.json");
        save_record(&p, &record()).unwrap();

        let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&p).unwrap()).unwrap();
        assert_eq!(v["mode"], "EXPRESS");
        assert_eq!(v["targetDir"], "/home/alice/orion_notebooks");
        assert_eq!(v["branchName"], "alice-session-20240101-120000");
        assert_eq!(v["setupDate"], "2024-01-01T12:00:00Z");
        assert_eq!(v["shallow"], false);

        let back: SetupRecord = serde_json::from_value(v).unwrap();
        assert_eq!(back, record());
    }

    #[test]
    fn existing_mode_omits_repository_fields() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.json");
        let rec = SetupRecord {
            mode: SetupMode::Existing,
            branch_name: None,
            repo_url: None,
            ..record()
        };
        save_record(&p, &rec).unwrap();
        let txt = fs::read_to_string(&p).unwrap();
        assert!(txt.contains("\"EXISTING\""));
        assert!(!txt.contains("repoUrl"));
        assert!(!txt.contains("branchName"));
    }

    #[test]
    fn save_replaces_previous_record() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.json");
        save_record(&p, &record()).unwrap();
        let rec = SetupRecord {
            target_dir: PathBuf::from("/data/other"),
            ..record()
        };
        save_record(&p, &rec).unwrap();
        assert_eq!(last_target_dir(&p), Some(PathBuf::from("/data/other")));
    }

    #[test]
    fn last_target_dir_only_checks_that_field() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.json");
        assert_eq!(last_target_dir(&p), None);

        fs::write(&p, "not json").unwrap();
        assert_eq!(last_target_dir(&p), None);

        fs::write(&p, r#"{"targetDir": ""}"#).unwrap();
        assert_eq!(last_target_dir(&p), None);

        fs::write(&p, r#"{"targetDir": 42}"#).unwrap();
        assert_eq!(last_target_dir(&p), None);

        fs::write(&p, r#"{"targetDir": "/ws", "mode": "SOMETHING-ELSE"}"#).unwrap();
        assert_eq!(last_target_dir(&p), Some(PathBuf::from("/ws")));
    }
}
