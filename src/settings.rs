use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::env::Env;
use crate::error::SetupError;
use crate::paths::expand_tilde;

pub const DEFAULT_INSTALL_URL: &str = "https://pixi.sh/install.sh";

/// Top-level settings loaded from `settings.toml`.
///
/// Every section is optional; a missing file means all defaults, including
/// a registry with the neutron-imaging notebook repository.
///
/// Example TOML:
/// ```toml
/// [manager]
/// install_url = "https://pixi.sh/install.sh"
/// shell = "bash"
///
/// [workspace]
/// open_command = "code"
///
/// [[repositories]]
/// id = "python-notebooks"
/// display_name = "Python Notebooks"
/// url = "https://github.com/neutronimaging/python_notebooks"
/// target_dir = "~/orion_notebooks"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub manager: ManagerSettings,
    pub workspace: WorkspaceSettings,
    pub repositories: Vec<RepoEntry>,
    /// File these settings came from, named in lookup errors.
    #[serde(skip)]
    pub source: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            manager: ManagerSettings::default(),
            workspace: WorkspaceSettings::default(),
            repositories: vec![RepoEntry::python_notebooks()],
            source: PathBuf::from("settings.toml"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ManagerSettings {
    /// Published pixi install script.
    pub install_url: String,
    /// Shell that runs the install script.
    pub shell: String,
    /// Expected SHA-256 (hex) of the install script. When set, a script
    /// with any other digest is refused.
    pub install_sha256: Option<String>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            install_url: DEFAULT_INSTALL_URL.to_string(),
            shell: "bash".to_string(),
            install_sha256: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkspaceSettings {
    /// Editor command that opens a finished workspace, e.g. `code`.
    pub open_command: Option<String>,
}

/// A notebook repository the user can set up with one command.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RepoEntry {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub url: String,
    pub target_dir: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl RepoEntry {
    fn python_notebooks() -> Self {
        Self {
            id: "python-notebooks".to_string(),
            display_name: Some("Python Notebooks".to_string()),
            url: "https://github.com/neutronimaging/python_notebooks".to_string(),
            target_dir: "~/orion_notebooks".to_string(),
            description: Some("Neutron imaging Jupyter notebooks".to_string()),
        }
    }

    pub fn display(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    pub fn target_path(&self, env: &impl Env) -> PathBuf {
        expand_tilde(&self.target_dir, env)
    }
}

impl Settings {
    /// Registry entry by id, or the first entry when `id` is `None`.
    pub fn repository(&self, id: Option<&str>) -> Result<&RepoEntry, SetupError> {
        let found = match id {
            Some(id) => self.repositories.iter().find(|r| r.id == id),
            None => self.repositories.first(),
        };
        found.ok_or_else(|| SetupError::Settings {
            path: self.source.clone(),
            reason: match id {
                Some(id) => format!("unknown repository id: {id}"),
                None => "no repositories configured".to_string(),
            },
        })
    }

    fn validate(&self, path: &Path) -> Result<(), SetupError> {
        let invalid = |reason: String| SetupError::Settings {
            path: path.to_path_buf(),
            reason,
        };
        if self.repositories.is_empty() {
            return Err(invalid("[[repositories]] is empty".into()));
        }
        let mut seen = HashSet::new();
        for r in &self.repositories {
            if r.url.trim().is_empty() || r.target_dir.trim().is_empty() {
                let reason = format!("repository {} needs url and target_dir", r.id);
                return Err(invalid(reason));
            }
            if !seen.insert(r.id.as_str()) {
                return Err(invalid(format!("duplicate repository id: {}", r.id)));
            }
        }
        Ok(())
    }
}

/// Load and validate `settings.toml`.
///
/// # Errors
/// - The file exists but cannot be read or parsed.
/// - The registry is empty, has duplicate ids, or entries without a url
///   or target directory.
pub fn load_settings(path: &Path) -> Result<Settings, SetupError> {
    let txt = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(Settings {
                source: path.to_path_buf(),
                ..Settings::default()
            });
        }
        Err(e) => return Err(SetupError::io(path, e)),
    };
    let mut settings: Settings = toml::from_str(&txt).map_err(|e| SetupError::Settings {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    settings.source = path.to_path_buf();
    settings.validate(path)?;
    Ok(settings)
}
