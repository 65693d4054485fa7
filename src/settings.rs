//! Project Settings File
//!
//! Writes the per-project configuration handed to the agent API client:
//! model strategy, file permission rules and the shell allowlist.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::permissions::{build_permission_scope, PermissionRules, ScopeError};
use crate::security::allowlist::allowed_program_names;

/// File name written inside the project directory
pub const SETTINGS_FILE_NAME: &str = ".harness_settings.json";

/// Model strategy used when none is given
pub const DEFAULT_MODEL: &str = "auto";

/// Errors that can occur while writing project settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Permission scope error: {0}")]
    Scope(#[from] ScopeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuritySettings {
    pub bash_allowlist: Vec<String>,
}

/// Contents of the project settings file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub model: String,
    pub permissions: PermissionRules,
    pub security: SecuritySettings,
}

impl ProjectSettings {
    pub fn new(project_dir: &Path, model: &str) -> Result<Self, SettingsError> {
        let scope = build_permission_scope(project_dir)?;
        Ok(Self {
            model: model.to_string(),
            permissions: scope.to_rules(),
            security: SecuritySettings {
                bash_allowlist: allowed_program_names()
                    .into_iter()
                    .map(String::from)
                    .collect(),
            },
        })
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Write `<project_dir>/.harness_settings.json`, creating the directory if needed
///
/// Returns the path of the written file.
pub fn write_settings(project_dir: &Path, model: &str) -> Result<PathBuf, SettingsError> {
    fs::create_dir_all(project_dir)?;

    let settings = ProjectSettings::new(project_dir, model)?;
    let path = project_dir.join(SETTINGS_FILE_NAME);
    let json = serde_json::to_string_pretty(&settings)?;
    fs::write(&path, json + "\n")?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::DefaultMode;
    use tempfile::TempDir;

    #[test]
    fn test_write_settings_creates_directory() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("nested/project");

        let path = write_settings(&project, DEFAULT_MODEL).unwrap();
        assert!(path.exists());
        assert_eq!(path.file_name().unwrap(), SETTINGS_FILE_NAME);

        let settings = ProjectSettings::load(&path).unwrap();
        assert_eq!(settings.model, "auto");
        assert_eq!(settings.permissions.default_mode, DefaultMode::AcceptEdits);
        assert!(settings.permissions.allow.contains(&"Bash(*)".to_string()));
    }

    #[test]
    fn test_settings_rules_use_canonical_root() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(dir.path(), "anthropic/claude-sonnet").unwrap();
        let settings = ProjectSettings::load(&path).unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();

        assert_eq!(settings.model, "anthropic/claude-sonnet");
        assert!(settings
            .permissions
            .allow
            .contains(&format!("Read({}/**)", root.display())));
    }

    #[test]
    fn test_settings_allowlist_matches_table() {
        let dir = TempDir::new().unwrap();
        let settings = ProjectSettings::new(dir.path(), DEFAULT_MODEL).unwrap();
        let allowlist = &settings.security.bash_allowlist;

        for program in ["ls", "cat", "npm", "node", "git", "ps", "lsof", "sleep", "pkill"] {
            assert!(allowlist.iter().any(|p| p == program), "{program} missing");
        }
        assert_eq!(allowlist.len(), allowed_program_names().len());
    }

    #[test]
    fn test_settings_json_keys() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(dir.path(), DEFAULT_MODEL).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();

        for key in ["model", "permissions", "security"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["permissions"]["defaultMode"], "acceptEdits");
        assert!(value["security"]["bash_allowlist"].is_array());
    }
}
