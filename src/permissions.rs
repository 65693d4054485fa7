//! Permission Scope
//!
//! Confines an agent session's file tools to one project directory.
//! Shell commands are granted wholesale here; gating them is the job of
//! [`crate::security::bash_security_hook`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while building a permission scope
#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("Cannot resolve relative project directory: {0}")]
    CurrentDir(#[from] std::io::Error),
}

/// How the agent API treats edits inside the scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum DefaultMode {
    /// Ask before every edit
    Default,
    /// Apply file edits without asking
    #[default]
    AcceptEdits,
    /// Read-only planning
    Plan,
}

impl fmt::Display for DefaultMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultMode::Default => write!(f, "default"),
            DefaultMode::AcceptEdits => write!(f, "acceptEdits"),
            DefaultMode::Plan => write!(f, "plan"),
        }
    }
}

/// Shell tool grant carried by a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BashPolicy {
    /// Every shell command reaches the security hook
    AllowAll,
}

/// File and tool capabilities granted to one agent session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionScope {
    pub read_roots: BTreeSet<PathBuf>,
    pub write_roots: BTreeSet<PathBuf>,
    pub edit_roots: BTreeSet<PathBuf>,
    pub glob_roots: BTreeSet<PathBuf>,
    pub grep_roots: BTreeSet<PathBuf>,
    pub bash_policy: BashPolicy,
    pub default_mode: DefaultMode,
}

/// Allow-rule form consumed by the agent API configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRules {
    pub allow: Vec<String>,
    #[serde(rename = "defaultMode")]
    pub default_mode: DefaultMode,
}

impl PermissionScope {
    /// Render the scope as `Tool(<root>/**)` allow rules plus `Bash(*)`
    pub fn allow_rules(&self) -> Vec<String> {
        let mut rules = Vec::new();
        let groups = [
            ("Read", &self.read_roots),
            ("Write", &self.write_roots),
            ("Edit", &self.edit_roots),
            ("Glob", &self.glob_roots),
            ("Grep", &self.grep_roots),
        ];
        for (tool, roots) in groups {
            for root in roots {
                rules.push(format!("{}({}/**)", tool, root.display()));
            }
        }
        match self.bash_policy {
            BashPolicy::AllowAll => rules.push("Bash(*)".to_string()),
        }
        rules
    }

    pub fn to_rules(&self) -> PermissionRules {
        PermissionRules {
            allow: self.allow_rules(),
            default_mode: self.default_mode,
        }
    }
}

/// Build the permission scope for a project directory
///
/// Every file-tool rule is rooted at the absolute, canonical form of
/// `project_dir`, whether it was given relative or absolute. The directory
/// does not have to exist yet.
pub fn build_permission_scope(project_dir: &Path) -> Result<PermissionScope, ScopeError> {
    let root = resolve_project_dir(project_dir)?;
    let roots: BTreeSet<PathBuf> = BTreeSet::from([root]);

    Ok(PermissionScope {
        read_roots: roots.clone(),
        write_roots: roots.clone(),
        edit_roots: roots.clone(),
        glob_roots: roots.clone(),
        grep_roots: roots,
        bash_policy: BashPolicy::AllowAll,
        default_mode: DefaultMode::AcceptEdits,
    })
}

/// Resolve a project directory to an absolute, canonical path
///
/// The path is made absolute against the current directory, then walked
/// component by component. While the walk stays on existing entries each
/// step is canonicalized, so symlinks are followed before any `..` is
/// applied. Once an entry is missing the rest is applied lexically.
pub fn resolve_project_dir(project_dir: &Path) -> Result<PathBuf, ScopeError> {
    let absolute = if project_dir.is_absolute() {
        project_dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(project_dir)
    };

    let mut resolved = PathBuf::new();
    let mut on_disk = true;
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                resolved.push(component.as_os_str());
            }
            Component::CurDir => {}
            // `resolved` is canonical while on disk, so its parent is the real one
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                if on_disk {
                    match fs::canonicalize(&resolved) {
                        Ok(canonical) => resolved = canonical,
                        Err(_) => on_disk = false,
                    }
                }
            }
        }
    }

    Ok(resolved)
}
