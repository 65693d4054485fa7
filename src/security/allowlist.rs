//! Allowed Commands Table
//!
//! The process-wide set of programs an agent may run at all. A few entries
//! are allowed only after an argument-aware policy accepts the invocation.

use serde::Serialize;
use std::fmt;

use super::policies::{
    validate_chmod_command, validate_init_script, validate_pkill_command, PolicyVerdict,
};

/// Secondary validation attached to an allowlist entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validation {
    /// Allowed on program name alone
    Standard,
    /// Process termination, restricted to dev-server processes
    ProcessKill,
    /// Permission change, restricted to adding execute bits
    PermissionChange,
    /// Project init script, restricted to direct path execution
    InitScript,
}

impl Validation {
    /// Whether the program needs a policy check beyond the name match
    pub fn requires_extra_validation(self) -> bool {
        !matches!(self, Validation::Standard)
    }

    /// Run the policy for this entry against the invoking pipe stage
    pub fn check(self, stage: &str) -> PolicyVerdict {
        match self {
            Validation::Standard => PolicyVerdict::allow(),
            Validation::ProcessKill => validate_pkill_command(stage),
            Validation::PermissionChange => validate_chmod_command(stage),
            Validation::InitScript => validate_init_script(stage),
        }
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validation::Standard => write!(f, "standard"),
            Validation::ProcessKill => write!(f, "process_kill"),
            Validation::PermissionChange => write!(f, "permission_change"),
            Validation::InitScript => write!(f, "init_script"),
        }
    }
}

/// A permitted program name and the validation it carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllowlistEntry {
    pub program: &'static str,
    pub validation: Validation,
}

const fn entry(program: &'static str, validation: Validation) -> AllowlistEntry {
    AllowlistEntry {
        program,
        validation,
    }
}

/// Programs the agent may invoke
pub const ALLOWED_COMMANDS: &[AllowlistEntry] = &[
    // File inspection
    entry("ls", Validation::Standard),
    entry("cat", Validation::Standard),
    entry("head", Validation::Standard),
    entry("tail", Validation::Standard),
    entry("wc", Validation::Standard),
    entry("grep", Validation::Standard),
    // File operations
    entry("cp", Validation::Standard),
    entry("mkdir", Validation::Standard),
    entry("chmod", Validation::PermissionChange),
    // Directory
    entry("pwd", Validation::Standard),
    // Node.js development
    entry("npm", Validation::Standard),
    entry("node", Validation::Standard),
    entry("npx", Validation::Standard),
    // Version control
    entry("git", Validation::Standard),
    // Process management
    entry("ps", Validation::Standard),
    entry("lsof", Validation::Standard),
    entry("sleep", Validation::Standard),
    entry("pkill", Validation::ProcessKill),
    // Project bootstrap
    entry("init.sh", Validation::InitScript),
];

/// Look up the table entry for a program name
pub fn lookup(program: &str) -> Option<&'static AllowlistEntry> {
    ALLOWED_COMMANDS.iter().find(|e| e.program == program)
}

pub fn is_allowed(program: &str) -> bool {
    lookup(program).is_some()
}

/// Names of the programs that carry a secondary policy
pub fn commands_needing_extra_validation() -> Vec<&'static str> {
    ALLOWED_COMMANDS
        .iter()
        .filter(|e| e.validation.requires_extra_validation())
        .map(|e| e.program)
        .collect()
}

/// All permitted program names, in table order
pub fn allowed_program_names() -> Vec<&'static str> {
    ALLOWED_COMMANDS.iter().map(|e| e.program).collect()
}
