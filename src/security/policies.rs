//! Per-Command Policies
//!
//! Argument-aware checks for allowlisted programs whose danger depends on
//! how they are invoked. Each policy receives the pipe stage text that
//! invokes its program (leading `NAME=value` assignments are tolerated).

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use super::extract::{command_words, program_basename};

/// Processes an agent is allowed to terminate
pub const KILLABLE_PROCESSES: &[&str] = &["node", "npm", "npx", "vite", "next"];

/// Pattern syntax that could widen a pkill match past the named process
const PATTERN_METACHARACTERS: &[char] = &[
    '|', '(', ')', '[', ']', '{', '}', '*', '+', '?', '^', '$', '\\',
];

/// Symbolic mode that only adds execute permission (`+x`, `u+x`, `ug+x`, ...)
static EXECUTE_MODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ugoa]*\+x$").expect("Invalid chmod mode regex"));

/// Outcome of a per-command policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyVerdict {
    pub allowed: bool,
    /// Empty when allowed
    pub reason: String,
}

impl PolicyVerdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Allow `pkill` only for processes the harness starts itself
///
/// Flag tokens (`-f`, `-SIGTERM`, `-9`) are skipped; the first remaining
/// token is the target. pkill reads it as a regular expression, so it must
/// be literal text; with `-f` only its first word is compared.
pub fn validate_pkill_command(stage: &str) -> PolicyVerdict {
    let words = match command_words(stage) {
        Ok(words) => words,
        Err(_) => return PolicyVerdict::deny("Could not parse pkill command"),
    };

    let Some(pattern) = words.iter().skip(1).find(|word| !word.starts_with('-')) else {
        return PolicyVerdict::deny("pkill requires a process name");
    };

    if pattern.contains(PATTERN_METACHARACTERS) {
        return PolicyVerdict::deny(format!(
            "pkill target must be a plain process name, got: {}",
            pattern
        ));
    }

    let Some(target) = pattern.split_whitespace().next() else {
        return PolicyVerdict::deny("pkill requires a process name");
    };

    if KILLABLE_PROCESSES.contains(&target) {
        PolicyVerdict::allow()
    } else {
        PolicyVerdict::deny(format!(
            "pkill only allowed for dev processes: {}",
            KILLABLE_PROCESSES.join(", ")
        ))
    }
}

/// Allow `chmod` only to add execute permission to explicit files
pub fn validate_chmod_command(stage: &str) -> PolicyVerdict {
    let words = match command_words(stage) {
        Ok(words) => words,
        Err(_) => return PolicyVerdict::deny("Could not parse chmod command"),
    };

    if words.first().map(String::as_str) != Some("chmod") {
        return PolicyVerdict::deny("Not a chmod command");
    }

    let mut mode: Option<&str> = None;
    let mut files = Vec::new();

    for word in words.iter().skip(1) {
        if word.starts_with('-') {
            // Also catches -x, which would remove execute permission
            return PolicyVerdict::deny("chmod flags are not allowed");
        }
        if mode.is_none() {
            mode = Some(word.as_str());
        } else {
            files.push(word);
        }
    }

    let Some(mode) = mode else {
        return PolicyVerdict::deny("chmod requires a mode");
    };

    if files.is_empty() {
        return PolicyVerdict::deny("chmod requires at least one file");
    }

    if !EXECUTE_MODE.is_match(mode) {
        return PolicyVerdict::deny("chmod only allowed with +x mode (e.g. +x, u+x, a+x)");
    }

    PolicyVerdict::allow()
}

/// Allow the project init script only when executed directly by path
///
/// `./init.sh` and `path/to/init.sh` pass (trailing arguments are fine);
/// a bare `init.sh` or an explicit interpreter (`bash init.sh`) does not.
pub fn validate_init_script(stage: &str) -> PolicyVerdict {
    let words = match command_words(stage) {
        Ok(words) => words,
        Err(_) => return PolicyVerdict::deny("Could not parse init script command"),
    };

    let Some(script) = words.first() else {
        return PolicyVerdict::deny("Empty command");
    };

    if script.contains('/') && program_basename(script) == "init.sh" {
        PolicyVerdict::allow()
    } else {
        PolicyVerdict::deny(format!("Only ./init.sh is allowed, got: {}", script))
    }
}
