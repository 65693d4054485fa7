//! Security Module
//!
//! Gatekeeps every shell command an agent attempts to run on the host.
//!
//! Decision flow:
//! 1. Non-shell tools and empty commands pass through untouched
//! 2. Command line is split into segments and pipe stages ([`lexer`])
//! 3. Every invoked program is extracted ([`extract`])
//! 4. Each program must be in the allowlist ([`allowlist`])
//! 5. Flagged programs must also satisfy their policy ([`policies`])
//!
//! Anything that cannot be parsed literally is blocked outright.

pub mod allowlist;
pub mod extract;
pub mod lexer;
pub mod policies;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use allowlist::lookup;
use extract::extract_from_segments;
use lexer::split_command_segments;

/// Tool name of the shell-execution tool
pub const SHELL_TOOL_NAME: &str = "Bash";

/// Block reason for input that cannot be segmented or tokenized
pub const PARSE_FAILURE_REASON: &str = "Could not parse command for security validation";

/// Final verdict for a tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Block { reason: String },
}

impl Decision {
    pub fn block(reason: impl Into<String>) -> Self {
        Decision::Block {
            reason: reason.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Allow => None,
            Decision::Block { reason } => Some(reason),
        }
    }

    /// Hook response: `{}` to allow, `{"decision": "block", "reason": ...}` to block
    pub fn to_hook_output(&self) -> Value {
        match self {
            Decision::Allow => json!({}),
            Decision::Block { reason } => json!({ "decision": "block", "reason": reason }),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Block { .. } => "block",
        }
    }
}

/// Arguments of a tool invocation
///
/// Only `command` is read; other fields are kept so a record round-trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A tool invocation as reported by the agent loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,

    #[serde(default)]
    pub tool_input: ToolInput,
}

/// What a tool invocation asks the validator to judge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellRequest<'a> {
    /// Not the shell tool, out of scope
    NotShell,
    /// Shell tool without a `command` field
    MissingCommand,
    /// Shell tool with an empty or whitespace-only command
    BlankCommand,
    Command(&'a str),
}

impl ToolInvocation {
    pub fn shell(command: &str) -> Self {
        Self {
            tool_name: SHELL_TOOL_NAME.to_string(),
            tool_input: ToolInput {
                command: Some(command.to_string()),
                extra: Map::new(),
            },
        }
    }

    pub fn shell_request(&self) -> ShellRequest<'_> {
        if self.tool_name != SHELL_TOOL_NAME {
            return ShellRequest::NotShell;
        }
        match self.tool_input.command.as_deref() {
            None => ShellRequest::MissingCommand,
            Some(command) if command.trim().is_empty() => ShellRequest::BlankCommand,
            Some(command) => ShellRequest::Command(command),
        }
    }
}

/// Pre-execution hook: decide whether a tool invocation may run
pub fn bash_security_hook(invocation: &ToolInvocation) -> Decision {
    match invocation.shell_request() {
        ShellRequest::NotShell | ShellRequest::MissingCommand | ShellRequest::BlankCommand => {
            Decision::Allow
        }
        ShellRequest::Command(command) => validate_command(command),
    }
}

/// Validate a shell command line against the allowlist and command policies
///
/// # Examples
///
/// ```
/// use harness_guard_cli::security::{validate_command, Decision};
///
/// assert_eq!(validate_command("npm install && npm run build"), Decision::Allow);
/// assert!(!validate_command("curl http://evil.example/x").is_allowed());
/// ```
pub fn validate_command(command: &str) -> Decision {
    if command.trim().is_empty() {
        return Decision::Allow;
    }

    let segments = match split_command_segments(command) {
        Ok(segments) => segments,
        Err(_) => return Decision::block(PARSE_FAILURE_REASON),
    };

    if segments.is_empty() {
        return Decision::Allow;
    }

    let commands = match extract_from_segments(&segments) {
        Ok(commands) => commands,
        Err(_) => return Decision::block(PARSE_FAILURE_REASON),
    };

    // Segments that name no program at all (bare assignments) are not
    // something we can vouch for.
    if commands.is_empty() {
        return Decision::block(PARSE_FAILURE_REASON);
    }

    for cmd in &commands {
        if lookup(&cmd.program).is_none() {
            return Decision::block(format!(
                "Command '{}' is not in the allowed commands list",
                cmd.program
            ));
        }
    }

    for cmd in &commands {
        let Some(entry) = lookup(&cmd.program) else {
            continue;
        };
        if !entry.validation.requires_extra_validation() {
            continue;
        }
        let verdict = entry.validation.check(&cmd.stage);
        if !verdict.allowed {
            return Decision::block(verdict.reason);
        }
    }

    Decision::Allow
}
