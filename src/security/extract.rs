//! Command Extraction
//!
//! Derives the program each pipe stage would run: leading `NAME=value`
//! assignments are skipped and path prefixes are reduced to the basename.

use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::LazyLock;

use super::lexer::{split_command_segments, ParseError, Segment};

/// `NAME=value` prefix assignment (value may be empty)
static ENV_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*=").expect("Invalid env assignment regex")
});

/// A program invocation found in a command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedCommand {
    /// Basename of the invoked program
    pub program: String,
    /// Raw text of the chained segment that owns the invocation
    pub segment: String,
    /// Raw text of the pipe stage that invokes the program
    pub stage: String,
}

/// Whether a token is a leading environment assignment
pub fn is_env_assignment(token: &str) -> bool {
    ENV_ASSIGNMENT.is_match(token)
}

/// Reduce a program token to its final path component
///
/// `/usr/bin/node` becomes `node`, `./init.sh` becomes `init.sh`.
/// Tokens with no usable final component (`/`, `..`) are returned unchanged.
pub fn program_basename(token: &str) -> String {
    if !token.contains('/') {
        return token.to_string();
    }
    Path::new(token)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| token.to_string())
}

/// Tokenize a pipe stage and drop leading environment assignments
///
/// The first returned word is the program as written (path included);
/// an empty vector means the stage only assigns variables.
pub fn command_words(stage: &str) -> Result<Vec<String>, ParseError> {
    let tokens = shell_words::split(stage)?;
    Ok(tokens
        .into_iter()
        .skip_while(|token| is_env_assignment(token))
        .collect())
}

/// Extract every invoked program, failing distinctly on unparseable input
///
/// Commands come back in left-to-right execution order across segments
/// and pipe stages.
pub fn try_extract_commands(command: &str) -> Result<Vec<ExtractedCommand>, ParseError> {
    extract_from_segments(&split_command_segments(command)?)
}

/// Extract the invoked programs from already-split segments
pub fn extract_from_segments(segments: &[Segment]) -> Result<Vec<ExtractedCommand>, ParseError> {
    let mut commands = Vec::new();

    for segment in segments {
        for stage in &segment.stages {
            let words = command_words(stage)?;
            let Some(program) = words.first() else {
                continue;
            };

            let program = program_basename(program);
            if program.is_empty() {
                continue;
            }

            commands.push(ExtractedCommand {
                program,
                segment: segment.text.clone(),
                stage: stage.clone(),
            });
        }
    }

    Ok(commands)
}

/// Extract program names from a command line
///
/// Malformed input (for example an unterminated quote) yields an empty
/// vector; use [`try_extract_commands`] to tell that apart from a command
/// line with nothing to run.
///
/// # Examples
///
/// ```
/// use harness_guard_cli::security::extract::extract_commands;
///
/// assert_eq!(extract_commands("VAR=1 /usr/bin/node app.js | grep ok"), vec!["node", "grep"]);
/// assert!(extract_commands("echo \"unclosed").is_empty());
/// ```
pub fn extract_commands(command: &str) -> Vec<String> {
    try_extract_commands(command)
        .map(|commands| commands.into_iter().map(|c| c.program).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple_commands() {
        assert_eq!(extract_commands("ls -la"), vec!["ls"]);
        assert_eq!(extract_commands("cat file.txt"), vec!["cat"]);
    }

    #[test]
    fn test_extract_with_pipes() {
        assert_eq!(extract_commands("ls -la | grep test"), vec!["ls", "grep"]);
        assert_eq!(
            extract_commands("cat file.txt | head -10 | tail -5"),
            vec!["cat", "head", "tail"]
        );
    }

    #[test]
    fn test_extract_chain_order() {
        assert_eq!(
            extract_commands("cmd1 && cmd2 || cmd3; cmd4 | cmd5"),
            vec!["cmd1", "cmd2", "cmd3", "cmd4", "cmd5"]
        );
    }

    #[test]
    fn test_extract_strips_paths() {
        assert_eq!(extract_commands("/usr/bin/python script.py"), vec!["python"]);
        assert_eq!(extract_commands("./script.sh"), vec!["script.sh"]);
        assert_eq!(extract_commands("path/to/init.sh --fast"), vec!["init.sh"]);
    }

    #[test]
    fn test_extract_skips_env_assignments() {
        assert_eq!(
            extract_commands("VAR1=val1 VAR2=val2 command arg1 arg2"),
            vec!["command"]
        );
        assert_eq!(extract_commands("VAR=value && command"), vec!["command"]);
        assert_eq!(extract_commands("NODE_ENV=\"a b\" node app.js"), vec!["node"]);
        assert_eq!(extract_commands("EMPTY= ls"), vec!["ls"]);
    }

    #[test]
    fn test_assignment_lookalikes_are_programs() {
        // Not a valid identifier before '=', so it is the program itself
        assert_eq!(extract_commands("1VAR=x ls"), vec!["1VAR=x"]);
        assert_eq!(extract_commands("=x ls"), vec!["=x"]);
    }

    #[test]
    fn test_extract_with_quotes() {
        assert_eq!(extract_commands("echo \"hello world\""), vec!["echo"]);
        assert_eq!(extract_commands("echo 'hello world'"), vec!["echo"]);
    }

    #[test]
    fn test_extract_ignores_comments() {
        assert_eq!(extract_commands("ls #'\nrm -rf / #'"), vec!["ls", "rm"]);
        assert_eq!(extract_commands("git status # cat secrets"), vec!["git"]);
        assert!(extract_commands("ls $'x'").is_empty());
    }

    #[test]
    fn test_extract_malformed_is_empty() {
        assert!(extract_commands("echo \"unclosed quote").is_empty());
        assert!(try_extract_commands("echo \"unclosed quote").is_err());
        assert!(try_extract_commands("   ").unwrap().is_empty());
    }

    #[test]
    fn test_extracted_command_keeps_owner_text() {
        let commands = try_extract_commands("ls && ps aux | pkill -f node").unwrap();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[2].program, "pkill");
        assert_eq!(commands[2].segment, "ps aux | pkill -f node");
        assert_eq!(commands[2].stage, "pkill -f node");
    }

    #[test]
    fn test_command_words() {
        assert_eq!(
            command_words("A=1 B=2 chmod +x 'my file.sh'").unwrap(),
            vec!["chmod", "+x", "my file.sh"]
        );
        assert!(command_words("A=1").unwrap().is_empty());
    }

    #[test]
    fn test_program_basename() {
        assert_eq!(program_basename("/usr/bin/node"), "node");
        assert_eq!(program_basename("node"), "node");
        assert_eq!(program_basename("/"), "/");
    }
}
