//! Command Line Segmenter
//!
//! Splits a raw command line into the invocations it chains together.
//! Segment boundaries are the chaining operators (`&&`, `||`, `;`, plus a
//! lone `&` and newlines); pipes stay inside a segment and are recorded as
//! separate stages.
//!
//! Anything the segmenter cannot read literally is a [`ParseError`]:
//! unterminated quotes, command substitution and subshells. Callers treat
//! every error as a reason to block the whole command line.

use serde::Serialize;
use thiserror::Error;

/// Errors produced while splitting or tokenizing a command line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unterminated {quote} quote")]
    UnterminatedQuote { quote: char },

    #[error("Unsupported shell syntax: {0}")]
    UnsupportedSyntax(String),

    #[error("Could not tokenize: {0}")]
    Tokenize(String),
}

impl From<shell_words::ParseError> for ParseError {
    fn from(err: shell_words::ParseError) -> Self {
        ParseError::Tokenize(err.to_string())
    }
}

/// One invocation within a chained command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    /// Trimmed source text of the segment, pipes included
    pub text: String,
    /// Pipe stages in execution order (empty stages dropped)
    pub stages: Vec<String>,
}

impl Segment {
    fn new(text: &str, stages: Vec<String>) -> Self {
        Self {
            text: text.trim().to_string(),
            stages,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    None,
    Single,
    Double,
}

/// Accumulates byte spans while walking the command line
struct SegmentBuilder<'a> {
    source: &'a str,
    segments: Vec<Segment>,
    stages: Vec<String>,
    segment_start: usize,
    stage_start: usize,
}

impl<'a> SegmentBuilder<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            segments: Vec::new(),
            stages: Vec::new(),
            segment_start: 0,
            stage_start: 0,
        }
    }

    /// Close the current pipe stage at `end`; the next stage starts at `resume`
    fn end_stage(&mut self, end: usize, resume: usize) {
        let stage = self.source[self.stage_start..end].trim();
        if !stage.is_empty() {
            self.stages.push(stage.to_string());
        }
        self.stage_start = resume;
    }

    /// Close the current segment at `end`; the next segment starts at `resume`
    fn end_segment(&mut self, end: usize, resume: usize) {
        self.end_stage(end, resume);
        let text = &self.source[self.segment_start..end];
        let stages = std::mem::take(&mut self.stages);
        if !text.trim().is_empty() {
            self.segments.push(Segment::new(text, stages));
        }
        self.segment_start = resume;
    }

    fn finish(mut self) -> Vec<Segment> {
        let len = self.source.len();
        self.end_segment(len, len);
        self.segments
    }
}

/// Split a command line into segments on top-level chaining operators
///
/// Operators inside single or double quotes, or escaped with a backslash,
/// are literal text. Empty and whitespace-only input yields no segments.
///
/// # Examples
///
/// ```
/// use harness_guard_cli::security::lexer::split_command_segments;
///
/// let segments = split_command_segments("ls | grep test && echo found").unwrap();
/// assert_eq!(segments[0].as_str(), "ls | grep test");
/// assert_eq!(segments[0].stages, vec!["ls", "grep test"]);
/// assert_eq!(segments[1].as_str(), "echo found");
/// ```
pub fn split_command_segments(command: &str) -> Result<Vec<Segment>, ParseError> {
    let bytes = command.as_bytes();
    let mut builder = SegmentBuilder::new(command);
    let mut state = QuoteState::None;
    let mut i = 0;
    // True when the next unquoted byte would begin a new word
    let mut word_start = true;

    // Operators are ASCII, so walking bytes never splits a UTF-8 sequence
    // at a position we slice on.
    while i < bytes.len() {
        let c = bytes[i];
        let next = bytes.get(i + 1).copied();
        let prev = if i > 0 { Some(bytes[i - 1]) } else { None };
        let at_word_start = std::mem::replace(&mut word_start, false);

        match state {
            QuoteState::Single => {
                if c == b'\'' {
                    state = QuoteState::None;
                }
                i += 1;
            }
            QuoteState::Double => {
                match c {
                    b'\\' => i += 1,
                    b'"' => state = QuoteState::None,
                    b'`' => return Err(ParseError::UnsupportedSyntax("`...`".to_string())),
                    b'$' if next == Some(b'(') => {
                        return Err(ParseError::UnsupportedSyntax("$(...)".to_string()))
                    }
                    _ => {}
                }
                i += 1;
            }
            QuoteState::None => match c {
                b'\\' => i += 2,
                b'\'' => {
                    state = QuoteState::Single;
                    i += 1;
                }
                b'"' => {
                    state = QuoteState::Double;
                    i += 1;
                }
                b'`' => return Err(ParseError::UnsupportedSyntax("`...`".to_string())),
                b'$' if next == Some(b'(') => {
                    return Err(ParseError::UnsupportedSyntax("$(...)".to_string()))
                }
                // ANSI-C quoting has its own escape rules ($'\'' is a quote)
                b'$' if next == Some(b'\'') => {
                    return Err(ParseError::UnsupportedSyntax("$'...'".to_string()))
                }
                b'(' | b')' => {
                    return Err(ParseError::UnsupportedSyntax(format!(
                        "subshell '{}'",
                        c as char
                    )))
                }
                // Comment runs to the end of the line; quotes inside it are inert
                b'#' if at_word_start => {
                    let end = bytes[i..]
                        .iter()
                        .position(|&b| b == b'\n')
                        .map_or(bytes.len(), |offset| i + offset);
                    builder.end_stage(i, end);
                    word_start = true;
                    i = end;
                }
                b' ' | b'\t' | b'<' | b'>' => {
                    word_start = true;
                    i += 1;
                }
                b';' | b'\n' => {
                    builder.end_segment(i, i + 1);
                    word_start = true;
                    i += 1;
                }
                b'&' if next == Some(b'&') => {
                    builder.end_segment(i, i + 2);
                    word_start = true;
                    i += 2;
                }
                // 2>&1, >&2, &> file
                b'&' if matches!(prev, Some(b'>') | Some(b'<')) || next == Some(b'>') => {
                    word_start = true;
                    i += 1;
                }
                b'&' => {
                    builder.end_segment(i, i + 1);
                    word_start = true;
                    i += 1;
                }
                b'|' if next == Some(b'|') => {
                    builder.end_segment(i, i + 2);
                    word_start = true;
                    i += 2;
                }
                // >| clobbers a file, it is not a pipe
                b'|' if prev == Some(b'>') => {
                    word_start = true;
                    i += 1;
                }
                b'|' if next == Some(b'&') => {
                    builder.end_stage(i, i + 2);
                    word_start = true;
                    i += 2;
                }
                b'|' => {
                    builder.end_stage(i, i + 1);
                    word_start = true;
                    i += 1;
                }
                _ => i += 1,
            },
        }
    }

    match state {
        QuoteState::Single => Err(ParseError::UnterminatedQuote { quote: '\'' }),
        QuoteState::Double => Err(ParseError::UnterminatedQuote { quote: '"' }),
        QuoteState::None => Ok(builder.finish()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(command: &str) -> Vec<String> {
        split_command_segments(command)
            .unwrap()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_split_simple_chains() {
        assert_eq!(texts("ls && echo done"), vec!["ls", "echo done"]);
        assert_eq!(texts("ls || echo failed"), vec!["ls", "echo failed"]);
        assert_eq!(texts("ls; echo next"), vec!["ls", "echo next"]);
    }

    #[test]
    fn test_split_complex_chain() {
        assert_eq!(
            texts("ls && echo step1 || echo step2; echo final"),
            vec!["ls", "echo step1", "echo step2", "echo final"]
        );
    }

    #[test]
    fn test_pipes_are_stages_not_segments() {
        let segments = split_command_segments("ls | grep test && echo found").unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].as_str(), "ls | grep test");
        assert_eq!(segments[0].stages, vec!["ls", "grep test"]);
        assert_eq!(segments[1].stages, vec!["echo found"]);
    }

    #[test]
    fn test_quoted_operators_are_literal() {
        assert_eq!(
            texts("git commit -m 'fix; add && more' && git log"),
            vec!["git commit -m 'fix; add && more'", "git log"]
        );
        assert_eq!(texts(r#"grep "a|b" file.txt"#), vec![r#"grep "a|b" file.txt"#]);
        let segments = split_command_segments(r#"grep "a|b" file.txt"#).unwrap();
        assert_eq!(segments[0].stages.len(), 1);
    }

    #[test]
    fn test_escaped_operator_is_literal() {
        assert_eq!(texts(r"echo a\; b"), vec![r"echo a\; b"]);
    }

    #[test]
    fn test_empty_input_has_no_segments() {
        assert!(split_command_segments("").unwrap().is_empty());
        assert!(split_command_segments("   \t ").unwrap().is_empty());
        assert!(split_command_segments(" ; && ").unwrap().is_empty());
    }

    #[test]
    fn test_unterminated_quotes_fail() {
        assert_eq!(
            split_command_segments("echo \"unterminated"),
            Err(ParseError::UnterminatedQuote { quote: '"' })
        );
        assert_eq!(
            split_command_segments("ls && echo 'oops"),
            Err(ParseError::UnterminatedQuote { quote: '\'' })
        );
    }

    #[test]
    fn test_background_and_newline_split() {
        assert_eq!(texts("sleep 5 & rm -rf x"), vec!["sleep 5", "rm -rf x"]);
        assert_eq!(texts("ls\ncat a.txt"), vec!["ls", "cat a.txt"]);
    }

    #[test]
    fn test_redirection_ampersand_does_not_split() {
        assert_eq!(texts("npm test 2>&1 | tail -5"), vec!["npm test 2>&1 | tail -5"]);
        assert_eq!(texts("npm test &> out.log"), vec!["npm test &> out.log"]);
        assert_eq!(texts("ls >| out.txt"), vec!["ls >| out.txt"]);
    }

    #[test]
    fn test_pipe_ampersand_is_a_stage() {
        let segments = split_command_segments("npm test |& tail").unwrap();
        assert_eq!(segments[0].stages, vec!["npm test", "tail"]);
    }

    #[test]
    fn test_substitution_and_subshells_rejected() {
        assert!(matches!(
            split_command_segments("echo $(rm -rf /)"),
            Err(ParseError::UnsupportedSyntax(_))
        ));
        assert!(matches!(
            split_command_segments("echo \"`whoami`\""),
            Err(ParseError::UnsupportedSyntax(_))
        ));
        assert!(matches!(
            split_command_segments("(cd /tmp && ls)"),
            Err(ParseError::UnsupportedSyntax(_))
        ));
        // Literal inside single quotes
        assert!(split_command_segments("echo '$(not run)'").is_ok());
    }

    #[test]
    fn test_ansi_c_quoting_rejected() {
        // $'\'' is a single quote to the shell, so ';rm' below is unquoted
        assert!(matches!(
            split_command_segments("ls $'\\'';rm -rf / #'"),
            Err(ParseError::UnsupportedSyntax(_))
        ));
        assert!(split_command_segments("echo '$x' \"$HOME\"").is_ok());
    }

    #[test]
    fn test_comment_quotes_do_not_hide_next_line() {
        let segments = split_command_segments("ls #'\nrm -rf / #'").unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].stages, vec!["ls"]);
        assert_eq!(segments[1].stages, vec!["rm -rf /"]);

        assert_eq!(texts("ls # && cat x"), vec!["ls # && cat x"]);
    }

    #[test]
    fn test_hash_inside_word_is_literal() {
        assert_eq!(texts("echo a#b; ls"), vec!["echo a#b", "ls"]);
        // Escaped space keeps the word going, so the # is not a comment
        assert_eq!(texts(r"echo a\ #; ls"), vec![r"echo a\ #", "ls"]);
        assert_eq!(texts("echo '#'; ls"), vec!["echo '#'", "ls"]);
    }
}
