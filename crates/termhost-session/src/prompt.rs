//! Line splitting and prompt detection for line-oriented ("dumb") output.

use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Carriage return or backspace: the line is still being redrawn.
    static ref CONTROL_CHARS: Regex = Regex::new(r"[\r\x08]").unwrap();
    /// Anything ending in a non-word character followed by trailing spaces.
    static ref PROMPT_PATTERN: Regex = Regex::new(r"^(.*)[\W_]( +)$").unwrap();
}

/// Classification of a trailing fragment with no line terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    /// Ordinary output
    Output,
    /// A settled prompt waiting for input
    Prompt,
}

/// A chunk of output split at its last line terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitOutput<'a> {
    /// Terminated lines, including the final terminator. May be empty.
    pub committed: &'a str,
    /// Unterminated remainder. May be empty.
    pub fragment: &'a str,
}

/// Convert CRLF line endings to LF. Lone carriage returns are kept.
pub fn normalize_line_endings(output: &str) -> Cow<'_, str> {
    if output.contains("\r\n") {
        Cow::Owned(output.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(output)
    }
}

/// Split normalized output into committed lines and a trailing fragment.
pub fn split_output(output: &str) -> SplitOutput<'_> {
    if output.ends_with('\n') {
        return SplitOutput {
            committed: output,
            fragment: "",
        };
    }

    match output.rfind(['\n', '\x0c']) {
        Some(index) => SplitOutput {
            committed: &output[..=index],
            fragment: &output[index + 1..],
        },
        None => SplitOutput {
            committed: "",
            fragment: output,
        },
    }
}

/// Decide whether an unterminated fragment is a prompt.
pub fn classify_fragment(fragment: &str) -> FragmentKind {
    if CONTROL_CHARS.is_match(fragment) || !PROMPT_PATTERN.is_match(fragment) {
        FragmentKind::Output
    } else {
        FragmentKind::Prompt
    }
}
