//! Comment stripping
//!
//! Runs before every other pass: line comments and `comment` environments
//! must never contribute macro definitions or theorem occurrences.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref COMMENT_ENV: Regex =
        Regex::new(r"(?s)\\begin\s*\{comment\}.*?\\end\s*\{comment\}").unwrap();
}

/// Remove `%` line comments and `\begin{comment}...\end{comment}` blocks.
///
/// A `%` preceded by an odd number of backslashes is a literal percent sign
/// and is kept. The newline ending a comment is kept.
pub fn strip_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());

    for line in input.split_inclusive('\n') {
        match comment_start(line) {
            Some(pos) => {
                result.push_str(&line[..pos]);
                if line.ends_with('\n') {
                    result.push('\n');
                }
            }
            None => result.push_str(line),
        }
    }

    COMMENT_ENV.replace_all(&result, "").into_owned()
}

/// Index of the first unescaped `%` in a line
pub(crate) fn comment_start(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut backslashes = 0usize;

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'%' if backslashes % 2 == 0 => return Some(i),
            b'\\' => {
                backslashes += 1;
                continue;
            }
            _ => {}
        }
        backslashes = 0;
    }

    None
}
