//! Extraction diagnostics
//!
//! Reports what extraction would do with a document and what may go wrong:
//!
//! - Recoverable extraction problems (unclosed definitions, dropped macros,
//!   conflicting counters, statement count mismatches)
//! - Unbalanced braces and environments in the source
//! - A summary of the statements found
//!
//! ## Example
//!
//! ```rust
//! use theorex::diagnostics::check_document;
//! use theorex::ExtractOptions;
//!
//! let result = check_document(r"\begin{theorem}x", &ExtractOptions::default());
//! assert!(result.has_errors());
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

use crate::core::comments::comment_start;
use crate::core::extract::extract_with_options;
use crate::core::normalize::normalize;
use crate::core::options::ExtractOptions;
use crate::utils::error::{ExtractionWarning, WarningKind};

lazy_static! {
    static ref ENVIRONMENT_DELIMITER: Regex =
        Regex::new(r"\\(begin|end)\s*\{\s*([^{}]*?)\s*\}").unwrap();
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticLevel {
    /// Informational note
    Info,
    /// Warning - numbering or bodies may be approximate
    Warning,
    /// Error - statements will be missing or misattributed
    Error,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticLevel::Info => write!(f, "info"),
            DiagnosticLevel::Warning => write!(f, "warning"),
            DiagnosticLevel::Error => write!(f, "error"),
        }
    }
}

/// A single diagnostic message
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level
    pub level: DiagnosticLevel,
    /// Human-readable message
    pub message: String,
    /// Line number (1-indexed)
    pub line: Option<usize>,
    /// Column number (1-indexed)
    pub column: Option<usize>,
    /// Relevant source text
    pub source_text: Option<String>,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic
    pub fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            line: None,
            column: None,
            source_text: None,
            suggestion: None,
        }
    }

    /// Add location information
    pub fn with_location(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Add source text
    pub fn with_source(mut self, text: impl Into<String>) -> Self {
        self.source_text = Some(text.into());
        self
    }

    /// Add suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Format: level: message
        //         --> line:column
        //         |
        //         | source text
        //         = help: suggestion

        write!(f, "{}: {}", self.level, self.message)?;

        if let (Some(line), Some(col)) = (self.line, self.column) {
            write!(f, "\n  --> line {}:{}", line, col)?;
        }

        if let Some(ref source) = self.source_text {
            write!(f, "\n  |\n  | {}", source)?;
        }

        if let Some(ref suggestion) = self.suggestion {
            write!(f, "\n  = help: {}", suggestion)?;
        }

        Ok(())
    }
}

/// Check result with summary
#[derive(Debug, Default)]
pub struct CheckResult {
    /// All diagnostics
    pub diagnostics: Vec<Diagnostic>,
    /// Number of errors
    pub errors: usize,
    /// Number of warnings
    pub warnings: usize,
    /// Number of info messages
    pub infos: usize,
}

impl CheckResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a diagnostic
    pub fn add(&mut self, diag: Diagnostic) {
        match diag.level {
            DiagnosticLevel::Error => self.errors += 1,
            DiagnosticLevel::Warning => self.warnings += 1,
            DiagnosticLevel::Info => self.infos += 1,
        }
        self.diagnostics.push(diag);
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// Check if there are any issues at all
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Get summary string
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.errors > 0 {
            parts.push(format!(
                "{} error{}",
                self.errors,
                if self.errors == 1 { "" } else { "s" }
            ));
        }
        if self.warnings > 0 {
            parts.push(format!(
                "{} warning{}",
                self.warnings,
                if self.warnings == 1 { "" } else { "s" }
            ));
        }
        if self.infos > 0 {
            parts.push(format!(
                "{} note{}",
                self.infos,
                if self.infos == 1 { "" } else { "s" }
            ));
        }
        if parts.is_empty() {
            "no issues found".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Check a document the way extraction sees it
pub fn check_document(input: &str, options: &ExtractOptions) -> CheckResult {
    let mut result = CheckResult::new();
    let line_offsets = compute_line_offsets(input);

    // Extraction problems
    let output = extract_with_options(input, options);
    for warning in &output.warnings {
        result.add(warning_diagnostic(warning, input, &line_offsets));
    }

    // Source balance, with comments blanked out so offsets keep their lines
    let masked = mask_comments(input);
    check_brace_balance(&masked, &line_offsets, &mut result);
    check_environment_balance(&masked, &line_offsets, &mut result);

    if normalize(input).declarations.is_empty() {
        result.add(
            Diagnostic::new(
                DiagnosticLevel::Info,
                "no theorem declarations found, using the default environment set",
            )
            .with_suggestion(options.default_environments.join(", ")),
        );
    }
    result.add(Diagnostic::new(
        DiagnosticLevel::Info,
        format!(
            "{} statement{} extracted",
            output.records.len(),
            if output.records.len() == 1 { "" } else { "s" }
        ),
    ));

    result
}

fn warning_diagnostic(warning: &ExtractionWarning, input: &str, line_offsets: &[usize]) -> Diagnostic {
    let (level, suggestion) = match warning.kind {
        WarningKind::UnterminatedDefinition => (
            DiagnosticLevel::Error,
            "The definition was dropped; close its body with '}'",
        ),
        WarningKind::SelfReferentialMacro => (
            DiagnosticLevel::Warning,
            "Calls of this macro are left unexpanded",
        ),
        WarningKind::DuplicateDeclaration => (
            DiagnosticLevel::Info,
            "Only the first declaration is used for numbering",
        ),
        WarningKind::ConflictingCounter => (
            DiagnosticLevel::Warning,
            "Use either a shared counter or a parent counter, not both",
        ),
        WarningKind::CounterCycle => (
            DiagnosticLevel::Warning,
            "Remove the \\numberwithin that closes the cycle",
        ),
        WarningKind::UnterminatedEnvironment => (
            DiagnosticLevel::Error,
            "Statements after this point are not extracted",
        ),
        WarningKind::CountMismatch => (
            DiagnosticLevel::Warning,
            "Numbering may be approximate for this document",
        ),
    };

    let mut diag = Diagnostic::new(level, format!("{}: {}", warning.kind, warning.message))
        .with_suggestion(suggestion);

    if let Some(ref source) = warning.source {
        if let Some(offset) = input.find(source.as_str()) {
            let (line, col) = offset_to_location(offset, line_offsets);
            diag = diag.with_location(line, col);
        }
        diag = diag.with_source(source.clone());
    }

    diag
}

/// Compute byte offsets for each line start
fn compute_line_offsets(input: &str) -> Vec<usize> {
    let mut offsets = vec![0];
    for (i, c) in input.char_indices() {
        if c == '\n' {
            offsets.push(i + 1);
        }
    }
    offsets
}

/// Convert byte offset to line and column
fn offset_to_location(offset: usize, line_offsets: &[usize]) -> (usize, usize) {
    let line = line_offsets.partition_point(|&o| o <= offset).max(1) - 1;
    let column = offset - line_offsets.get(line).unwrap_or(&0) + 1;
    (line + 1, column) // 1-indexed
}

/// Replace comment text with spaces, keeping every byte offset
fn mask_comments(input: &str) -> String {
    let mut masked = String::with_capacity(input.len());
    for line in input.split_inclusive('\n') {
        match comment_start(line) {
            Some(pos) => {
                masked.push_str(&line[..pos]);
                let content = line[pos..].trim_end_matches('\n');
                masked.extend(std::iter::repeat(' ').take(content.len()));
                masked.push_str(&line[pos + content.len()..]);
            }
            None => masked.push_str(line),
        }
    }
    masked
}

/// Check for unbalanced braces
fn check_brace_balance(input: &str, line_offsets: &[usize], result: &mut CheckResult) {
    let mut depth = 0i32;
    let mut last_open_line = 0;
    let mut escaped = false;

    for (offset, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => {
                if depth == 0 {
                    let (line, _) = offset_to_location(offset, line_offsets);
                    last_open_line = line;
                }
                depth += 1;
            }
            '}' => {
                depth -= 1;
                if depth < 0 {
                    let (line, col) = offset_to_location(offset, line_offsets);
                    result.add(
                        Diagnostic::new(DiagnosticLevel::Error, "unmatched closing brace '}'")
                            .with_location(line, col)
                            .with_suggestion("Check for missing opening brace"),
                    );
                    depth = 0;
                }
            }
            _ => {}
        }
    }

    if depth > 0 {
        result.add(
            Diagnostic::new(
                DiagnosticLevel::Error,
                format!(
                    "{} unclosed brace{} (opened around line {})",
                    depth,
                    if depth == 1 { "" } else { "s" },
                    last_open_line
                ),
            )
            .with_suggestion("Check for missing closing brace '}'"),
        );
    }
}

/// Check for unbalanced environments
fn check_environment_balance(input: &str, line_offsets: &[usize], result: &mut CheckResult) {
    let mut env_stack: Vec<(String, usize)> = Vec::new();

    for caps in ENVIRONMENT_DELIMITER.captures_iter(input) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let env_name = caps[2].to_string();
        let (line, col) = offset_to_location(whole.start(), line_offsets);

        if &caps[1] == "begin" {
            env_stack.push((env_name, line));
            continue;
        }

        match env_stack.pop() {
            Some((open_name, open_line)) if open_name != env_name => {
                result.add(
                    Diagnostic::new(
                        DiagnosticLevel::Error,
                        format!(
                            "mismatched environment: opened '{}' at line {}, closed '{}' at line {}",
                            open_name, open_line, env_name, line
                        ),
                    )
                    .with_location(line, col)
                    .with_suggestion(format!("Use \\end{{{}}}", open_name)),
                );
            }
            Some(_) => {}
            None => {
                result.add(
                    Diagnostic::new(
                        DiagnosticLevel::Error,
                        format!("unmatched \\end{{{}}}", env_name),
                    )
                    .with_location(line, col)
                    .with_suggestion("Check for missing \\begin"),
                );
            }
        }
    }

    // Report unclosed environments
    for (env_name, line) in env_stack {
        result.add(
            Diagnostic::new(
                DiagnosticLevel::Error,
                format!(
                    "unclosed environment '{}' (opened at line {})",
                    env_name, line
                ),
            )
            .with_suggestion(format!("Add \\end{{{}}}", env_name)),
        );
    }
}

/// Format check results for terminal output
pub fn format_diagnostics(result: &CheckResult, use_color: bool) -> String {
    let mut output = String::new();

    for diag in &result.diagnostics {
        if use_color {
            let color = match diag.level {
                DiagnosticLevel::Error => "\x1b[31m",   // Red
                DiagnosticLevel::Warning => "\x1b[33m", // Yellow
                DiagnosticLevel::Info => "\x1b[34m",    // Blue
            };
            output.push_str(color);
            output.push_str(&format!("{}", diag));
            output.push_str("\x1b[0m\n\n");
        } else {
            output.push_str(&format!("{}\n\n", diag));
        }
    }

    // Summary
    if use_color {
        if result.has_errors() {
            output.push_str("\x1b[31m");
        } else if result.warnings > 0 {
            output.push_str("\x1b[33m");
        } else {
            output.push_str("\x1b[32m");
        }
    }

    output.push_str(&format!("Summary: {}", result.summary()));

    if use_color {
        output.push_str("\x1b[0m");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(input: &str) -> CheckResult {
        check_document(input, &ExtractOptions::default())
    }

    #[test]
    fn test_clean_document() {
        let result = check(r"\newtheorem{thm}{Theorem}\begin{thm}x\end{thm}");
        assert!(!result.has_errors());
        assert_eq!(result.warnings, 0);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.message == "1 statement extracted"));
    }

    #[test]
    fn test_unbalanced_braces() {
        let result = check(r"\frac{1}{2");
        assert!(result.has_errors(), "Should fail for unbalanced braces");
    }

    #[test]
    fn test_escaped_and_commented_braces_ignored() {
        let result = check("\\{ set \\}\n% unmatched { in a comment\n");
        assert!(!result.has_errors());
    }

    #[test]
    fn test_unclosed_theorem() {
        let result = check("intro\n\\begin{theorem}x");
        assert!(result.has_errors());
        let unterminated = result
            .diagnostics
            .iter()
            .find(|d| d.message.starts_with("unterminated-environment"))
            .unwrap();
        assert_eq!(unterminated.line, Some(2));
    }

    #[test]
    fn test_mismatched_environments() {
        let result = check(r"\begin{lemma}x=1\end{theorem}");
        assert!(result.has_errors());
    }

    #[test]
    fn test_default_environment_note() {
        let result = check(r"\begin{lemma}x\end{lemma}");
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.message.contains("default environment set")));
    }

    #[test]
    fn test_offset_to_location() {
        let offsets = compute_line_offsets("ab\ncd\n");
        assert_eq!(offset_to_location(0, &offsets), (1, 1));
        assert_eq!(offset_to_location(4, &offsets), (2, 2));
    }

    #[test]
    fn test_summary_format() {
        let mut result = CheckResult::new();
        result.add(Diagnostic::new(DiagnosticLevel::Error, "test"));
        result.add(Diagnostic::new(DiagnosticLevel::Warning, "test"));

        let summary = result.summary();
        assert!(summary.contains("1 error"));
        assert!(summary.contains("1 warning"));
    }
}
