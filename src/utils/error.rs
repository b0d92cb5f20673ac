//! Error handling for theorem extraction
//!
//! Extraction is heuristic: almost every problem inside a document is
//! recoverable and becomes an [`ExtractionWarning`]. Only failures that make
//! the whole document unusable (undecodable bytes, unreadable files) surface
//! as an [`ExtractionError`].

use std::fmt;

use crate::core::extract::TheoremRecord;

/// Extraction error type
#[derive(Debug, Clone)]
pub enum ExtractionError {
    /// Input bytes could not be decoded as text
    Encoding { message: String },
    /// Input was readable but is not a LaTeX source
    InvalidInput { message: String },
    /// No main file could be located among the sources
    MainFileNotFound { location: String },
    /// IO error (for file operations)
    IoError { message: String },
    /// Internal error
    InternalError { message: String },
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionError::Encoding { message } => {
                write!(f, "Encoding error: {}", message)
            }
            ExtractionError::InvalidInput { message } => {
                write!(f, "Invalid input: {}", message)
            }
            ExtractionError::MainFileNotFound { location } => {
                write!(f, "No main .tex file found in {}", location)
            }
            ExtractionError::IoError { message } => {
                write!(f, "IO error: {}", message)
            }
            ExtractionError::InternalError { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for ExtractionError {}

impl From<std::io::Error> for ExtractionError {
    fn from(err: std::io::Error) -> Self {
        ExtractionError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ExtractionError {
    fn from(err: serde_json::Error) -> Self {
        ExtractionError::InternalError {
            message: err.to_string(),
        }
    }
}

/// Result type for extraction operations
pub type ExtractionResult<T> = Result<T, ExtractionError>;

// Convenience constructors for errors
impl ExtractionError {
    pub fn encoding(message: impl Into<String>) -> Self {
        ExtractionError::Encoding {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ExtractionError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn main_file_not_found(location: impl Into<String>) -> Self {
        ExtractionError::MainFileNotFound {
            location: location.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ExtractionError::InternalError {
            message: message.into(),
        }
    }
}

/// Category of a recoverable problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// A macro definition whose body brace never closes; the macro is dropped
    UnterminatedDefinition,
    /// A macro that expands to itself (directly or through other macros)
    SelfReferentialMacro,
    /// An environment declared more than once; the first declaration wins
    DuplicateDeclaration,
    /// A declaration with both a shared counter and a parent counter
    ConflictingCounter,
    /// `\numberwithin` that would make a counter its own ancestor
    CounterCycle,
    /// A `\begin{env}` with no matching `\end{env}`
    UnterminatedEnvironment,
    /// Body scan and numbering disagree on the number of statements
    CountMismatch,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WarningKind::UnterminatedDefinition => "unterminated-definition",
            WarningKind::SelfReferentialMacro => "self-referential-macro",
            WarningKind::DuplicateDeclaration => "duplicate-declaration",
            WarningKind::ConflictingCounter => "conflicting-counter",
            WarningKind::CounterCycle => "counter-cycle",
            WarningKind::UnterminatedEnvironment => "unterminated-environment",
            WarningKind::CountMismatch => "count-mismatch",
        };
        write!(f, "{}", name)
    }
}

/// Extraction warnings (non-fatal issues)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionWarning {
    pub kind: WarningKind,
    pub message: String,
    /// Offending source fragment, when one can be named
    pub source: Option<String>,
}

impl ExtractionWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Warning [{}]: {}", self.kind, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " ({})", source)?;
        }
        Ok(())
    }
}

/// Extraction output with optional warnings
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
    /// Extracted statements, main matter first
    pub records: Vec<TheoremRecord>,
    /// Any warnings generated during extraction
    pub warnings: Vec<ExtractionWarning>,
}

impl ExtractionOutput {
    pub fn new(records: Vec<TheoremRecord>) -> Self {
        Self {
            records,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(records: Vec<TheoremRecord>, warnings: Vec<ExtractionWarning>) -> Self {
        Self { records, warnings }
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_error_display() {
        let err = ExtractionError::encoding("binary content");
        assert!(err.to_string().contains("Encoding error"));
        assert!(err.to_string().contains("binary content"));
    }

    #[test]
    fn test_main_file_not_found_display() {
        let err = ExtractionError::main_file_not_found("/tmp/paper");
        assert_eq!(err.to_string(), "No main .tex file found in /tmp/paper");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.tex");
        let err: ExtractionError = io.into();
        assert!(matches!(err, ExtractionError::IoError { .. }));
    }

    #[test]
    fn test_warning_display() {
        let warning = ExtractionWarning::new(WarningKind::SelfReferentialMacro, "dropped macro")
            .with_source(r"\loop");
        let msg = warning.to_string();
        assert!(msg.contains("self-referential-macro"));
        assert!(msg.contains(r"(\loop)"));
    }

    #[test]
    fn test_extraction_output() {
        let output = ExtractionOutput::new(Vec::new());
        assert!(!output.has_warnings());
        assert!(output.is_empty());

        let output = ExtractionOutput::with_warnings(
            Vec::new(),
            vec![ExtractionWarning::new(WarningKind::CountMismatch, "1 vs 2")],
        );
        assert!(output.has_warnings());
    }
}
