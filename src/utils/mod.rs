//! Utility modules
//!
//! This module contains utilities and helpers:
//! - Diagnostics and error reporting
//! - Source tree resolution for multi-file papers
//! - Error types and result types

pub mod diagnostics;
pub mod error;
pub mod files;

// Re-export commonly used items
pub use diagnostics::{check_document, format_diagnostics, Diagnostic, DiagnosticLevel};
pub use error::{
    ExtractionError, ExtractionOutput, ExtractionResult, ExtractionWarning, WarningKind,
};
pub use files::{
    decode_source, find_main_file, inline_imports, FileResolveError, FileResolver,
    MemoryFileResolver,
};

#[cfg(not(target_arch = "wasm32"))]
pub use files::StdFileResolver;
