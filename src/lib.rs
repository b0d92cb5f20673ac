//! # theorex
//!
//! Theorem extraction for LaTeX research paper sources, with LaTeX-accurate
//! numbering.
//!
//! ## Features
//!
//! - **Macro Expansion**: `\def`, `\newcommand` and `\DeclareMathOperator`
//!   resolved to a fixed point, self-referential macros dropped
//! - **Declarations**: `\newtheorem`, `\declaretheorem`, `\spnewtheorem`,
//!   `\newmdtheoremenv`, `\let` aliases and `\newenvironment` wrappers
//! - **Numbering**: shared counters, `[section]` resets, `\numberwithin`,
//!   swapped numbers and alphabetic appendix numbering
//! - **Labels**: first `\label` of each body, duplicates kept by the later
//!   statement
//! - **Source Trees**: main file detection and `\input` inlining
//! - **WASM Support**: Compiles to WebAssembly for browser usage
//!
//! ## Usage Examples
//!
//! ### Single Document
//!
//! ```rust
//! use theorex::extract;
//!
//! let records = extract(r#"
//!     \newtheorem{thm}{Theorem}[section]
//!     \begin{document}
//!     \section{Intro}
//!     \begin{thm}\label{thm:main}Every $x$ is $x$.\end{thm}
//!     \end{document}
//! "#);
//!
//! assert_eq!(records[0].title, "Theorem 1.1.");
//! assert_eq!(records[0].body, "Every $x$ is $x$.");
//! assert_eq!(records[0].label.as_deref(), Some("thm:main"));
//! ```
//!
//! ### Filtering Statement Kinds
//!
//! ```rust
//! use theorex::{extract_with_options, ExtractOptions};
//!
//! let output = extract_with_options(
//!     r"\begin{lemma}A\end{lemma}\begin{remark}B\end{remark}",
//!     &ExtractOptions::statements(),
//! );
//! assert_eq!(output.records.len(), 1);
//! ```

/// Core extraction passes
pub mod core;

/// Data layer - static tables and constants
pub mod data;

/// Feature modules - macro and declaration preprocessing
pub mod features;

/// Utility modules
pub mod utils;

/// WASM bindings (feature-gated)
#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export core types
pub use core::counters::{to_alpha, TheoremNumberer};
pub use core::extract::TheoremRecord;
pub use core::options::{ExtractOptions, STATEMENT_KINDS};

// Re-export data modules
pub use data::constants;

// Re-export feature modules
pub use features::macros;
pub use features::theorems;

// Re-export utilities
pub use utils::diagnostics;
pub use utils::error::{
    ExtractionError, ExtractionOutput, ExtractionResult, ExtractionWarning, WarningKind,
};
pub use utils::files;

/// Extract every theorem-like statement of a document
///
/// # Arguments
/// * `input` - Full LaTeX source with imports already inlined
///
/// # Returns
/// Records in document order, main matter first
pub fn extract(input: &str) -> Vec<TheoremRecord> {
    extract_with_options(input, &ExtractOptions::default()).records
}

/// Extract with custom options, keeping the warnings
pub fn extract_with_options(input: &str, options: &ExtractOptions) -> ExtractionOutput {
    core::extract::extract_with_options(input, options)
}

/// Extract from raw bytes
///
/// Input is decoded as UTF-8, falling back to Latin-1. Binary input fails
/// with [`ExtractionError::Encoding`].
pub fn extract_bytes(input: &[u8], options: &ExtractOptions) -> ExtractionResult<ExtractionOutput> {
    let text = files::decode_source(input)?;
    Ok(extract_with_options(&text, options))
}
