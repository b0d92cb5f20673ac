//! Core extraction passes
//!
//! This module contains the extraction pipeline, in the order it runs:
//! - `comments`: comment stripping
//! - `grammar`: balanced brace/bracket groups and control sequences
//! - `normalize`: macro expansion and theorem declaration collection
//! - `locate`: occurrences of theorem-like environments and sectioning commands
//! - `counters`: LaTeX-accurate numbering
//! - `extract`: bodies, labels and final records

pub mod comments;
pub mod counters;
pub mod extract;
pub mod grammar;
pub mod locate;
pub mod normalize;
pub mod options;

// Re-export main types and functions
pub use comments::strip_comments;
pub use counters::{to_alpha, NumberingPlan, TheoremNumberer};
pub use extract::{canonicalize, extract_with_options, TheoremRecord};
pub use locate::{locate, EnvironmentStrategy, Located, Occurrence, Region};
pub use normalize::{normalize, NormalizedDocument};
pub use options::ExtractOptions;
