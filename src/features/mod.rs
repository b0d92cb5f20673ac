//! Feature modules - document preprocessing
//!
//! - Macro collection and expansion (`\def`, `\newcommand`, `\DeclareMathOperator`)
//! - Theorem declarations, aliases, counter parents and environment wrappers

pub mod macros;
pub mod theorems;

// Re-export commonly used types
pub use macros::{expand_macros, DefinitionFamily, Macro, MacroDb};
pub use theorems::{DeclarationTable, TheoremDeclaration};
