//! Data layer - static tables and constants
//!
//! Default environments, captions, `\declaretheorem` keys and the word lists
//! used when scoring candidate main files.

pub mod constants;

// Re-export commonly used items
pub use constants::{default_caption, DEFAULT_THEOREM_ENVIRONMENTS, THEOREM_CAPTIONS};
