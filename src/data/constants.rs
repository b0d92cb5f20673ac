//! Constants and mapping tables for theorem extraction
//!
//! This module contains:
//! - The fallback set of theorem-like environments
//! - Caption names for common environment abbreviations
//! - `\declaretheorem` option keys
//! - Markers used to score main-file candidates

use phf::{phf_map, phf_set};

// ============================================================================
// Theorem Environments
// ============================================================================

/// Environments scanned when a document declares no theorem environment
pub const DEFAULT_THEOREM_ENVIRONMENTS: &[&str] = &[
    "theorem",
    "lemma",
    "proposition",
    "corollary",
    "claim",
    "definition",
    "remark",
    "example",
];

/// Environment name every theorem-like environment is rewritten to before
/// body extraction. The `@` keeps it out of reach of ordinary documents.
pub const CANONICAL_ENVIRONMENT: &str = "theorex@statement";

/// Captions for environment names that do not spell out their caption
pub static THEOREM_CAPTIONS: phf::Map<&'static str, &'static str> = phf_map! {
    "thm" => "Theorem",
    "lem" => "Lemma",
    "prop" => "Proposition",
    "cor" => "Corollary",
    "coro" => "Corollary",
    "conj" => "Conjecture",
    "defn" => "Definition",
    "def" => "Definition",
    "dfn" => "Definition",
    "rem" => "Remark",
    "rmk" => "Remark",
    "ex" => "Example",
    "exa" => "Example",
    "obs" => "Observation",
    "asm" => "Assumption",
    "assum" => "Assumption",
    "hyp" => "Hypothesis",
    "nota" => "Notation",
    "prob" => "Problem",
    "exer" => "Exercise",
    "alg" => "Algorithm",
    "ques" => "Question",
};

/// Caption used for an environment that has no declared caption.
///
/// Known abbreviations map to their full name, everything else is the
/// environment name with its first letter capitalized.
pub fn default_caption(environment: &str) -> String {
    let base = environment.trim_end_matches('*');
    if let Some(caption) = THEOREM_CAPTIONS.get(base) {
        return (*caption).to_string();
    }

    let mut chars = base.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// \declaretheorem Options
// ============================================================================

/// Meaning of a `\declaretheorem` key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TheoremKey {
    /// Caption text
    Caption,
    /// Counter shared with another environment
    Shared,
    /// Parent counter
    Within,
    /// `numbered=no` makes the environment unnumbered
    Numbered,
}

/// `\declaretheorem` keys understood by the normalizer (thmtools spelling)
pub static DECLARETHEOREM_KEYS: phf::Map<&'static str, TheoremKey> = phf_map! {
    "name" => TheoremKey::Caption,
    "title" => TheoremKey::Caption,
    "heading" => TheoremKey::Caption,
    "sibling" => TheoremKey::Shared,
    "sharenumber" => TheoremKey::Shared,
    "sharecounter" => TheoremKey::Shared,
    "within" => TheoremKey::Within,
    "numberwithin" => TheoremKey::Within,
    "parent" => TheoremKey::Within,
    "numbered" => TheoremKey::Numbered,
};

// ============================================================================
// Main File Scoring
// ============================================================================

/// Macros that mark a source file as a draft
pub const DRAFT_MACROS: &[&str] = &[
    r"\fixme", r"\FIXME", r"\todo", r"\TODO", r"\todoin", r"\missingfigure", r"\XXX", r"\xxx",
];

/// Plain-text markers of an unfinished file, matched case-insensitively
pub const DRAFT_TOKENS: &[&str] = &[
    "todo",
    "tbd",
    "fixme",
    "xxx",
    "fill in",
    "to be completed",
    "to be filled",
];

/// File name fragments that suggest a companion file rather than the paper
pub static NON_MAIN_NAMES: phf::Set<&'static str> = phf_set! {
    "draft", "notes", "slides", "talk", "reply", "response",
};
