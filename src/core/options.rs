//! Extraction options

use serde::{Deserialize, Serialize};

use crate::data::constants::DEFAULT_THEOREM_ENVIRONMENTS;

/// Statement kinds kept by [`ExtractOptions::statements`]
pub const STATEMENT_KINDS: &[&str] = &["theorem", "lemma", "proposition", "corollary"];

/// Options for theorem extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// Environments scanned when the document declares none
    /// Default: theorem, lemma, proposition, corollary, claim, definition, remark, example
    pub default_environments: Vec<String>,

    /// Counters rendered alphabetically in the appendix
    /// Default: None (`chapter` when the document has chapters, else `section`)
    pub alpha_roots: Option<Vec<String>>,

    /// Keep only records whose caption's first word is one of these (case-insensitive)
    /// Default: None (keep everything)
    pub kinds: Option<Vec<String>>,

    /// Collapse records with the same title, the later one replacing the earlier
    /// Default: false
    pub dedupe_titles: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            default_environments: DEFAULT_THEOREM_ENVIRONMENTS
                .iter()
                .map(|env| env.to_string())
                .collect(),
            alpha_roots: None,
            kinds: None,
            dedupe_titles: false,
        }
    }
}

impl ExtractOptions {
    /// Create new options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Theorems, lemmas, propositions and corollaries only, one record per title
    pub fn statements() -> Self {
        Self {
            kinds: Some(STATEMENT_KINDS.iter().map(|k| k.to_string()).collect()),
            dedupe_titles: true,
            ..Self::default()
        }
    }

    pub fn with_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kinds = Some(kinds.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_alpha_roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alpha_roots = Some(roots.into_iter().map(Into::into).collect());
        self
    }

    /// Whether a numbered title passes the kind filter
    pub fn keeps(&self, title: &str) -> bool {
        let Some(kinds) = &self.kinds else {
            return true;
        };
        let kind = title
            .split_whitespace()
            .find(|word| !is_number_token(word))
            .unwrap_or("");
        kinds.iter().any(|k| k.eq_ignore_ascii_case(kind))
    }
}

/// Formatted numbers look like `2.`, `1.3.` or `A.1.`
fn is_number_token(word: &str) -> bool {
    word.ends_with('.')
        && word
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase() || c == '.')
}
