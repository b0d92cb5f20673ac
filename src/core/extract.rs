//! Body/label extraction and bundling
//!
//! Every theorem-like environment is rewritten to one canonical tag pair so
//! a single scan retrieves all bodies in document order. Labels are resolved
//! in reverse order: when two statements carry the same label, the later one
//! keeps it. Bodies are then paired positionally with the numbered titles,
//! main matter first.

use fxhash::FxHashSet;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::counters::NumberingPlan;
use crate::core::grammar::{braced_group, ends_control_word};
use crate::core::locate::{
    appendix_cut, begin_tag, end_tag, locate, structural_markers, EnvironmentStrategy, Occurrence,
    StructuralMarker,
};
use crate::core::normalize::normalize;
use crate::core::options::ExtractOptions;
use crate::data::constants::CANONICAL_ENVIRONMENT;
use crate::utils::error::{ExtractionOutput, ExtractionWarning, WarningKind};

lazy_static! {
    static ref LABEL_KEYWORD: Regex = Regex::new(r"\\label").unwrap();
    static ref LINE_BREAK: Regex = Regex::new(r"\s*\n\s*").unwrap();
}

/// One extracted statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheoremRecord {
    /// Numbered heading, e.g. `Theorem 2.1.`
    pub title: String,
    /// Statement text without labels, on one line
    pub body: String,
    /// Cross-reference label
    pub label: Option<String>,
}

impl TheoremRecord {
    pub fn new(title: impl Into<String>, body: impl Into<String>, label: Option<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            label,
        }
    }
}

/// A canonical region in the rewritten buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CanonicalRegion {
    /// Offset of `\begin`
    start: usize,
    body_start: usize,
    body_end: usize,
}

/// Rewrite every listed environment to the canonical tag pair
pub fn canonicalize(text: &str, environments: &[String]) -> String {
    let mut result = text.to_string();
    let canonical_begin = begin_tag(CANONICAL_ENVIRONMENT);
    let canonical_end = end_tag(CANONICAL_ENVIRONMENT);

    for environment in environments {
        result = result
            .replace(&begin_tag(environment), &canonical_begin)
            .replace(&end_tag(environment), &canonical_end);
    }
    result
}

/// Canonical regions ordered by their `\begin`, nested regions included
fn canonical_regions(text: &str) -> Vec<CanonicalRegion> {
    let begin = begin_tag(CANONICAL_ENVIRONMENT);
    let end = end_tag(CANONICAL_ENVIRONMENT);

    let mut regions = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut pos = 0;

    loop {
        let next_begin = text[pos..].find(&begin).map(|i| pos + i);
        let next_end = text[pos..].find(&end).map(|i| pos + i);

        match (next_begin, next_end) {
            (Some(b), Some(e)) if b < e => {
                open.push(b);
                pos = b + begin.len();
            }
            (Some(b), None) => {
                open.push(b);
                pos = b + begin.len();
            }
            (_, Some(e)) => {
                if let Some(start) = open.pop() {
                    regions.push(CanonicalRegion {
                        start,
                        body_start: start + begin.len(),
                        body_end: e,
                    });
                }
                pos = e + end.len();
            }
            (None, None) => break,
        }
    }

    regions.sort_by_key(|r| r.start);
    regions
}

/// Join lines and drop every `\label{..}`; returns the body and its first label
fn clean_body(raw: &str) -> (String, Option<String>) {
    let joined = LINE_BREAK.replace_all(raw, " ");
    let mut body = String::with_capacity(joined.len());
    let mut label = None;
    let mut last_end = 0;

    for found in LABEL_KEYWORD.find_iter(&joined) {
        if found.start() < last_end || !ends_control_word(&joined, found.end()) {
            continue;
        }
        // A `\label` without a closed group stays in the body
        let Ok(Some(group)) = braced_group(&joined, found.end()) else {
            continue;
        };
        body.push_str(&joined[last_end..found.start()]);
        last_end = group.end();

        let name = group.inner(&joined).trim();
        if label.is_none() && !name.is_empty() {
            label = Some(name.to_string());
        }
    }
    body.push_str(&joined[last_end..]);

    (body.trim().to_string(), label)
}

/// Bodies and labels for every region, resolving duplicate labels so the
/// last statement in the document keeps the label
fn bodies_and_labels(text: &str, regions: &[CanonicalRegion]) -> Vec<(String, Option<String>)> {
    let mut seen = FxHashSet::default();
    let mut out = vec![(String::new(), None); regions.len()];

    for (i, region) in regions.iter().enumerate().rev() {
        let (body, label) = clean_body(&text[region.body_start..region.body_end]);
        let label = label.filter(|label| seen.insert(label.clone()));
        out[i] = (body, label);
    }

    out
}

/// Pair titles with bodies positionally; missing bodies fall back to the
/// located region's own text
fn bundle(
    titles: Vec<String>,
    bodies: &[(String, Option<String>)],
    occurrences: &[Occurrence],
    text: &str,
    region: &str,
    warnings: &mut Vec<ExtractionWarning>,
) -> Vec<TheoremRecord> {
    if bodies.len() != titles.len() {
        warn!(
            region,
            bodies = bodies.len(),
            titles = titles.len(),
            "statement count mismatch, numbering may be approximate"
        );
        warnings.push(ExtractionWarning::new(
            WarningKind::CountMismatch,
            format!(
                "{} region: {} bodies for {} numbered statements",
                region,
                bodies.len(),
                titles.len()
            ),
        ));
    }

    titles
        .into_iter()
        .enumerate()
        .map(|(i, title)| match bodies.get(i) {
            Some((body, label)) => TheoremRecord::new(title, body.clone(), label.clone()),
            None => {
                let raw = occurrences.get(i).map_or("", |o| o.body(text));
                let (body, _) = clean_body(raw);
                TheoremRecord::new(title, body, None)
            }
        })
        .collect()
}

/// Extract every theorem-like statement of a document
pub fn extract_with_options(raw: &str, options: &ExtractOptions) -> ExtractionOutput {
    let document = normalize(raw);
    let mut warnings = document.warnings.clone();

    let strategy = EnvironmentStrategy::resolve(&document.declarations, options);
    let located = locate(&document.text, &strategy);
    warnings.extend(located.warnings.iter().cloned());

    let markers = structural_markers(&document.text);
    let (main_markers, appendix_markers): (Vec<StructuralMarker>, Vec<StructuralMarker>) =
        match located.cut {
            Some(cut) => markers.iter().copied().partition(|m| m.offset < cut),
            None => (markers.clone(), Vec::new()),
        };

    let plan = NumberingPlan::new(&document, &markers, options);
    let (main_titles, found) = plan.number(&located.main, &main_markers, false);
    warnings.extend(found);
    let (appendix_titles, _) = plan.number(&located.appendix, &appendix_markers, true);

    let canonical = canonicalize(&document.text, strategy.environments());
    let regions = canonical_regions(&canonical);
    let bodies = bodies_and_labels(&canonical, &regions);

    let split = match appendix_cut(&canonical) {
        Some(cut) => regions.partition_point(|r| r.start < cut),
        None => regions.len(),
    };
    let (main_bodies, appendix_bodies) = bodies.split_at(split);

    let mut records = bundle(
        main_titles,
        main_bodies,
        &located.main,
        &document.text,
        "main",
        &mut warnings,
    );
    records.extend(bundle(
        appendix_titles,
        appendix_bodies,
        &located.appendix,
        &document.text,
        "appendix",
        &mut warnings,
    ));

    let located_count = records.len();
    let records = apply_options(records, options);

    debug!(
        located = located_count,
        records = records.len(),
        warnings = warnings.len(),
        "extracted statements"
    );

    ExtractionOutput::with_warnings(records, warnings)
}

/// Kind filter, then title deduplication
fn apply_options(records: Vec<TheoremRecord>, options: &ExtractOptions) -> Vec<TheoremRecord> {
    let records = records.into_iter().filter(|r| options.keeps(&r.title));

    if !options.dedupe_titles {
        return records.collect();
    }

    let mut by_title: IndexMap<String, TheoremRecord> = IndexMap::new();
    for record in records {
        by_title.insert(record.title.clone(), record);
    }
    by_title.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn extract(raw: &str) -> Vec<TheoremRecord> {
        extract_with_options(raw, &ExtractOptions::default()).records
    }

    #[test]
    fn test_canonical_regions_nested() {
        let text = canonicalize(
            r"\begin{thm}a \begin{lem}b\end{lem} c\end{thm}",
            &["thm".to_string(), "lem".to_string()],
        );
        let regions = canonical_regions(&text);

        assert_eq!(regions.len(), 2);
        assert!(regions[0].start < regions[1].start);
        assert_eq!(&text[regions[1].body_start..regions[1].body_end], "b");
    }

    #[test]
    fn test_clean_body() {
        let (body, label) = clean_body("\n  Every $x$ \\label{ thm:x }\n  is fine.\\label{other}\n");
        assert_eq!(body, "Every $x$  is fine.");
        assert_eq!(label.as_deref(), Some("thm:x"));
    }

    #[test]
    fn test_clean_body_nested_label_braces() {
        let (body, label) = clean_body("Body.\\label{thm:{x}} More \\label{a{b}}");
        assert_eq!(body, "Body. More");
        assert_eq!(label.as_deref(), Some("thm:{x}"));
    }

    #[test]
    fn test_clean_body_keeps_longer_control_word() {
        let (body, label) = clean_body("See \\labelcref{x}.");
        assert_eq!(body, "See \\labelcref{x}.");
        assert_eq!(label, None);
    }

    #[test]
    fn test_duplicate_label_kept_by_last() {
        let records = extract(
            r"\begin{theorem}\label{x}First\end{theorem}
              \begin{theorem}\label{x}Second\end{theorem}",
        );
        assert_eq!(records[0].label, None);
        assert_eq!(records[1].label.as_deref(), Some("x"));
    }

    #[test]
    fn test_bodies_follow_document_order() {
        let records = extract(
            r"\newtheorem{thm}{Theorem}\newtheorem{lem}[thm]{Lemma}
              \begin{document}
              \begin{lem}B\end{lem}
              \begin{thm}A\end{thm}
              \end{document}",
        );
        assert_eq!(
            records,
            vec![
                TheoremRecord::new("Lemma 1.", "B", None),
                TheoremRecord::new("Theorem 2.", "A", None),
            ]
        );
    }

    #[test]
    fn test_nested_statement_count() {
        let records = extract(r"\begin{theorem}outer \begin{claim}inner\end{claim} rest\end{theorem}");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Theorem 1.");
        assert_eq!(records[1].title, "Claim 1.");
        assert_eq!(records[1].body, "inner");
    }

    #[test]
    fn test_kinds_filter_and_dedupe() {
        let raw = r"\begin{theorem}A\end{theorem}
                    \begin{remark}R\end{remark}
                    \begin{theorem}B\end{theorem}";
        let output = extract_with_options(raw, &ExtractOptions::statements());
        let titles: Vec<&str> = output.records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Theorem 1.", "Theorem 2."]);
    }

    #[test]
    fn test_dedupe_last_record_wins_in_place() {
        let options = ExtractOptions {
            dedupe_titles: true,
            ..ExtractOptions::default()
        };
        let raw = r"\newtheorem*{rem}{Remark}
                    \begin{rem}one\end{rem}\begin{rem}two\end{rem}";
        let output = extract_with_options(raw, &options);
        assert_eq!(output.records, vec![TheoremRecord::new("Remark", "two", None)]);
    }

    #[test]
    fn test_empty_document() {
        let output = extract_with_options("Just prose.", &ExtractOptions::default());
        assert!(output.is_empty());
        assert!(!output.has_warnings());
    }
}
