//! Theorem-like environment declarations
//!
//! Handles the declarative side of theorem numbering:
//! - `\newtheorem`, `\newtheorem*`, `\spnewtheorem`, `\newmdtheoremenv`
//! - `\declaretheorem[key=value, ...]{env}` (thmtools)
//! - `\newaliascnt{alias}{target}` (aliascnt)
//! - `\numberwithin` / `\counterwithin` parent edges
//! - `\newenvironment` wrappers around a declared environment

use fxhash::{FxHashMap, FxHashSet};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::core::grammar::{braced_group, bracketed_group, control_sequence, skip_whitespace};
use crate::data::constants::{
    default_caption, TheoremKey, CANONICAL_ENVIRONMENT, DECLARETHEOREM_KEYS,
};
use crate::utils::error::{ExtractionWarning, WarningKind};

lazy_static! {
    static ref DECLARATION: Regex = Regex::new(
        r"\\(?P<cmd>newtheorem|spnewtheorem|newmdtheoremenv|declaretheorem)(?P<star>\*?)(?P<tail>[^A-Za-z@]|$)"
    )
    .unwrap();
    static ref ALIAS: Regex =
        Regex::new(r"\\newaliascnt\s*\{\s*([^{}]+?)\s*\}\s*\{\s*([^{}]+?)\s*\}").unwrap();
    static ref COUNTER_PARENT: Regex = Regex::new(
        r"\\(?:numberwithin|counterwithin\*?)\s*\{\s*([^{}]+?)\s*\}\s*\{\s*([^{}]+?)\s*\}"
    )
    .unwrap();
    static ref SWAP_NUMBERS: Regex = Regex::new(r"\\swapnumbers([^A-Za-z@]|$)").unwrap();
    static ref WRAPPER: Regex =
        Regex::new(r"\\(?:re)?newenvironment(?P<tail>[^A-Za-z@]|$)").unwrap();
    static ref BEGIN_ENV: Regex = Regex::new(r"\\begin\s*\{\s*([^{}\s]+)\s*\}").unwrap();
}

/// A declared theorem-like environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TheoremDeclaration {
    /// Environment name
    pub name: String,
    /// Caption printed before the number
    pub caption: String,
    /// Unnumbered environment
    pub starred: bool,
    /// Counter borrowed from another environment
    pub shared: Option<String>,
    /// Counter that resets this one
    pub within: Option<String>,
}

impl TheoremDeclaration {
    /// Create a declaration; an empty caption falls back to the environment name
    pub fn new(name: &str, caption: &str, starred: bool) -> Self {
        let caption = caption.trim();
        Self {
            name: name.to_string(),
            caption: if caption.is_empty() {
                default_caption(name)
            } else {
                caption.to_string()
            },
            starred,
            shared: None,
            within: None,
        }
    }

    pub fn shared_with(mut self, counter: impl Into<String>) -> Self {
        self.shared = Some(counter.into());
        self
    }

    pub fn numbered_within(mut self, counter: impl Into<String>) -> Self {
        self.within = Some(counter.into());
        self
    }

    /// Name of the counter this environment increments
    pub fn counter(&self) -> &str {
        self.shared.as_deref().unwrap_or(&self.name)
    }
}

/// Declared environments in declaration order
#[derive(Debug, Default, Clone)]
pub struct DeclarationTable {
    entries: IndexMap<String, TheoremDeclaration>,
}

impl DeclarationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declaration.
    ///
    /// The first declaration of an environment wins. A declaration with both
    /// a shared and a parent counter keeps the shared one.
    pub fn declare(&mut self, mut decl: TheoremDeclaration, warnings: &mut Vec<ExtractionWarning>) {
        if decl.name.is_empty() || decl.name == CANONICAL_ENVIRONMENT {
            return;
        }

        if self.entries.contains_key(&decl.name) {
            debug!(environment = %decl.name, "ignoring repeated declaration");
            warnings.push(
                ExtractionWarning::new(
                    WarningKind::DuplicateDeclaration,
                    "environment declared more than once; keeping the first declaration",
                )
                .with_source(decl.name),
            );
            return;
        }

        // `[env]` naming the environment itself is kept: with aliascnt it
        // names an alias resolved later
        if decl.shared.is_some() && decl.within.is_some() {
            warn!(environment = %decl.name, "declaration has both a shared and a parent counter");
            warnings.push(
                ExtractionWarning::new(
                    WarningKind::ConflictingCounter,
                    "shared counter and parent counter are exclusive; ignoring the parent",
                )
                .with_source(decl.name.clone()),
            );
            decl.within = None;
        }

        self.entries.insert(decl.name.clone(), decl);
    }

    pub fn get(&self, name: &str) -> Option<&TheoremDeclaration> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TheoremDeclaration> {
        self.entries.values()
    }

    /// Environment names in declaration order
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite counter references that name an alias to the canonical counter
    pub fn apply_aliases(&mut self, aliases: &FxHashMap<String, String>) {
        if aliases.is_empty() {
            return;
        }
        for decl in self.entries.values_mut() {
            if let Some(shared) = decl.shared.take() {
                let target = resolve_alias(aliases, &shared);
                decl.shared = (target != decl.name).then_some(target);
            }
            if let Some(within) = decl.within.take() {
                decl.within = Some(resolve_alias(aliases, &within));
            }
        }
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// Collect every theorem declaration in the text, in document order
pub fn collect_declarations(input: &str, table: &mut DeclarationTable) -> Vec<ExtractionWarning> {
    let mut warnings = Vec::new();

    for caps in DECLARATION.captures_iter(input) {
        let (Some(cmd), Some(tail)) = (caps.name("cmd"), caps.name("tail")) else {
            continue;
        };
        let starred = caps.name("star").map_or(false, |m| !m.as_str().is_empty());
        let pos = tail.start();

        let parsed = match cmd.as_str() {
            "newtheorem" | "spnewtheorem" => parse_newtheorem(input, pos, starred),
            "newmdtheoremenv" => {
                let after_opts = match bracketed_group(input, pos) {
                    Ok(Some(group)) => group.end(),
                    _ => pos,
                };
                parse_newtheorem(input, after_opts, starred)
            }
            _ => parse_declaretheorem(input, pos, starred),
        };

        match parsed {
            Some(decls) => {
                for decl in decls {
                    table.declare(decl, &mut warnings);
                }
            }
            None => debug!(offset = cmd.start(), command = cmd.as_str(), "unparsable declaration"),
        }
    }

    warnings
}

/// `\newtheorem{env}[shared]{Caption}[within]`, optional beamer overlay first
fn parse_newtheorem(input: &str, pos: usize, starred: bool) -> Option<Vec<TheoremDeclaration>> {
    let mut cursor = skip_overlay(input, pos);

    let env = braced_group(input, cursor).ok()??;
    cursor = env.end();

    let mut shared = None;
    if let Ok(Some(group)) = bracketed_group(input, cursor) {
        shared = non_empty(group.inner(input));
        cursor = group.end();
    }

    let caption = braced_group(input, cursor).ok()??;
    cursor = caption.end();

    let mut within = None;
    if shared.is_none() {
        if let Ok(Some(group)) = bracketed_group(input, cursor) {
            within = non_empty(group.inner(input));
        }
    }

    let mut decl = TheoremDeclaration::new(env.inner(input).trim(), caption.inner(input), starred);
    decl.shared = shared;
    decl.within = within;
    Some(vec![decl])
}

/// `\declaretheorem[opts]{env1,env2}` or `\declaretheorem{env}[opts]`
fn parse_declaretheorem(input: &str, pos: usize, starred: bool) -> Option<Vec<TheoremDeclaration>> {
    let mut options = None;
    let mut cursor = pos;

    if let Ok(Some(group)) = bracketed_group(input, cursor) {
        options = Some(group.inner(input));
        cursor = group.end();
    }

    let envs = braced_group(input, cursor).ok()??;
    cursor = envs.end();

    if options.is_none() {
        if let Ok(Some(group)) = bracketed_group(input, cursor) {
            options = Some(group.inner(input));
        }
    }

    let mut caption = None;
    let mut numbered = !starred;
    let mut shared = None;
    let mut within = None;
    for (key, value) in options.map(key_values).unwrap_or_default() {
        match DECLARETHEOREM_KEYS.get(key.as_str()) {
            Some(TheoremKey::Caption) => caption = Some(value),
            Some(TheoremKey::Shared) => shared = non_empty(&value),
            Some(TheoremKey::Within) => within = non_empty(&value),
            Some(TheoremKey::Numbered) => {
                numbered = !matches!(value.as_str(), "no" | "false");
            }
            None => {}
        }
    }

    let decls = envs
        .inner(input)
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            let mut decl = TheoremDeclaration::new(name, caption.as_deref().unwrap_or(""), !numbered);
            decl.shared = shared.clone();
            decl.within = within.clone();
            decl
        })
        .collect();
    Some(decls)
}

/// Split `key=value, key2={a,b}` at top-level commas
fn key_values(options: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    let mut push = |item: &str| {
        let (key, value) = match item.split_once('=') {
            Some((k, v)) => (k, v),
            None => (item, ""),
        };
        let key = key.trim();
        if !key.is_empty() {
            let value = value.trim();
            let value = value
                .strip_prefix('{')
                .and_then(|v| v.strip_suffix('}'))
                .unwrap_or(value);
            pairs.push((key.to_string(), value.trim().to_string()));
        }
    };

    for (i, c) in options.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                push(&options[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    push(&options[start..]);

    pairs
}

fn skip_overlay(input: &str, pos: usize) -> usize {
    let start = skip_whitespace(input, pos);
    if input[start..].starts_with('<') {
        if let Some(close) = input[start..].find('>') {
            return start + close + 1;
        }
    }
    pos
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

// ============================================================================
// Counters
// ============================================================================

/// Collect `\newaliascnt{alias}{target}` pairs
pub fn collect_aliases(input: &str) -> FxHashMap<String, String> {
    ALIAS
        .captures_iter(input)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

/// Follow alias links to the canonical counter name
pub fn resolve_alias(aliases: &FxHashMap<String, String>, name: &str) -> String {
    let mut current = name;
    let mut seen = FxHashSet::default();

    while let Some(next) = aliases.get(current) {
        if !seen.insert(current) {
            break;
        }
        current = next;
    }

    current.to_string()
}

/// `\numberwithin{child}{parent}` and `\counterwithin{child}{parent}` edges
pub fn collect_counter_parents(input: &str) -> Vec<(String, String)> {
    COUNTER_PARENT
        .captures_iter(input)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

/// Whether the document swaps caption and number (`\swapnumbers`)
pub fn has_swapnumbers(input: &str) -> bool {
    SWAP_NUMBERS.is_match(input)
}

// ============================================================================
// Environment Wrappers
// ============================================================================

/// Resolve `\newenvironment{name}{begin}{end}` definitions.
///
/// When the begin code opens a declared environment (`\begin{env}` or the
/// `\env` form), `name` is registered as numbering on that environment's
/// counter. Every environment definition is removed from the returned text so
/// its begin code is never located as an occurrence.
pub fn resolve_environment_wrappers(
    input: &str,
    table: &mut DeclarationTable,
) -> (String, Vec<ExtractionWarning>) {
    let mut result = String::with_capacity(input.len());
    let mut warnings = Vec::new();
    let mut last_end = 0;
    let mut wrappers = 0usize;

    for caps in WRAPPER.captures_iter(input) {
        let (Some(whole), Some(tail)) = (caps.get(0), caps.name("tail")) else {
            continue;
        };
        if whole.start() < last_end {
            continue;
        }

        let mut pos = tail.start();
        if input[pos..].starts_with('*') {
            pos += 1;
        }

        match parse_wrapper(input, pos) {
            Ok(Some(wrapper)) => {
                if let Some(wrapped) = wrapped_environment(&wrapper.begin_code, table) {
                    let decl = synthesize(&wrapper.name, wrapped);
                    debug!(environment = %wrapper.name, wraps = %wrapped.name, "wrapper environment");
                    table.declare(decl, &mut warnings);
                    wrappers += 1;
                }
                result.push_str(&input[last_end..whole.start()]);
                last_end = wrapper.end;
            }
            Ok(None) => {}
            Err(()) => {
                let snippet: String = input[whole.start()..].chars().take(40).collect();
                warn!(offset = whole.start(), "environment definition with unmatched brace");
                warnings.push(
                    ExtractionWarning::new(
                        WarningKind::UnterminatedDefinition,
                        "environment definition has no closing brace",
                    )
                    .with_source(snippet),
                );
            }
        }
    }

    result.push_str(&input[last_end..]);
    debug!(wrappers, "resolved environment wrappers");
    (result, warnings)
}

struct Wrapper {
    name: String,
    begin_code: String,
    end: usize,
}

fn parse_wrapper(input: &str, pos: usize) -> Result<Option<Wrapper>, ()> {
    let Some(name) = braced_group(input, pos).map_err(|_| ())? else {
        return Ok(None);
    };
    let mut cursor = name.end();

    // [arity][default]
    for _ in 0..2 {
        match bracketed_group(input, cursor) {
            Ok(Some(group)) => cursor = group.end(),
            Ok(None) => break,
            Err(_) => return Err(()),
        }
    }

    let Some(begin) = braced_group(input, cursor).map_err(|_| ())? else {
        return Ok(None);
    };
    let Some(end) = braced_group(input, begin.end()).map_err(|_| ())? else {
        return Ok(None);
    };

    Ok(Some(Wrapper {
        name: name.inner(input).trim().to_string(),
        begin_code: begin.inner(input).to_string(),
        end: end.end(),
    }))
}

/// First declared environment opened by the begin code of a wrapper
fn wrapped_environment<'t>(
    begin_code: &str,
    table: &'t DeclarationTable,
) -> Option<&'t TheoremDeclaration> {
    let mut candidates: Vec<(usize, &str)> = BEGIN_ENV
        .captures_iter(begin_code)
        .filter_map(|caps| Some((caps.get(0)?.start(), caps.get(1)?.as_str())))
        .collect();

    let mut pos = 0;
    while let Some(found) = begin_code[pos..].find('\\') {
        let at = pos + found;
        let Some((name, end)) = control_sequence(begin_code, at) else {
            break;
        };
        candidates.push((at, name));
        pos = end;
    }

    candidates.sort_by_key(|(offset, _)| *offset);
    candidates.into_iter().find_map(|(_, name)| table.get(name))
}

/// Declaration for a wrapper; it keeps its own counter, numbered the way the
/// wrapped environment is
fn synthesize(name: &str, wrapped: &TheoremDeclaration) -> TheoremDeclaration {
    TheoremDeclaration {
        shared: wrapped.shared.clone(),
        within: wrapped.within.clone(),
        ..TheoremDeclaration::new(name, &wrapped.caption, wrapped.starred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn collect(input: &str) -> (DeclarationTable, Vec<ExtractionWarning>) {
        let mut table = DeclarationTable::new();
        let warnings = collect_declarations(input, &mut table);
        (table, warnings)
    }

    #[test]
    fn test_newtheorem_forms() {
        let (table, warnings) = collect(
            r"\newtheorem{thm}{Theorem}[section]
              \newtheorem{lem}[thm]{Lemma}
              \newtheorem*{rem}{Remark}",
        );
        assert!(warnings.is_empty());
        assert_eq!(table.names(), vec!["thm", "lem", "rem"]);

        let thm = table.get("thm").unwrap();
        assert_eq!(thm.within.as_deref(), Some("section"));
        assert_eq!(thm.counter(), "thm");

        let lem = table.get("lem").unwrap();
        assert_eq!(lem.caption, "Lemma");
        assert_eq!(lem.counter(), "thm");

        assert!(table.get("rem").unwrap().starred);
    }

    #[test]
    fn test_empty_caption_defaults_to_name() {
        let (table, _) = collect(r"\newtheorem{claim}{}");
        assert_eq!(table.get("claim").unwrap().caption, "Claim");
    }

    #[test]
    fn test_declaretheorem_options() {
        let (table, _) = collect(
            r"\declaretheorem[name=Theorem, numberwithin=section]{theorem}
              \declaretheorem[sibling=theorem]{lemma}
              \declaretheorem[numbered=no, name={Main Claim}]{mainclaim}",
        );

        let theorem = table.get("theorem").unwrap();
        assert_eq!(theorem.caption, "Theorem");
        assert_eq!(theorem.within.as_deref(), Some("section"));

        let lemma = table.get("lemma").unwrap();
        assert_eq!(lemma.caption, "Lemma");
        assert_eq!(lemma.shared.as_deref(), Some("theorem"));

        let claim = table.get("mainclaim").unwrap();
        assert!(claim.starred);
        assert_eq!(claim.caption, "Main Claim");
    }

    #[test]
    fn test_declaretheorem_trailing_options() {
        let (table, _) = collect(r"\declaretheorem{conj}[title=Conjecture]");
        assert_eq!(table.get("conj").unwrap().caption, "Conjecture");
    }

    #[test]
    fn test_spnewtheorem_and_mdframed() {
        let (table, _) = collect(
            r"\spnewtheorem{prop}[theorem]{Proposition}{\bfseries}{\itshape}
              \newmdtheoremenv[linewidth=1pt]{boxthm}{Boxed Theorem}[section]",
        );
        assert_eq!(table.get("prop").unwrap().shared.as_deref(), Some("theorem"));
        assert_eq!(table.get("boxthm").unwrap().within.as_deref(), Some("section"));
    }

    #[test]
    fn test_beamer_overlay_skipped() {
        let (table, _) = collect(r"\newtheorem<+->{fact}{Fact}");
        assert_eq!(table.get("fact").unwrap().caption, "Fact");
    }

    #[test]
    fn test_first_declaration_wins() {
        let (table, warnings) = collect(r"\newtheorem{thm}{Theorem}\newtheorem{thm}{Satz}");
        assert_eq!(table.get("thm").unwrap().caption, "Theorem");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::DuplicateDeclaration);
    }

    #[test]
    fn test_shared_and_within_conflict() {
        let (table, warnings) = collect(r"\declaretheorem[sibling=thm, within=section]{lem}");
        let lem = table.get("lem").unwrap();
        assert_eq!(lem.shared.as_deref(), Some("thm"));
        assert_eq!(lem.within, None);
        assert_eq!(warnings[0].kind, WarningKind::ConflictingCounter);
    }

    #[test]
    fn test_alias_resolution() {
        let text = r"\newaliascnt{lemma}{theorem}\newaliascnt{cor}{lemma}
                     \newtheorem{theorem}{Theorem}
                     \newtheorem{cor}[cor]{Corollary}";
        let aliases = collect_aliases(text);
        assert_eq!(resolve_alias(&aliases, "cor"), "theorem");

        let (mut table, _) = collect(text);
        table.apply_aliases(&aliases);
        assert_eq!(table.get("cor").unwrap().counter(), "theorem");
    }

    #[test]
    fn test_alias_cycle_terminates() {
        let aliases = collect_aliases(r"\newaliascnt{a}{b}\newaliascnt{b}{a}");
        let resolved = resolve_alias(&aliases, "a");
        assert!(resolved == "a" || resolved == "b");
    }

    #[test]
    fn test_counter_parents() {
        let parents = collect_counter_parents(
            r"\numberwithin{equation}{section} \counterwithin*{thm}{subsection}",
        );
        assert_eq!(
            parents,
            vec![
                ("equation".to_string(), "section".to_string()),
                ("thm".to_string(), "subsection".to_string()),
            ]
        );
    }

    #[test]
    fn test_swapnumbers() {
        assert!(has_swapnumbers(r"\swapnumbers"));
        assert!(!has_swapnumbers(r"\swapnumbersfoo"));
    }

    #[test]
    fn test_wrapper_environment() {
        let (mut table, _) = collect(r"\newtheorem{thm}{Theorem}[section]");
        let (text, warnings) = resolve_environment_wrappers(
            "\\newenvironment{mainthm}[1][]{\\begin{thm}[#1]}{\\end{thm}}\nbody",
            &mut table,
        );

        assert!(warnings.is_empty());
        assert_eq!(text, "\nbody");
        let wrapper = table.get("mainthm").unwrap();
        assert_eq!(wrapper.caption, "Theorem");
        assert_eq!(wrapper.counter(), "mainthm");
        assert_eq!(wrapper.within.as_deref(), Some("section"));
    }

    #[test]
    fn test_wrapper_inherits_shared_counter() {
        let (mut table, _) = collect(
            r"\newtheorem{thm}{Theorem}
              \newtheorem{lem}[thm]{Lemma}",
        );
        resolve_environment_wrappers(r"\newenvironment{keylem}{\begin{lem}}{\end{lem}}", &mut table);
        let wrapper = table.get("keylem").unwrap();
        assert_eq!(wrapper.caption, "Lemma");
        assert_eq!(wrapper.counter(), "thm");
        assert_eq!(wrapper.within, None);
    }

    #[test]
    fn test_wrapper_control_word_form() {
        let (mut table, _) = collect(r"\newtheorem*{rem}{Remark}");
        resolve_environment_wrappers(r"\newenvironment{note}{\rem}{\endrem}", &mut table);
        let note = table.get("note").unwrap();
        assert!(note.starred);
        assert_eq!(note.shared, None);
    }

    #[test]
    fn test_unrelated_environment_removed_not_declared() {
        let mut table = DeclarationTable::new();
        let (text, _) = resolve_environment_wrappers(
            r"\newenvironment{sketch}{\begin{proof}}{\end{proof}}x",
            &mut table,
        );
        assert_eq!(text, "x");
        assert!(table.is_empty());
    }
}
