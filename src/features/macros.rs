//! LaTeX Macro Expansion Module
//!
//! Collects user macro definitions (`\def` family, `\newcommand` family and
//! `\DeclareMathOperator`), removes them from the document and substitutes
//! their call sites at the text level.
//!
//! Expansion happens in two steps. First the definition table is resolved to
//! a fixed point: every body is expanded against the other definitions in
//! dependency order, and definitions that reach themselves are dropped.
//! Then the document is rewritten in one left-to-right pass over literal call
//! sites. Because bodies are already resolved, the document pass never
//! re-scans its own output and always terminates.

use fxhash::{FxHashMap, FxHashSet};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::core::grammar::{
    braced_group, bracketed_group, control_sequence, ends_control_word, is_control_letter,
    skip_whitespace, Group,
};
use crate::utils::error::{ExtractionWarning, WarningKind};

/// Highest positional parameter TeX supports
pub const MAX_ARITY: usize = 9;

/// Macro argument specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgSpec {
    /// Required argument in braces: {arg}
    Required,
    /// Optional argument in brackets: `[arg]`
    Optional(String), // default value
}

/// A macro definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    /// Macro name (without backslash)
    pub name: String,
    /// Number of arguments
    pub num_args: usize,
    /// Argument specifications
    pub arg_specs: Vec<ArgSpec>,
    /// Replacement text (with #1, #2, etc. placeholders)
    pub replacement: String,
}

impl Macro {
    /// Create a simple macro with no arguments
    pub fn simple(name: &str, replacement: &str) -> Self {
        Self::with_args(name, 0, replacement)
    }

    /// Create a macro with required arguments
    pub fn with_args(name: &str, num_args: usize, replacement: &str) -> Self {
        let num_args = num_args.min(MAX_ARITY);
        Self {
            name: name.to_string(),
            num_args,
            arg_specs: vec![ArgSpec::Required; num_args],
            replacement: replacement.to_string(),
        }
    }

    /// Create a macro with an optional first argument
    pub fn with_optional(name: &str, num_args: usize, default: &str, replacement: &str) -> Self {
        let num_args = num_args.clamp(1, MAX_ARITY);
        let mut arg_specs = vec![ArgSpec::Optional(default.to_string())];
        arg_specs.extend(vec![ArgSpec::Required; num_args - 1]);

        Self {
            name: name.to_string(),
            num_args,
            arg_specs,
            replacement: replacement.to_string(),
        }
    }

    /// Substitute `#1..#9` with the given arguments; `##` becomes `#`
    pub fn instantiate(&self, args: &[String]) -> String {
        let mut result = String::with_capacity(self.replacement.len());
        let mut chars = self.replacement.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '#' {
                result.push(c);
                continue;
            }
            match chars.peek().copied() {
                Some('#') => {
                    chars.next();
                    result.push('#');
                }
                Some(d @ '1'..='9') => {
                    let index = d as usize - '1' as usize;
                    match args.get(index) {
                        Some(arg) if index < self.num_args => {
                            chars.next();
                            result.push_str(arg);
                        }
                        _ => result.push('#'),
                    }
                }
                _ => result.push('#'),
            }
        }

        result
    }
}

/// Which definition commands a collection pass looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFamily {
    /// `\def`, `\edef`, `\gdef`, `\xdef`
    Def,
    /// `\newcommand`, `\renewcommand`, `\providecommand`, `\DeclareRobustCommand`
    NewCommand,
    /// `\DeclareMathOperator` and its starred form
    MathOperator,
}

lazy_static! {
    static ref DEF_KEYWORD: Regex =
        Regex::new(r"\\(?:(?:e|g|x)?def|let)(?P<tail>[^A-Za-z@]|$)").unwrap();
    static ref NEWCOMMAND_KEYWORD: Regex = Regex::new(
        r"\\(?:newcommand|renewcommand|providecommand|DeclareRobustCommand)(?P<tail>[^A-Za-z@]|$)"
    )
    .unwrap();
    static ref OPERATOR_KEYWORD: Regex =
        Regex::new(r"\\DeclareMathOperator(?P<tail>[^A-Za-z@]|$)").unwrap();
}

impl DefinitionFamily {
    fn keyword(&self) -> &'static Regex {
        match self {
            DefinitionFamily::Def => &DEF_KEYWORD,
            DefinitionFamily::NewCommand => &NEWCOMMAND_KEYWORD,
            DefinitionFamily::MathOperator => &OPERATOR_KEYWORD,
        }
    }
}

/// Macro database
#[derive(Debug, Default, Clone)]
pub struct MacroDb {
    /// Defined macros
    macros: FxHashMap<String, Macro>,
}

impl MacroDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a new macro, replacing any previous definition
    pub fn define(&mut self, macro_def: Macro) {
        self.macros.insert(macro_def.name.clone(), macro_def);
    }

    /// Check if a macro is defined
    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Get a macro definition
    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    /// Remove a macro definition
    pub fn undefine(&mut self, name: &str) {
        self.macros.remove(name);
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Names of table macros called from a body
    fn dependencies(&self, body: &str) -> Vec<String> {
        let mut deps = Vec::new();
        let mut pos = 0;
        while let Some(found) = body[pos..].find('\\') {
            let at = pos + found;
            match control_sequence(body, at) {
                Some((name, end)) => {
                    if self.macros.contains_key(name) && !deps.iter().any(|d| d == name) {
                        deps.push(name.to_string());
                    }
                    pos = end;
                }
                None => break,
            }
        }
        deps
    }

    /// Resolve the table to a fixed point.
    ///
    /// Macros that reach themselves through their own body (directly or
    /// through other macros) cannot be resolved by finite substitution and
    /// are removed. Every other body is expanded against the definitions it
    /// depends on, so a single document pass afterwards is complete.
    pub fn resolve(&mut self) -> Vec<ExtractionWarning> {
        let graph = self.dependency_graph();
        let cyclic: Vec<String> = self
            .sorted_names()
            .into_iter()
            .filter(|name| reaches_itself(name, &graph))
            .collect();

        let mut warnings = Vec::new();
        for name in &cyclic {
            warn!(macro_name = %name, "dropping self-referential macro");
            self.macros.remove(name);
            warnings.push(
                ExtractionWarning::new(
                    WarningKind::SelfReferentialMacro,
                    "macro refers to itself and cannot be expanded",
                )
                .with_source(format!("\\{}", name)),
            );
        }

        // What remains is acyclic; dependencies come before dependents
        let graph = self.dependency_graph();
        let mut roots: Vec<&String> = graph.keys().collect();
        roots.sort();
        let mut done = FxHashSet::default();
        let mut order = Vec::with_capacity(graph.len());
        for name in roots {
            post_order(name, &graph, &mut done, &mut order);
        }

        for name in order {
            let Some(current) = self.macros.get(&name) else {
                continue;
            };
            let expanded = expand_macros(&current.replacement, self);
            if let Some(m) = self.macros.get_mut(&name) {
                m.replacement = expanded;
            }
        }

        warnings
    }

    /// Collect every definition of `family`, removing it from the text.
    ///
    /// Returns the text without the definitions. A definition whose body
    /// brace never closes is left in place and reported.
    pub fn collect(&mut self, input: &str, family: DefinitionFamily) -> (String, Vec<ExtractionWarning>) {
        let mut result = String::with_capacity(input.len());
        let mut warnings = Vec::new();
        let mut last_end = 0;

        for caps in family.keyword().captures_iter(input) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let start = whole.start();
            if start < last_end {
                // Nested inside a definition that was already removed
                continue;
            }
            let keyword_end = caps.name("tail").map_or(whole.end(), |m| m.start());
            let command = &input[start + 1..keyword_end];

            match parse_definition(input, keyword_end, command, family) {
                Ok(Some((macro_def, end))) => {
                    let keep_existing = command == "providecommand" && self.is_defined(&macro_def.name);
                    if !keep_existing {
                        self.define(macro_def);
                    }
                    result.push_str(&input[last_end..start]);
                    last_end = end;
                }
                Ok(None) => {}
                Err(open) => {
                    let snippet: String = input[start..].chars().take(40).collect();
                    warn!(offset = start, open, "dropping definition with unmatched brace");
                    warnings.push(
                        ExtractionWarning::new(
                            WarningKind::UnterminatedDefinition,
                            "definition body has no closing brace",
                        )
                        .with_source(snippet),
                    );
                }
            }
        }

        result.push_str(&input[last_end..]);
        debug!(?family, macros = self.len(), "collected definitions");
        (result, warnings)
    }
}

impl MacroDb {
    fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.macros.keys().cloned().collect();
        names.sort();
        names
    }

    fn dependency_graph(&self) -> FxHashMap<String, Vec<String>> {
        self.macros
            .iter()
            .map(|(name, m)| (name.clone(), self.dependencies(&m.replacement)))
            .collect()
    }
}

/// Whether a macro can reach its own name through the dependency graph
fn reaches_itself(start: &str, graph: &FxHashMap<String, Vec<String>>) -> bool {
    let mut stack: Vec<&str> = graph
        .get(start)
        .map(|deps| deps.iter().map(String::as_str).collect())
        .unwrap_or_default();
    let mut seen = FxHashSet::default();

    while let Some(name) = stack.pop() {
        if name == start {
            return true;
        }
        if seen.insert(name) {
            if let Some(deps) = graph.get(name) {
                stack.extend(deps.iter().map(String::as_str));
            }
        }
    }

    false
}

/// Post-order walk of an acyclic dependency graph
fn post_order<'a>(
    name: &'a str,
    graph: &'a FxHashMap<String, Vec<String>>,
    done: &mut FxHashSet<&'a str>,
    order: &mut Vec<String>,
) {
    if !done.insert(name) {
        return;
    }
    if let Some(deps) = graph.get(name) {
        for dep in deps {
            post_order(dep, graph, done, order);
        }
    }
    order.push(name.to_string());
}

// ============================================================================
// Definition Parsing
// ============================================================================

/// Parse one definition whose command keyword ends at `pos`.
///
/// `Ok(None)` means the text after the keyword is not a definition we
/// understand; `Err(open)` means a body brace opened at `open` never closes.
fn parse_definition(
    input: &str,
    pos: usize,
    command: &str,
    family: DefinitionFamily,
) -> Result<Option<(Macro, usize)>, usize> {
    match family {
        DefinitionFamily::Def if command == "let" => Ok(parse_let(input, pos)),
        DefinitionFamily::Def => parse_def(input, pos),
        DefinitionFamily::NewCommand => parse_newcommand(input, pos),
        DefinitionFamily::MathOperator => parse_declare_math_operator(input, pos),
    }
}

/// `\def\name#1#2{replacement}`
fn parse_def(input: &str, pos: usize) -> Result<Option<(Macro, usize)>, usize> {
    let name_start = skip_whitespace(input, pos);
    let Some((name, name_end)) = control_sequence(input, name_start) else {
        return Ok(None);
    };

    // Parameter text runs up to the body brace
    let Some(brace) = input[name_end..].find('{').map(|i| name_end + i) else {
        return Ok(None);
    };
    // Delimited parameter text is not supported
    let params = &input[name_end..brace];
    if !params
        .chars()
        .all(|c| c == '#' || c.is_ascii_digit() || c.is_whitespace())
    {
        return Ok(None);
    }
    let num_args = params.matches('#').count();

    let body = capture_body(input, brace)?;
    Ok(Some((
        Macro::with_args(name, num_args, body.inner(input)),
        body.end(),
    )))
}

/// `\let\name\target` or `\let\name=\target`, an alias with no arguments.
/// Letting to a character token is not tracked.
fn parse_let(input: &str, pos: usize) -> Option<(Macro, usize)> {
    let name_start = skip_whitespace(input, pos);
    let (name, name_end) = control_sequence(input, name_start)?;

    let mut cursor = skip_whitespace(input, name_end);
    if input[cursor..].starts_with('=') {
        cursor = skip_whitespace(input, cursor + 1);
    }
    let (target, end) = control_sequence(input, cursor)?;

    Some((Macro::simple(name, &format!("\\{}", target)), end))
}

/// `\newcommand{\name}[n][default]{replacement}` (braces around the name optional)
fn parse_newcommand(input: &str, pos: usize) -> Result<Option<(Macro, usize)>, usize> {
    let mut cursor = pos;
    if input[cursor..].starts_with('*') {
        cursor += 1;
    }

    let Some((name, after_name)) = macro_name(input, cursor) else {
        return Ok(None);
    };
    cursor = after_name;

    let mut num_args = 0;
    if let Ok(Some(group)) = bracketed_group(input, cursor) {
        match group.inner(input).trim().parse::<usize>() {
            Ok(n) => num_args = n,
            Err(_) => return Ok(None),
        }
        cursor = group.end();
    }

    let mut default = None;
    if num_args > 0 {
        if let Ok(Some(group)) = bracketed_group(input, cursor) {
            default = Some(group.inner(input).to_string());
            cursor = group.end();
        }
    }

    let open = skip_whitespace(input, cursor);
    if input.as_bytes().get(open) != Some(&b'{') {
        return Ok(None);
    }
    let body = capture_body(input, open)?;
    let replacement = body.inner(input);

    let macro_def = match default {
        Some(default) => Macro::with_optional(&name, num_args, &default, replacement),
        None => Macro::with_args(&name, num_args, replacement),
    };
    Ok(Some((macro_def, body.end())))
}

/// `\DeclareMathOperator{\name}{text}`, replaced by `\text{text}`
fn parse_declare_math_operator(input: &str, pos: usize) -> Result<Option<(Macro, usize)>, usize> {
    let mut cursor = pos;
    if input[cursor..].starts_with('*') {
        cursor += 1;
    }

    let Some((name, after_name)) = macro_name(input, cursor) else {
        return Ok(None);
    };

    let open = skip_whitespace(input, after_name);
    if input.as_bytes().get(open) != Some(&b'{') {
        return Ok(None);
    }
    let body = capture_body(input, open)?;
    let replacement = format!("\\text{{{}}}", body.inner(input));

    Ok(Some((Macro::simple(&name, &replacement), body.end())))
}

/// Macro name given as `{\name}` or `\name`
fn macro_name(input: &str, pos: usize) -> Option<(String, usize)> {
    let start = skip_whitespace(input, pos);
    match input.as_bytes().get(start) {
        Some(b'{') => {
            let group = braced_group(input, start).ok()??;
            let inner = group.inner(input).trim();
            let (name, end) = control_sequence(inner, 0)?;
            if end != inner.len() {
                return None;
            }
            Some((name.to_string(), group.end()))
        }
        Some(b'\\') => {
            let (name, end) = control_sequence(input, start)?;
            Some((name.to_string(), end))
        }
        _ => None,
    }
}

fn capture_body(input: &str, open: usize) -> Result<Group, usize> {
    match braced_group(input, open) {
        Ok(Some(group)) => Ok(group),
        Ok(None) | Err(_) => Err(open),
    }
}

// ============================================================================
// Macro Expansion
// ============================================================================

/// Expand every call site of a table macro in one left-to-right pass.
///
/// A call site is the macro name (a whole control word) followed by its
/// arguments: braced groups for required arguments, an optional bracket
/// group for an optional first argument. Call sites with missing arguments
/// are left untouched. Replacement text is not re-scanned.
pub fn expand_macros(input: &str, db: &MacroDb) -> String {
    if db.is_empty() {
        return input.to_string();
    }

    let mut result = String::with_capacity(input.len());
    let mut last_end = 0;
    let mut pos = 0;

    while let Some(found) = input[pos..].find('\\') {
        let at = pos + found;
        let Some((name, name_end)) = control_sequence(input, at) else {
            break;
        };
        pos = name_end;

        let Some(macro_def) = db.get(name) else {
            continue;
        };
        let word = name.chars().next().map_or(false, is_control_letter);
        if word && !ends_control_word(input, name_end) {
            continue;
        }

        if let Some((args, end)) = parse_arguments(input, name_end, macro_def) {
            // Arguments are strictly shorter than the input, so this terminates
            let args: Vec<String> = args.iter().map(|arg| expand_macros(arg, db)).collect();
            result.push_str(&input[last_end..at]);
            result.push_str(&macro_def.instantiate(&args));
            last_end = end;
            pos = end;
        }
    }

    result.push_str(&input[last_end..]);
    result
}

/// Parse call-site arguments starting at `pos`; returns them and the end index
fn parse_arguments(input: &str, pos: usize, macro_def: &Macro) -> Option<(Vec<String>, usize)> {
    let mut args = Vec::with_capacity(macro_def.num_args);
    let mut cursor = pos;

    for spec in &macro_def.arg_specs {
        match spec {
            ArgSpec::Optional(default) => match bracketed_group(input, cursor) {
                Ok(Some(group)) => {
                    args.push(group.inner(input).to_string());
                    cursor = group.end();
                }
                _ => args.push(default.clone()),
            },
            ArgSpec::Required => {
                let group = braced_group(input, cursor).ok()??;
                args.push(group.inner(input).to_string());
                cursor = group.end();
            }
        }
    }

    Some((args, cursor))
}

/// Collect, resolve and expand one definition family over a document
pub fn expand_family(input: &str, family: DefinitionFamily) -> (String, MacroDb, Vec<ExtractionWarning>) {
    let mut db = MacroDb::new();
    let (stripped, mut warnings) = db.collect(input, family);
    warnings.extend(db.resolve());
    let expanded = expand_macros(&stripped, &db);
    (expanded, db, warnings)
}

// ============================================================================
// Tests
// ============================================================================
