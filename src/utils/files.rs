//! Multi-file paper sources
//!
//! Extraction works on one buffer, but papers ship as a directory of `.tex`
//! files. This module provides the pieces that turn a source tree into that
//! buffer:
//! - `FileResolver`: file access, over the real filesystem or in memory
//! - `decode_source`: UTF-8 with a Latin-1 fallback
//! - `find_main_file`: picks the file `pdflatex` would be run on
//! - `inline_imports`: splices `\input`/`\include` and local `.sty` packages

use std::collections::{BTreeMap, HashMap, HashSet};

#[cfg(not(target_arch = "wasm32"))]
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, trace};

use crate::core::comments::{comment_start, strip_comments};
use crate::data::constants::{DRAFT_MACROS, DRAFT_TOKENS, NON_MAIN_NAMES};
use crate::utils::error::{ExtractionError, ExtractionResult};

lazy_static! {
    static ref INCLUDE: Regex =
        Regex::new(r"\\(input|include|subfile)\s*\{([^{}]+)\}").unwrap();
    static ref USEPACKAGE: Regex =
        Regex::new(r"\\(?:usepackage|RequirePackage)\s*(?:\[[^\]]*\])?\s*\{([^{}]+)\}").unwrap();
    static ref DOCUMENTCLASS: Regex =
        Regex::new(r"\\documentclass\s*(\[[^\]]*\])?\s*\{([^{}]*)\}").unwrap();
    static ref SECTION_LIKE: Regex =
        Regex::new(r"\\(section|subsection|subsubsection)([^A-Za-z@]|$)").unwrap();
    static ref THEOREM_ENV: Regex =
        Regex::new(r"\\begin\{(theorem|lemma|proposition|corollary|remark)\}").unwrap();
    static ref CITE: Regex = Regex::new(r"\\cite[tp]?\{").unwrap();
}

/// Trait for resolving and reading files
///
/// Implementations:
/// - `StdFileResolver`: Uses std::fs for real file system access (CLI)
/// - `MemoryFileResolver`: In-memory file storage (testing, WASM with preloaded files)
pub trait FileResolver: Send + Sync {
    /// Read a file's contents
    fn read_file(&self, path: &str) -> Result<String, FileResolveError>;

    /// Check if a file exists
    fn file_exists(&self, path: &str) -> bool;

    /// Resolve a relative path against a base path
    fn resolve_path(&self, base: &str, relative: &str) -> String;

    /// Get the base directory for includes
    fn base_dir(&self) -> Option<&str>;

    /// Every `.tex` file, relative to the base directory, sorted
    fn tex_files(&self) -> Vec<String>;
}

/// Error type for file resolution
#[derive(Debug, Clone)]
pub enum FileResolveError {
    NotFound(String),
    ReadError(String),
}

impl std::fmt::Display for FileResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileResolveError::NotFound(path) => write!(f, "File not found: {}", path),
            FileResolveError::ReadError(msg) => write!(f, "Read error: {}", msg),
        }
    }
}

impl std::error::Error for FileResolveError {}

impl From<FileResolveError> for ExtractionError {
    fn from(err: FileResolveError) -> Self {
        ExtractionError::IoError {
            message: err.to_string(),
        }
    }
}

/// Decode source bytes: UTF-8 first, Latin-1 otherwise.
///
/// Latin-1 maps every byte, so the only input rejected is binary content
/// (NUL bytes), which no LaTeX source contains.
pub fn decode_source(bytes: &[u8]) -> ExtractionResult<String> {
    if let Some(pos) = bytes.iter().position(|&b| b == 0) {
        return Err(ExtractionError::encoding(format!(
            "NUL byte at offset {}, input is not text",
            pos
        )));
    }

    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            debug!("input is not UTF-8, decoding as Latin-1");
            bytes.iter().map(|&b| b as char).collect()
        }
    };

    Ok(match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    })
}

/// Collapse `.` and `..` components of a `/`-separated path
fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    let joined = parts.join("/");
    if path.starts_with('/') {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Standard filesystem resolver (for CLI usage)
#[cfg(not(target_arch = "wasm32"))]
pub struct StdFileResolver {
    base_directory: Option<PathBuf>,
    /// Search paths for includes (like TEXINPUTS)
    search_paths: Vec<PathBuf>,
}

#[cfg(not(target_arch = "wasm32"))]
impl StdFileResolver {
    pub fn new() -> Self {
        Self {
            base_directory: None,
            search_paths: vec![],
        }
    }

    pub fn with_base_dir(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_directory: Some(base_dir.as_ref().to_path_buf()),
            search_paths: vec![base_dir.as_ref().to_path_buf()],
        }
    }

    pub fn add_search_path(&mut self, path: impl AsRef<Path>) {
        self.search_paths.push(path.as_ref().to_path_buf());
    }

    /// Try to find a file in search paths, then as given
    fn find_file(&self, filename: &str) -> Option<PathBuf> {
        let with_ext = format!("{}.tex", filename);

        for search_path in &self.search_paths {
            let full_path = search_path.join(filename);
            if full_path.is_file() {
                return Some(full_path);
            }

            let full_path_ext = search_path.join(&with_ext);
            if full_path_ext.is_file() {
                return Some(full_path_ext);
            }
        }

        let found = [Path::new(filename), Path::new(&with_ext)]
            .into_iter()
            .find(|path| path.is_file())
            .map(Path::to_path_buf);
        found
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Default for StdFileResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl FileResolver for StdFileResolver {
    fn read_file(&self, path: &str) -> Result<String, FileResolveError> {
        let full_path = self
            .find_file(path)
            .ok_or_else(|| FileResolveError::NotFound(path.to_string()))?;
        let bytes =
            std::fs::read(&full_path).map_err(|e| FileResolveError::ReadError(e.to_string()))?;
        decode_source(&bytes).map_err(|e| FileResolveError::ReadError(e.to_string()))
    }

    fn file_exists(&self, path: &str) -> bool {
        self.find_file(path).is_some()
    }

    fn resolve_path(&self, base: &str, relative: &str) -> String {
        let base_path = Path::new(base);
        if let Some(parent) = base_path.parent() {
            normalize_path(&parent.join(relative).to_string_lossy())
        } else {
            normalize_path(relative)
        }
    }

    fn base_dir(&self) -> Option<&str> {
        self.base_directory.as_ref().and_then(|p| p.to_str())
    }

    fn tex_files(&self) -> Vec<String> {
        let Some(root) = &self.base_directory else {
            return Vec::new();
        };

        let mut files: Vec<String> = walkdir::WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().map_or(false, |ext| ext == "tex"))
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(root)
                    .ok()
                    .map(|rel| normalize_path(&rel.to_string_lossy()))
            })
            .collect();
        files.sort();
        files
    }
}

/// Memory-based file resolver (for testing and WASM with preloaded files)
pub struct MemoryFileResolver {
    files: HashMap<String, String>,
    base_directory: Option<String>,
}

impl MemoryFileResolver {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            base_directory: None,
        }
    }

    pub fn with_base_dir(base_dir: &str) -> Self {
        Self {
            files: HashMap::new(),
            base_directory: Some(base_dir.to_string()),
        }
    }

    /// Add a file to the in-memory storage
    pub fn add_file(&mut self, path: &str, content: &str) {
        self.files.insert(normalize_path(path), content.to_string());
    }

    /// Add multiple files
    pub fn add_files(&mut self, files: impl IntoIterator<Item = (String, String)>) {
        for (path, content) in files {
            self.files.insert(normalize_path(&path), content);
        }
    }
}

impl Default for MemoryFileResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl FileResolver for MemoryFileResolver {
    fn read_file(&self, path: &str) -> Result<String, FileResolveError> {
        let path = normalize_path(path);
        self.files
            .get(&path)
            .cloned()
            .or_else(|| {
                // Try with .tex extension
                self.files.get(&format!("{}.tex", path)).cloned()
            })
            .ok_or(FileResolveError::NotFound(path))
    }

    fn file_exists(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.files.contains_key(&path) || self.files.contains_key(&format!("{}.tex", path))
    }

    fn resolve_path(&self, base: &str, relative: &str) -> String {
        // Simple path joining for memory resolver
        if relative.starts_with('/') || relative.starts_with('\\') {
            normalize_path(relative)
        } else if let Some(last_sep) = base.rfind(['/', '\\']) {
            normalize_path(&format!("{}/{}", &base[..last_sep], relative))
        } else {
            normalize_path(relative)
        }
    }

    fn base_dir(&self) -> Option<&str> {
        self.base_directory.as_deref()
    }

    fn tex_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .files
            .keys()
            .filter(|path| path.ends_with(".tex"))
            .cloned()
            .collect();
        files.sort();
        files
    }
}

// ============================================================================
// Main File Detection
// ============================================================================

/// A `.tex` file considered as the main file
struct Candidate {
    path: String,
    content: String,
    included_by: HashSet<String>,
}

/// Pick the main `.tex` file of a source tree.
///
/// Candidates are files with a `\documentclass` that no other file includes.
/// A single candidate wins outright; several are ranked by [`score_main_file`]
/// (ties go to the first path in sorted order).
pub fn find_main_file<R: FileResolver>(resolver: &R) -> Option<String> {
    let mut candidates: BTreeMap<String, Candidate> = resolver
        .tex_files()
        .into_iter()
        .filter_map(|path| {
            let content = resolver.read_file(&path).ok()?;
            Some((
                path.clone(),
                Candidate {
                    path,
                    content: strip_comments(&content),
                    included_by: HashSet::new(),
                },
            ))
        })
        .collect();

    // Inclusion graph
    let mut edges = Vec::new();
    for candidate in candidates.values() {
        for caps in INCLUDE.captures_iter(&candidate.content) {
            let target = with_tex_extension(caps[2].trim());
            let relative = resolver.resolve_path(&candidate.path, &target);
            let rooted = normalize_path(&target);
            for resolved in [relative, rooted] {
                if resolved != candidate.path && candidates.contains_key(&resolved) {
                    edges.push((resolved, candidate.path.clone()));
                }
            }
        }
    }
    for (included, includer) in edges {
        if let Some(candidate) = candidates.get_mut(&included) {
            candidate.included_by.insert(includer);
        }
    }

    let with_class: Vec<&Candidate> = candidates
        .values()
        .filter(|c| DOCUMENTCLASS.is_match(&c.content))
        .collect();
    let roots: Vec<&Candidate> = with_class
        .iter()
        .copied()
        .filter(|c| c.included_by.is_empty())
        .collect();
    let roots = if roots.is_empty() { with_class } else { roots };

    let mut best: Option<(&Candidate, f64)> = None;
    for candidate in roots {
        let score = score_main_file(&candidate.path, &candidate.content);
        trace!(path = %candidate.path, score, "main file candidate");
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }

    let main = best.map(|(candidate, _)| candidate.path.clone());
    debug!(main = ?main, "selected main file");
    main
}

/// Likelihood that a file is a paper's main file
pub fn score_main_file(path: &str, content: &str) -> f64 {
    let mut score = 0.0;

    for marker in ["\\begin{document}", "\\end{document}"] {
        if content.contains(marker) {
            score += 3.0;
        }
    }
    for marker in ["\\title", "\\author", "\\maketitle", "\\begin{abstract}"] {
        if content.contains(marker) {
            score += 2.0;
        }
    }

    score += 0.5 * SECTION_LIKE.find_iter(content).count() as f64;
    score += 0.5 * THEOREM_ENV.find_iter(content).count() as f64;
    score += 0.2 * CITE.find_iter(content).count() as f64;
    score += (content.matches('\n').count() as f64 / 200.0).min(5.0);

    let document_class = DOCUMENTCLASS.find(content).map(|m| m.as_str());
    if document_class.map_or(false, |class| class.contains("beamer")) {
        score -= 5.0;
    }

    let name = path.rsplit(['/', '\\']).next().unwrap_or(path).to_lowercase();
    if NON_MAIN_NAMES.iter().any(|fragment| name.contains(fragment)) {
        score -= 3.0;
    }

    let lower = content.to_lowercase();
    if lower.contains("response to referee") || lower.contains("reply to referee") {
        score -= 5.0;
    }
    if DRAFT_MACROS.iter().any(|m| content.contains(m)) {
        score -= 8.0;
    }
    if DRAFT_TOKENS.iter().any(|t| lower.contains(t)) {
        score -= 4.0;
    }
    if document_class.map_or(false, |class| class.to_lowercase().contains("draft")) {
        score -= 4.0;
    }

    score
}

fn with_tex_extension(target: &str) -> String {
    if target.ends_with(".tex") {
        target.to_string()
    } else {
        format!("{}.tex", target)
    }
}

// ============================================================================
// Import Inlining
// ============================================================================

/// Whether the match at `pos` sits after a `%` on its line
fn is_commented(content: &str, pos: usize) -> bool {
    let line_start = content[..pos].rfind('\n').map_or(0, |i| i + 1);
    comment_start(&content[line_start..pos]).is_some()
}

/// Resolve an include target: relative to the including file, then to the root
fn locate_include<R: FileResolver>(resolver: &R, current_file: &str, target: &str) -> Option<String> {
    let relative = resolver.resolve_path(current_file, target);
    [relative, normalize_path(target)]
        .into_iter()
        .find(|path| resolver.file_exists(path))
}

/// Inline `\input`/`\include`/`\subfile` files recursively and prepend local
/// packages (`\usepackage{x}` with an `x.sty` in the source tree).
pub fn inline_imports<R: FileResolver>(
    content: &str,
    current_file: &str,
    resolver: &R,
    max_depth: usize,
) -> Result<String, FileResolveError> {
    let mut seen_packages = HashSet::new();
    let body = inline_files(content, current_file, resolver, max_depth)?;
    let packages = collect_packages(&body, current_file, resolver, max_depth, &mut seen_packages)?;
    Ok(packages + &body)
}

fn inline_files<R: FileResolver>(
    content: &str,
    current_file: &str,
    resolver: &R,
    max_depth: usize,
) -> Result<String, FileResolveError> {
    if max_depth == 0 {
        return Ok(content.to_string());
    }

    let mut result = String::with_capacity(content.len());
    let mut last_end = 0;

    for caps in INCLUDE.captures_iter(content) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if is_commented(content, whole.start()) {
            continue;
        }

        // Add content before this include
        result.push_str(&content[last_end..whole.start()]);
        let target = caps[2].trim();

        match locate_include(resolver, current_file, target) {
            Some(path) => {
                let included = resolver.read_file(&path)?;
                trace!(path = %path, "inlining file");
                // Recursively process includes
                let processed = inline_files(&included, &path, resolver, max_depth - 1)?;
                result.push_str(&processed);
                result.push('\n');
            }
            None => {
                // Leave a comment for unresolved includes
                debug!(target, "could not resolve include");
                result.push_str(&format!("% Could not resolve: {}\n", target));
            }
        }

        last_end = whole.end();
    }

    result.push_str(&content[last_end..]);
    Ok(result)
}

fn collect_packages<R: FileResolver>(
    content: &str,
    current_file: &str,
    resolver: &R,
    max_depth: usize,
    seen: &mut HashSet<String>,
) -> Result<String, FileResolveError> {
    let mut preamble = String::new();
    if max_depth == 0 {
        return Ok(preamble);
    }

    for caps in USEPACKAGE.captures_iter(content) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if is_commented(content, whole.start()) {
            continue;
        }

        for package in caps[1].split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let file = format!("{}.sty", package.trim_end_matches(".sty"));
            let Some(path) = locate_include(resolver, current_file, &file) else {
                continue;
            };
            if !seen.insert(path.clone()) {
                continue;
            }

            let source = resolver.read_file(&path)?;
            trace!(path = %path, "prepending local package");
            // Packages may load further local packages
            preamble.push_str(&collect_packages(&source, &path, resolver, max_depth - 1, seen)?);
            preamble.push_str(&source);
            preamble.push('\n');
        }
    }

    Ok(preamble)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_resolver() {
        let mut resolver = MemoryFileResolver::new();
        resolver.add_file("test.tex", "Hello, world!");

        assert!(resolver.file_exists("test.tex"));
        assert_eq!(resolver.read_file("test.tex").unwrap(), "Hello, world!");
    }

    #[test]
    fn test_memory_resolver_tex_extension() {
        let mut resolver = MemoryFileResolver::new();
        resolver.add_file("chapter1.tex", "Chapter 1 content");

        // Should find with or without extension
        assert!(resolver.file_exists("./chapter1.tex"));
        assert_eq!(resolver.read_file("chapter1").unwrap(), "Chapter 1 content");
    }

    #[test]
    fn test_decode_utf8_and_latin1() {
        assert_eq!(decode_source("Gödel".as_bytes()).unwrap(), "Gödel");
        assert_eq!(decode_source(&[b'G', 0xF6, b'd']).unwrap(), "Göd");
        assert_eq!(decode_source(b"\xEF\xBB\xBFx").unwrap(), "x");
    }

    #[test]
    fn test_decode_rejects_binary() {
        let err = decode_source(b"PK\x03\x04\x00\x00").unwrap_err();
        assert!(matches!(err, ExtractionError::Encoding { .. }));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./a/../b/c.tex"), "b/c.tex");
        assert_eq!(normalize_path("sec\\intro.tex"), "sec/intro.tex");
    }

    #[test]
    fn test_inline_nested_includes() {
        let mut resolver = MemoryFileResolver::new();
        resolver.add_file("main.tex", r"\input{level1}");
        resolver.add_file("level1.tex", r"Level 1 \input{sub/level2}");
        resolver.add_file("sub/level2.tex", "Level 2");

        let result = inline_imports(r"\input{level1}", "main.tex", &resolver, 5).unwrap();

        assert!(result.contains("Level 1"));
        assert!(result.contains("Level 2"));
        assert!(!result.contains("\\input"));
    }

    #[test]
    fn test_commented_include_kept() {
        let resolver = MemoryFileResolver::new();
        let content = "% \\input{old}\ntext";
        assert_eq!(inline_imports(content, "main.tex", &resolver, 5).unwrap(), content);
    }

    #[test]
    fn test_unresolved_include_leaves_note() {
        let resolver = MemoryFileResolver::new();
        let result = inline_imports(r"\include{missing}", "main.tex", &resolver, 5).unwrap();
        assert!(result.contains("% Could not resolve: missing"));
    }

    #[test]
    fn test_depth_limit_stops_recursion() {
        let mut resolver = MemoryFileResolver::new();
        resolver.add_file("loop.tex", r"again \input{loop}");

        let result = inline_imports(r"\input{loop}", "main.tex", &resolver, 3).unwrap();
        assert_eq!(result.matches("again").count(), 3);
    }

    #[test]
    fn test_local_package_prepended() {
        let mut resolver = MemoryFileResolver::new();
        resolver.add_file("macros.sty", r"\newtheorem{thm}{Theorem}");

        let result = inline_imports(
            "\\usepackage{amsmath,macros}\n\\begin{document}",
            "main.tex",
            &resolver,
            5,
        )
        .unwrap();
        assert!(result.starts_with("\\newtheorem{thm}{Theorem}"));
    }

    #[test]
    fn test_find_main_file_single_root() {
        let mut resolver = MemoryFileResolver::new();
        resolver.add_file("paper.tex", "\\documentclass{article}\n\\input{sections/intro}");
        resolver.add_file("sections/intro.tex", "\\documentclass{standalone} Intro");
        resolver.add_file("notes.tex", "plain notes");

        assert_eq!(find_main_file(&resolver), Some("paper.tex".to_string()));
    }

    #[test]
    fn test_find_main_file_scores_roots() {
        let mut resolver = MemoryFileResolver::new();
        resolver.add_file(
            "main.tex",
            "\\documentclass{amsart}\\title{T}\\begin{document}\\maketitle\\section{A}\\end{document}",
        );
        resolver.add_file(
            "slides.tex",
            "\\documentclass{beamer}\\begin{document}\\end{document}",
        );

        assert_eq!(find_main_file(&resolver), Some("main.tex".to_string()));
    }

    #[test]
    fn test_draft_penalty() {
        let clean = score_main_file("paper.tex", "\\documentclass{article}");
        let draft = score_main_file("paper.tex", "\\documentclass[draft]{article} \\todo{x}");
        assert!(draft < clean - 10.0);
    }

    #[test]
    fn test_no_main_file() {
        let mut resolver = MemoryFileResolver::new();
        resolver.add_file("a.tex", "no class here");
        assert_eq!(find_main_file(&resolver), None);
    }

    #[test]
    fn test_std_resolver_finds_tex_extension() {
        let dir = std::env::temp_dir().join(format!("theorex-resolver-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("intro.tex"), "Intro").unwrap();

        let resolver = StdFileResolver::with_base_dir(&dir);
        assert!(resolver.file_exists("intro"));
        assert_eq!(resolver.read_file("intro").unwrap(), "Intro");
        assert!(!resolver.file_exists("missing"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
