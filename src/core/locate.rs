//! Occurrence locator
//!
//! Finds every region delimited by a theorem-like environment in the
//! normalized buffer, the sectioning commands that drive counter resets, and
//! the point where the appendix starts.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::options::ExtractOptions;
use crate::features::theorems::DeclarationTable;
use crate::utils::error::{ExtractionWarning, WarningKind};

lazy_static! {
    static ref APPENDIX_COMMAND: Regex = Regex::new(r"\\appendix([^A-Za-z@]|$)").unwrap();
    static ref SECTIONING: Regex =
        Regex::new(r"\\(chapter|section|subsection|subsubsection)(\*?)\s*[\[{]").unwrap();
}

const BEGIN_DOCUMENT: &str = "\\begin{document}";
const BEGIN_APPENDIX: &str = "\\begin{appendix}";

/// Part of the document an occurrence belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Main,
    Appendix,
}

/// One `\begin{env}...\end{env}` region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    /// Environment name as written in the buffer
    pub environment: String,
    /// Byte offset of `\begin`
    pub offset: usize,
    /// Byte offset just past the matching `\end{env}`
    pub end: usize,
    pub region: Region,
    /// Position within its region
    pub index: usize,
}

impl Occurrence {
    /// Text between `\begin{env}` and `\end{env}`
    pub fn body<'a>(&self, text: &'a str) -> &'a str {
        let open = self.offset + begin_tag(&self.environment).len();
        let close = self.end - end_tag(&self.environment).len();
        text.get(open..close).unwrap_or("")
    }
}

/// Which environments count as theorem-like for one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentStrategy {
    /// The document's own declarations
    Declared(Vec<String>),
    /// Fallback set for documents that declare nothing
    Default(Vec<String>),
}

impl EnvironmentStrategy {
    /// Pick the strategy once per document
    pub fn resolve(declarations: &DeclarationTable, options: &ExtractOptions) -> Self {
        if declarations.is_empty() {
            EnvironmentStrategy::Default(options.default_environments.clone())
        } else {
            EnvironmentStrategy::Declared(declarations.names())
        }
    }

    pub fn environments(&self) -> &[String] {
        match self {
            EnvironmentStrategy::Declared(envs) | EnvironmentStrategy::Default(envs) => envs,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, EnvironmentStrategy::Default(_))
    }
}

/// Occurrences split at the appendix
#[derive(Debug, Clone, Default)]
pub struct Located {
    pub main: Vec<Occurrence>,
    pub appendix: Vec<Occurrence>,
    /// Offset where the appendix starts
    pub cut: Option<usize>,
    pub warnings: Vec<ExtractionWarning>,
}

impl Located {
    pub fn len(&self) -> usize {
        self.main.len() + self.appendix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty() && self.appendix.is_empty()
    }

    /// All occurrences in document order
    pub fn iter(&self) -> impl Iterator<Item = &Occurrence> {
        self.main.iter().chain(self.appendix.iter())
    }
}

pub(crate) fn begin_tag(environment: &str) -> String {
    format!("\\begin{{{}}}", environment)
}

pub(crate) fn end_tag(environment: &str) -> String {
    format!("\\end{{{}}}", environment)
}

/// Locate every occurrence of the strategy's environments
pub fn locate(text: &str, strategy: &EnvironmentStrategy) -> Located {
    let mut occurrences = Vec::new();
    let mut warnings = Vec::new();

    for environment in strategy.environments() {
        let begin = begin_tag(environment);
        let end = end_tag(environment);
        let mut pos = 0;

        while let Some(found) = text[pos..].find(&begin) {
            let offset = pos + found;
            let body_start = offset + begin.len();
            match text[body_start..].find(&end) {
                Some(close) => {
                    let region_end = body_start + close + end.len();
                    occurrences.push(Occurrence {
                        environment: environment.clone(),
                        offset,
                        end: region_end,
                        region: Region::Main,
                        index: 0,
                    });
                    pos = region_end;
                }
                None => {
                    warn!(environment = %environment, offset, "environment never closed");
                    warnings.push(
                        ExtractionWarning::new(
                            WarningKind::UnterminatedEnvironment,
                            format!("\\begin{{{}}} has no matching \\end", environment),
                        )
                        .with_source(begin.clone()),
                    );
                    break;
                }
            }
        }
    }

    occurrences.sort_by_key(|o| o.offset);

    let cut = appendix_cut(text);
    let split = cut.map_or(occurrences.len(), |cut| {
        occurrences.partition_point(|o| o.offset < cut)
    });
    let mut appendix = occurrences.split_off(split);
    let mut main = occurrences;

    for (index, occurrence) in main.iter_mut().enumerate() {
        occurrence.region = Region::Main;
        occurrence.index = index;
    }
    for (index, occurrence) in appendix.iter_mut().enumerate() {
        occurrence.region = Region::Appendix;
        occurrence.index = index;
    }

    debug!(
        strategy = if strategy.is_default() { "default" } else { "declared" },
        main = main.len(),
        appendix = appendix.len(),
        ?cut,
        "located occurrences"
    );

    Located {
        main,
        appendix,
        cut,
        warnings,
    }
}

/// Offset of the first `\begin{appendix}`, else the first `\appendix`
pub fn appendix_cut(text: &str) -> Option<usize> {
    text.find(BEGIN_APPENDIX)
        .or_else(|| APPENDIX_COMMAND.find(text).map(|m| m.start()))
}

/// Sectioning level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectionLevel {
    Chapter,
    Section,
    Subsection,
    Subsubsection,
}

impl SectionLevel {
    pub fn from_command(name: &str) -> Option<Self> {
        match name {
            "chapter" => Some(SectionLevel::Chapter),
            "section" => Some(SectionLevel::Section),
            "subsection" => Some(SectionLevel::Subsection),
            "subsubsection" => Some(SectionLevel::Subsubsection),
            _ => None,
        }
    }

    /// Counter incremented by this level
    pub fn counter(&self) -> &'static str {
        match self {
            SectionLevel::Chapter => "chapter",
            SectionLevel::Section => "section",
            SectionLevel::Subsection => "subsection",
            SectionLevel::Subsubsection => "subsubsection",
        }
    }
}

/// A sectioning command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuralMarker {
    pub level: SectionLevel,
    pub offset: usize,
    pub starred: bool,
}

/// Sectioning commands after `\begin{document}` (whole text when absent)
pub fn structural_markers(text: &str) -> Vec<StructuralMarker> {
    let start = text.find(BEGIN_DOCUMENT).unwrap_or(0);

    SECTIONING
        .captures_iter(&text[start..])
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let level = SectionLevel::from_command(caps.get(1)?.as_str())?;
            Some(StructuralMarker {
                level,
                offset: start + whole.start(),
                starred: caps.get(2).map_or(false, |m| !m.as_str().is_empty()),
            })
        })
        .collect()
}
