//! Counter and numbering engine
//!
//! [`TheoremNumberer`] models LaTeX's counter hierarchy: counters with
//! parent/child edges, where stepping a counter zeroes everything below it.
//! [`NumberingPlan`] builds a fresh numberer per region and replays the
//! sectioning commands and theorem occurrences of that region in document
//! order to produce each occurrence's heading.

use fxhash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::core::locate::{Occurrence, SectionLevel, StructuralMarker};
use crate::core::normalize::NormalizedDocument;
use crate::core::options::ExtractOptions;
use crate::features::theorems::{DeclarationTable, TheoremDeclaration};
use crate::utils::error::{ExtractionWarning, WarningKind};

/// Stateful model of one region's counters
#[derive(Debug, Clone, Default)]
pub struct TheoremNumberer {
    /// child counter -> parent counter
    parents: FxHashMap<String, String>,
    /// parent counter -> child counters, in registration order
    children: FxHashMap<String, Vec<String>>,
    counters: FxHashMap<String, u32>,
    envs: FxHashMap<String, TheoremDeclaration>,
    /// `\swapnumbers`: number before caption
    pub swapped: bool,
    /// Render alphabetic roots as letters
    pub in_appendix: bool,
    pub alpha_roots: FxHashSet<String>,
    warnings: Vec<ExtractionWarning>,
}

impl TheoremNumberer {
    pub fn new() -> Self {
        let mut numberer = Self::default();
        numberer.alpha_roots.insert("section".to_string());
        numberer
    }

    /// Register a theorem environment
    pub fn define(&mut self, decl: &TheoremDeclaration) {
        let counter = decl.counter().to_string();
        self.ensure_counter(&counter);
        if let Some(within) = &decl.within {
            self.number_within(&counter, within);
        }
        self.envs.insert(decl.name.clone(), decl.clone());
    }

    /// Make `child` reset whenever `parent` steps.
    ///
    /// An existing parent edge of `child` is replaced. An edge that would make
    /// a counter its own ancestor is refused.
    pub fn number_within(&mut self, child: &str, parent: &str) -> bool {
        self.ensure_counter(child);
        self.ensure_counter(parent);

        if child == parent || self.ancestors(parent).iter().any(|a| a == child) {
            warn!(child, parent, "refusing cyclic counter edge");
            self.warnings.push(
                ExtractionWarning::new(
                    WarningKind::CounterCycle,
                    format!("counter '{}' cannot be numbered within '{}'", child, parent),
                )
                .with_source(child.to_string()),
            );
            return false;
        }

        if let Some(old) = self.parents.insert(child.to_string(), parent.to_string()) {
            if let Some(siblings) = self.children.get_mut(&old) {
                siblings.retain(|c| c != child);
            }
        }
        let siblings = self.children.entry(parent.to_string()).or_default();
        if !siblings.iter().any(|c| c == child) {
            siblings.push(child.to_string());
        }
        true
    }

    /// Step a counter and zero all of its descendants
    pub fn increment(&mut self, counter: &str) {
        *self.counters.entry(counter.to_string()).or_insert(0) += 1;
        for descendant in self.descendants(counter) {
            self.counters.insert(descendant, 0);
        }
    }

    /// Heading for one occurrence of `env`; steps its counter unless starred.
    ///
    /// An environment that was never defined is defined on the fly with a
    /// counter of its own.
    pub fn begin(&mut self, env: &str) -> String {
        if !self.envs.contains_key(env) {
            self.define(&TheoremDeclaration::new(env, "", false));
        }
        let Some(decl) = self.envs.get(env) else {
            return String::new();
        };
        if decl.starred {
            return decl.caption.clone();
        }

        let caption = decl.caption.clone();
        let counter = decl.counter().to_string();
        self.increment(&counter);
        let number = self.formatted_number(&counter);

        if self.swapped {
            format!("{} {}", number, caption)
        } else {
            format!("{} {}", caption, number)
        }
    }

    /// Current value of a counter (0 when never stepped)
    pub fn value(&self, counter: &str) -> u32 {
        self.counters.get(counter).copied().unwrap_or(0)
    }

    /// `.`-joined chain of values from the root ancestor down to `counter`,
    /// with a trailing `.`
    pub fn formatted_number(&self, counter: &str) -> String {
        let mut chain = self.ancestors(counter);
        chain.reverse();
        chain.push(counter.to_string());

        let mut number = String::new();
        for name in &chain {
            let value = self.value(name);
            if self.in_appendix && self.alpha_roots.contains(name) {
                number.push_str(&to_alpha(value));
            } else {
                number.push_str(&value.to_string());
            }
            number.push('.');
        }
        number
    }

    /// Warnings raised while building the hierarchy
    pub fn take_warnings(&mut self) -> Vec<ExtractionWarning> {
        std::mem::take(&mut self.warnings)
    }

    fn ensure_counter(&mut self, counter: &str) {
        self.counters.entry(counter.to_string()).or_insert(0);
    }

    /// Parent, grandparent, ... of a counter (nearest first)
    fn ancestors(&self, counter: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = FxHashSet::default();
        seen.insert(counter);

        let mut current = counter;
        while let Some(parent) = self.parents.get(current) {
            if !seen.insert(parent.as_str()) {
                break;
            }
            chain.push(parent.clone());
            current = parent.as_str();
        }
        chain
    }

    fn descendants(&self, counter: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        let mut stack = vec![counter];

        while let Some(current) = stack.pop() {
            let Some(children) = self.children.get(current) else {
                continue;
            };
            for child in children {
                if child != counter && seen.insert(child.as_str()) {
                    out.push(child.clone());
                    stack.push(child.as_str());
                }
            }
        }
        out
    }
}

/// Bijective base-26 letters: 1 -> A, 26 -> Z, 27 -> AA.
///
/// A counter that was never stepped renders as `A`.
pub fn to_alpha(n: u32) -> String {
    if n == 0 {
        return "A".to_string();
    }
    let mut n = n;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push((b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    letters.iter().rev().collect()
}

/// Everything needed to number one document's regions
#[derive(Debug, Clone)]
pub struct NumberingPlan<'a> {
    declarations: &'a DeclarationTable,
    counter_parents: &'a [(String, String)],
    swap_numbers: bool,
    has_chapters: bool,
    alpha_roots: Vec<String>,
}

impl<'a> NumberingPlan<'a> {
    pub fn new(
        document: &'a NormalizedDocument,
        markers: &[StructuralMarker],
        options: &ExtractOptions,
    ) -> Self {
        let has_chapters = markers.iter().any(|m| m.level == SectionLevel::Chapter);
        let alpha_roots = options.alpha_roots.clone().unwrap_or_else(|| {
            let root = if has_chapters { "chapter" } else { "section" };
            vec![root.to_string()]
        });

        Self {
            declarations: &document.declarations,
            counter_parents: &document.counter_parents,
            swap_numbers: document.swap_numbers,
            has_chapters,
            alpha_roots,
        }
    }

    /// A fresh numberer with the sectioning hierarchy, declarations and
    /// `\numberwithin` edges registered, in that order
    pub fn numberer(&self, appendix: bool) -> TheoremNumberer {
        let mut numberer = TheoremNumberer::new();
        numberer.swapped = self.swap_numbers;
        numberer.in_appendix = appendix;
        numberer.alpha_roots = self.alpha_roots.iter().cloned().collect();

        if self.has_chapters {
            numberer.number_within("section", "chapter");
        }
        numberer.number_within("subsection", "section");
        numberer.number_within("subsubsection", "subsection");

        for decl in self.declarations.iter() {
            numberer.define(decl);
        }
        for (child, parent) in self.counter_parents {
            numberer.number_within(child, parent);
        }

        numberer
    }

    /// Replay markers and occurrences of one region in document order.
    ///
    /// Returns one heading per occurrence plus the warnings raised while
    /// building the counter hierarchy.
    pub fn number(
        &self,
        occurrences: &[Occurrence],
        markers: &[StructuralMarker],
        appendix: bool,
    ) -> (Vec<String>, Vec<ExtractionWarning>) {
        let mut numberer = self.numberer(appendix);
        let warnings = numberer.take_warnings();

        let mut markers = markers.iter().filter(|m| !m.starred).peekable();
        let mut titles = Vec::with_capacity(occurrences.len());

        for occurrence in occurrences {
            while let Some(marker) = markers.next_if(|m| m.offset < occurrence.offset) {
                numberer.increment(marker.level.counter());
            }
            titles.push(numberer.begin(&occurrence.environment));
        }

        debug!(appendix, titles = titles.len(), "numbered region");
        (titles, warnings)
    }
}
