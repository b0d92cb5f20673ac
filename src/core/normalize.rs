//! Macro normalization pipeline
//!
//! Turns raw document text into a fully expanded buffer plus the table of
//! declared theorem environments. The passes run in a fixed order and each
//! one sees the output of the previous:
//!
//! 1. comments
//! 2. `\def` family
//! 3. `\newaliascnt` pairs (collected; applied to declarations in step 6)
//! 4. `\DeclareMathOperator`
//! 5. `\newcommand` family
//! 6. theorem declarations
//! 7. `\newenvironment` wrappers
//!
//! Finally `\begin { name }` spellings are normalized to `\begin{name}` so
//! later passes can search for environments literally.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::core::comments::strip_comments;
use crate::features::macros::{expand_family, DefinitionFamily};
use crate::features::theorems::{
    collect_aliases, collect_counter_parents, collect_declarations, has_swapnumbers,
    resolve_alias, resolve_environment_wrappers, DeclarationTable,
};
use crate::utils::error::ExtractionWarning;

lazy_static! {
    static ref ENVIRONMENT_DELIMITER: Regex =
        Regex::new(r"\\(begin|end)\s*\{\s*([^{}]*?)\s*\}").unwrap();
}

/// Output of [`normalize`]
#[derive(Debug, Clone, Default)]
pub struct NormalizedDocument {
    /// Expanded text, definitions removed
    pub text: String,
    /// Declared theorem environments in declaration order
    pub declarations: DeclarationTable,
    /// `(child, parent)` counter edges from `\numberwithin` / `\counterwithin`
    pub counter_parents: Vec<(String, String)>,
    /// `\swapnumbers` was given
    pub swap_numbers: bool,
    /// Problems met while normalizing
    pub warnings: Vec<ExtractionWarning>,
}

/// Run the full normalization pipeline over raw document text
pub fn normalize(raw: &str) -> NormalizedDocument {
    let mut warnings = Vec::new();

    let text = strip_comments(raw);

    let (text, defs, found) = expand_family(&text, DefinitionFamily::Def);
    warnings.extend(found);

    let aliases = collect_aliases(&text);

    let (text, operators, found) = expand_family(&text, DefinitionFamily::MathOperator);
    warnings.extend(found);

    let (text, commands, found) = expand_family(&text, DefinitionFamily::NewCommand);
    warnings.extend(found);

    let mut declarations = DeclarationTable::new();
    warnings.extend(collect_declarations(&text, &mut declarations));
    declarations.apply_aliases(&aliases);

    let (text, found) = resolve_environment_wrappers(&text, &mut declarations);
    warnings.extend(found);

    let text = ENVIRONMENT_DELIMITER
        .replace_all(&text, r"\$1{$2}")
        .into_owned();

    let counter_parents = collect_counter_parents(&text)
        .into_iter()
        .map(|(child, parent)| (resolve_alias(&aliases, &child), resolve_alias(&aliases, &parent)))
        .collect::<Vec<_>>();
    let swap_numbers = has_swapnumbers(&text);

    debug!(
        defs = defs.len(),
        operators = operators.len(),
        commands = commands.len(),
        aliases = aliases.len(),
        declarations = declarations.len(),
        counter_parents = counter_parents.len(),
        swap_numbers,
        "normalized document"
    );

    NormalizedDocument {
        text,
        declarations,
        counter_parents,
        swap_numbers,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::WarningKind;

    #[test]
    fn test_def_expanded_before_extraction() {
        let doc = normalize("\\def\\foo#1{bar #1}\n\\foo{baz}");
        assert_eq!(doc.text.trim(), "bar baz");
    }

    #[test]
    fn test_commented_declaration_ignored() {
        let doc = normalize("% \\newtheorem{thm}{Theorem}\n\\newtheorem{lem}{Lemma}");
        assert_eq!(doc.declarations.names(), vec!["lem"]);
    }

    #[test]
    fn test_declaration_built_by_macro() {
        let doc = normalize(
            "\\newcommand{\\declare}[2]{\\newtheorem{#1}{#2}}\n\\declare{thm}{Theorem}",
        );
        assert_eq!(doc.declarations.get("thm").unwrap().caption, "Theorem");
    }

    #[test]
    fn test_environment_delimiters_normalized() {
        let doc = normalize("\\begin { theorem }x\\end{ theorem}");
        assert_eq!(doc.text, "\\begin{theorem}x\\end{theorem}");
    }

    #[test]
    fn test_macro_inside_environment_name() {
        let doc = normalize("\\newcommand{\\bt}{\\begin{theorem}}\\bt A\\end{theorem}");
        assert_eq!(doc.text, "\\begin{theorem} A\\end{theorem}");
    }

    #[test]
    fn test_math_operator_and_newcommand_order() {
        let doc = normalize(
            "\\DeclareMathOperator{\\rk}{rank}\n\\newcommand{\\fullrank}{\\rk A = n}\n$\\fullrank$",
        );
        assert!(doc.text.contains("$\\text{rank} A = n$"));
    }

    #[test]
    fn test_aliases_applied_to_declarations() {
        let doc = normalize(
            "\\newtheorem{theorem}{Theorem}\n\\newaliascnt{lemma}{theorem}\n\\newtheorem{lemma}[lemma]{Lemma}",
        );
        assert_eq!(doc.declarations.get("lemma").unwrap().counter(), "theorem");
    }

    #[test]
    fn test_counter_parents_and_swap() {
        let doc = normalize("\\swapnumbers\\numberwithin{thm}{section}");
        assert!(doc.swap_numbers);
        assert_eq!(
            doc.counter_parents,
            vec![("thm".to_string(), "section".to_string())]
        );
    }

    #[test]
    fn test_self_referential_macro_reported() {
        let doc = normalize("\\newcommand{\\x}{\\x\\x}\n\\x");
        assert!(doc
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::SelfReferentialMacro));
        assert!(doc.text.contains("\\x"));
    }
}
