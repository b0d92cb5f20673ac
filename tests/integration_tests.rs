//! Integration tests for Theorex theorem extraction

use theorex::{
    diagnostics::check_document,
    extract, extract_bytes, extract_with_options,
    files::{find_main_file, inline_imports, FileResolver, MemoryFileResolver},
    ExtractOptions, TheoremRecord, WarningKind,
};

fn titles(records: &[TheoremRecord]) -> Vec<&str> {
    records.iter().map(|r| r.title.as_str()).collect()
}

// ============================================================================
// Default Environments
// ============================================================================

mod fallback {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_set_split_at_appendix() {
        let records = extract(
            r"\documentclass{article}
              \begin{document}
              \begin{theorem}A\end{theorem}
              \begin{remark}R\end{remark}
              \appendix
              \section{Proofs}
              \begin{lemma}B\end{lemma}
              \end{document}",
        );

        assert_eq!(titles(&records), vec!["Theorem 1.", "Remark 1.", "Lemma 1."]);
        assert_eq!(records[2].body, "B");
    }

    #[test]
    fn test_undeclared_environments_ignored_once_declarations_exist() {
        let records = extract(
            r"\newtheorem{thm}{Theorem}
              \begin{thm}A\end{thm}
              \begin{lemma}not declared\end{lemma}",
        );
        assert_eq!(records, vec![TheoremRecord::new("Theorem 1.", "A", None)]);
    }

    #[test]
    fn test_no_statements() {
        assert!(extract(r"\section{Intro} Just prose.").is_empty());
    }
}

// ============================================================================
// Macro Normalization
// ============================================================================

mod macros {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_def_with_parameter() {
        let records = extract(
            r"\def\foo#1{bar #1}
              \begin{theorem}\foo{baz}\end{theorem}",
        );
        assert_eq!(records[0].body, "bar baz");
    }

    #[test]
    fn test_newcommand_and_optional_argument() {
        let records = extract(
            r"\newcommand{\R}{\mathbb{R}}
              \newcommand{\pair}[2][x]{(#1,#2)}
              \begin{lemma}$\R$ \pair{y} \pair[z]{w}\end{lemma}",
        );
        assert_eq!(records[0].body, r"$\mathbb{R}$ (x,y) (z,w)");
    }

    #[test]
    fn test_let_alias_expanded() {
        let records = extract(
            r"\newcommand{\cont}{continuous}
              \let\ct\cont
              \begin{theorem}Every $f$ is \ct.\end{theorem}",
        );
        assert_eq!(records[0].body, "Every $f$ is continuous.");
    }

    #[test]
    fn test_math_operator() {
        let records = extract(
            r"\DeclareMathOperator{\rank}{rank}
              \begin{proposition}$\rank A = n$\end{proposition}",
        );
        assert_eq!(records[0].body, r"$\text{rank} A = n$");
    }

    #[test]
    fn test_environment_built_by_macro() {
        let records = extract(
            r"\newcommand{\bthm}{\begin{theorem}}
              \newcommand{\ethm}{\end{theorem}}
              \bthm Hidden\ethm",
        );
        assert_eq!(titles(&records), vec!["Theorem 1."]);
        assert_eq!(records[0].body, "Hidden");
    }

    #[test]
    fn test_self_referential_macro_warns() {
        let output = extract_with_options(
            r"\newcommand{\loop}{\loop x}
              \begin{theorem}\loop\end{theorem}",
            &ExtractOptions::default(),
        );
        assert_eq!(output.records[0].body, r"\loop");
        assert!(output
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::SelfReferentialMacro));
    }

    #[test]
    fn test_commented_definitions_ignored() {
        let records = extract(
            "% \\newtheorem{thm}{Theorem}\n\
             \\begin{theorem}50\\% of cases\\end{theorem}",
        );
        assert_eq!(records[0].title, "Theorem 1.");
        assert_eq!(records[0].body, r"50\% of cases");
    }
}

// ============================================================================
// Numbering
// ============================================================================

mod numbering {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_shared_counter_single_stream() {
        let records = extract(
            r"\newtheorem{thm}{Theorem}
              \newtheorem{lem}[thm]{Lemma}
              \begin{document}
              \begin{thm}A\end{thm}
              \begin{lem}B\end{lem}
              \end{document}",
        );
        assert_eq!(titles(&records), vec!["Theorem 1.", "Lemma 2."]);
    }

    #[test]
    fn test_section_resets() {
        let records = extract(
            r"\newtheorem{thm}{Theorem}[section]
              \begin{document}
              \section{One}
              \begin{thm}A\end{thm}
              \section{Two}
              \begin{thm}B\end{thm}
              \end{document}",
        );
        assert_eq!(titles(&records), vec!["Theorem 1.1.", "Theorem 2.1."]);
    }

    #[test]
    fn test_starred_section_does_not_step() {
        let records = extract(
            r"\newtheorem{thm}{Theorem}[section]
              \begin{document}
              \section{One}
              \section*{Aside}
              \begin{thm}A\end{thm}
              \end{document}",
        );
        assert_eq!(titles(&records), vec!["Theorem 1.1."]);
    }

    #[test]
    fn test_appendix_alphabetic() {
        let records = extract(
            r"\newtheorem{thm}{Theorem}[section]
              \begin{document}
              \section{Intro}
              \begin{thm}A\end{thm}
              \appendix
              \section{Proofs}
              \begin{thm}B\end{thm}
              \section{More}
              \begin{thm}C\end{thm}
              \end{document}",
        );
        assert_eq!(
            titles(&records),
            vec!["Theorem 1.1.", "Theorem A.1.", "Theorem B.1."]
        );
    }

    #[test]
    fn test_chapters_become_alphabetic_root() {
        let records = extract(
            r"\newtheorem{thm}{Theorem}[section]
              \begin{document}
              \chapter{One}
              \section{S}
              \begin{thm}A\end{thm}
              \appendix
              \chapter{Extra}
              \section{T}
              \begin{thm}B\end{thm}
              \end{document}",
        );
        assert_eq!(titles(&records), vec!["Theorem 1.1.1.", "Theorem A.1.1."]);
    }

    #[test]
    fn test_numberwithin() {
        let records = extract(
            r"\newtheorem{thm}{Theorem}
              \numberwithin{thm}{section}
              \begin{document}
              \section{One}
              \begin{thm}A\end{thm}
              \begin{thm}B\end{thm}
              \end{document}",
        );
        assert_eq!(titles(&records), vec!["Theorem 1.1.", "Theorem 1.2."]);
    }

    #[test]
    fn test_swapnumbers() {
        let records = extract(
            r"\swapnumbers
              \newtheorem{thm}{Theorem}
              \begin{thm}A\end{thm}",
        );
        assert_eq!(titles(&records), vec!["1. Theorem"]);
    }

    #[test]
    fn test_starred_environment_unnumbered() {
        let records = extract(
            r"\newtheorem{thm}{Theorem}
              \newtheorem*{rem}{Remark}
              \begin{rem}R\end{rem}
              \begin{thm}A\end{thm}",
        );
        assert_eq!(titles(&records), vec!["Remark", "Theorem 1."]);
    }

    #[test]
    fn test_declaretheorem() {
        let records = extract(
            r"\declaretheorem[name=Theorem, numberwithin=section]{theorem}
              \declaretheorem[sibling=theorem]{lemma}
              \begin{document}
              \section{One}
              \begin{theorem}A\end{theorem}
              \begin{lemma}B\end{lemma}
              \end{document}",
        );
        assert_eq!(titles(&records), vec!["Theorem 1.1.", "Lemma 1.2."]);
    }

    #[test]
    fn test_aliased_counter() {
        let records = extract(
            r"\newtheorem{theorem}{Theorem}
              \newaliascnt{cor}{theorem}
              \newtheorem{cor}[cor]{Corollary}
              \begin{theorem}A\end{theorem}
              \begin{cor}B\end{cor}",
        );
        assert_eq!(titles(&records), vec!["Theorem 1.", "Corollary 2."]);
    }

    #[test]
    fn test_wrapper_environment_counts_separately() {
        let records = extract(
            r"\newtheorem{thm}{Theorem}[section]
              \newenvironment{mthm}{\begin{thm}}{\end{thm}}
              \begin{document}
              \section{A}
              \begin{thm}A\end{thm}
              \begin{mthm}B\end{mthm}
              \end{document}",
        );
        assert_eq!(titles(&records), vec!["Theorem 1.1.", "Theorem 1.1."]);
    }

    #[test]
    fn test_wrapper_of_shared_environment_shares_counter() {
        let records = extract(
            r"\newtheorem{thm}{Theorem}
              \newtheorem{lem}[thm]{Lemma}
              \newenvironment{keylem}{\begin{lem}}{\end{lem}}
              \begin{thm}A\end{thm}
              \begin{keylem}B\end{keylem}",
        );
        assert_eq!(titles(&records), vec!["Theorem 1.", "Lemma 2."]);
    }
}

// ============================================================================
// Bodies and Labels
// ============================================================================

mod labels {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_duplicate_label_kept_by_later_statement() {
        let records = extract(
            r"\begin{theorem}\label{thm:x}First\end{theorem}
              \begin{theorem}\label{thm:x}Second\end{theorem}",
        );
        assert_eq!(
            records,
            vec![
                TheoremRecord::new("Theorem 1.", "First", None),
                TheoremRecord::new("Theorem 2.", "Second", Some("thm:x".to_string())),
            ]
        );
    }

    #[test]
    fn test_multiline_body_joined() {
        let records = extract(
            "\\begin{lemma}\n  Let $x$ be\n  positive.\n  \\label{lem:pos}\n\\end{lemma}",
        );
        assert_eq!(records[0].body, "Let $x$ be positive.");
        assert_eq!(records[0].label.as_deref(), Some("lem:pos"));
    }

    #[test]
    fn test_count_invariant_and_no_residual_labels() {
        let records = extract(
            r"\newtheorem{thm}{Theorem}[section]
              \newtheorem{lem}[thm]{Lemma}
              \newtheorem*{rem}{Remark}
              \begin{document}
              \section{A}
              \begin{thm}\label{a}x \label{b}\end{thm}
              \begin{lem}\label{c}y\end{lem}
              \begin{rem}z\label{c}\end{rem}
              \appendix
              \section{B}
              \begin{thm}w\label{d}\end{thm}
              \end{document}",
        );

        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| !r.body.contains("\\label{")));
        assert_eq!(records[0].label.as_deref(), Some("a"));
        assert_eq!(records[1].label, None);
        assert_eq!(records[2].label.as_deref(), Some("c"));
        assert_eq!(records[3].title, "Theorem A.1.");
    }

    #[test]
    fn test_label_with_nested_braces() {
        let records = extract(r"\begin{theorem}Body.\label{thm:{x}}\end{theorem}");
        assert_eq!(
            records,
            vec![TheoremRecord::new(
                "Theorem 1.",
                "Body.",
                Some("thm:{x}".to_string())
            )]
        );
    }
}

// ============================================================================
// Options
// ============================================================================

mod options {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_filter() {
        let options = ExtractOptions::default().with_kinds(["lemma"]);
        let output = extract_with_options(
            r"\begin{theorem}A\end{theorem}\begin{lemma}B\end{lemma}",
            &options,
        );
        assert_eq!(titles(&output.records), vec!["Lemma 1."]);
    }

    #[test]
    fn test_alpha_roots_override() {
        let options = ExtractOptions::default().with_alpha_roots(Vec::<String>::new());
        let output = extract_with_options(
            r"\newtheorem{thm}{Theorem}[section]
              \begin{document}
              \appendix
              \section{Proofs}
              \begin{thm}A\end{thm}
              \end{document}",
            &options,
        );
        assert_eq!(titles(&output.records), vec!["Theorem 1.1."]);
    }

    #[test]
    fn test_options_from_json() {
        let options: ExtractOptions =
            serde_json::from_str(r#"{"kinds": ["theorem"], "dedupe_titles": true}"#).unwrap();
        assert_eq!(options.default_environments.len(), 8);
        assert!(options.dedupe_titles);
    }
}

// ============================================================================
// Source Trees
// ============================================================================

mod sources {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_main_file_inlined_and_extracted() {
        let mut resolver = MemoryFileResolver::new();
        resolver.add_file(
            "main.tex",
            "\\documentclass{amsart}\n\\usepackage{defs}\n\\begin{document}\n\\input{sections/results}\n\\end{document}",
        );
        resolver.add_file("defs.sty", "\\newtheorem{thm}{Theorem}[section]");
        resolver.add_file(
            "sections/results.tex",
            "\\section{Results}\n\\begin{thm}\\label{thm:main}Main.\\end{thm}",
        );

        let main = find_main_file(&resolver).unwrap();
        assert_eq!(main, "main.tex");

        let source = resolver.read_file(&main).unwrap();
        let full = inline_imports(&source, &main, &resolver, 8).unwrap();

        assert_eq!(
            extract(&full),
            vec![TheoremRecord::new(
                "Theorem 1.1.",
                "Main.",
                Some("thm:main".to_string())
            )]
        );
    }

    #[test]
    fn test_latin1_bytes() {
        let output = extract_bytes(
            b"\\begin{theorem}Poincar\xe9\\end{theorem}",
            &ExtractOptions::default(),
        )
        .unwrap();
        assert_eq!(output.records[0].body, "Poincaré");
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

mod diagnostics {
    use super::*;

    #[test]
    fn test_clean_document_has_no_errors() {
        let result = check_document(
            r"\newtheorem{thm}{Theorem}\begin{document}\begin{thm}A\end{thm}\end{document}",
            &ExtractOptions::default(),
        );
        assert!(!result.has_errors());
    }

    #[test]
    fn test_unclosed_statement_reported() {
        let result = check_document(
            "\\begin{document}\n\\begin{theorem}never closed\n\\end{document}",
            &ExtractOptions::default(),
        );
        assert!(result.has_errors());
        assert!(result.summary().contains("error"));
    }
}
