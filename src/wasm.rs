//! WASM bindings for theorex
//!
//! This module provides JavaScript-accessible functions for theorem extraction.

#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

#[cfg(feature = "wasm")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "wasm")]
use crate::{ExtractOptions, TheoremRecord};

/// Extraction options (exposed to WASM)
#[cfg(feature = "wasm")]
#[derive(Serialize, Deserialize, Default)]
pub struct WasmExtractOptions {
    /// Keep only these statement kinds, e.g. `["theorem", "lemma"]`
    #[serde(default)]
    pub kinds: Option<Vec<String>>,
    /// Counters rendered alphabetically in the appendix
    #[serde(default)]
    pub alpha_roots: Option<Vec<String>>,
    /// Later statements replace earlier ones with the same title
    #[serde(default)]
    pub dedupe_titles: bool,
}

/// Extraction result with additional metadata
#[cfg(feature = "wasm")]
#[derive(Serialize, Deserialize)]
pub struct ExtractResult {
    /// Extracted statements
    pub records: Vec<TheoremRecord>,
    /// Whether extraction was successful
    pub success: bool,
    /// Error message if extraction failed
    pub error: Option<String>,
    /// Warnings during extraction
    pub warnings: Vec<String>,
}

/// Initialize panic hook for better error messages in browser console
#[cfg(feature = "wasm")]
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Extract statements with default options
///
/// # Returns
/// Array of `{ title, body, label }`
#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = "extract")]
pub fn extract_wasm(input: &str) -> JsValue {
    serde_wasm_bindgen::to_value(&crate::extract(input)).unwrap_or(JsValue::NULL)
}

/// Extract statements with options
#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = "extractWithOptions")]
pub fn extract_with_options_wasm(input: &str, options: JsValue) -> JsValue {
    let opts: WasmExtractOptions = serde_wasm_bindgen::from_value(options).unwrap_or_default();

    let extract_opts = ExtractOptions {
        alpha_roots: opts.alpha_roots,
        kinds: opts.kinds,
        dedupe_titles: opts.dedupe_titles,
        ..ExtractOptions::default()
    };

    let result = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        crate::extract_with_options(input, &extract_opts)
    })) {
        Ok(output) => ExtractResult {
            records: output.records,
            success: true,
            error: None,
            warnings: output.warnings.iter().map(|w| w.to_string()).collect(),
        },
        Err(e) => {
            let error_msg = if let Some(s) = e.downcast_ref::<&str>() {
                format!("Extraction failed: {}", s)
            } else if let Some(s) = e.downcast_ref::<String>() {
                format!("Extraction failed: {}", s)
            } else {
                "Extraction failed: unknown error (check browser console for details)".to_string()
            };
            ExtractResult {
                records: vec![],
                success: false,
                error: Some(error_msg),
                warnings: vec![],
            }
        }
    };

    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

/// Check a document for extraction issues
#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = "checkDocument")]
pub fn check_document_wasm(input: &str) -> JsValue {
    use crate::diagnostics::DiagnosticLevel;

    let result = crate::diagnostics::check_document(input, &ExtractOptions::default());

    // Group diagnostics by level
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut infos = Vec::new();

    for d in &result.diagnostics {
        match d.level {
            DiagnosticLevel::Error => errors.push(d.message.clone()),
            DiagnosticLevel::Warning => warnings.push(d.message.clone()),
            DiagnosticLevel::Info => infos.push(d.message.clone()),
        }
    }

    let summary = CheckSummary {
        errors,
        warnings,
        infos,
        has_errors: result.has_errors(),
    };
    serde_wasm_bindgen::to_value(&summary).unwrap_or(JsValue::NULL)
}

/// Summary of check results
#[cfg(feature = "wasm")]
#[derive(Serialize, Deserialize)]
pub struct CheckSummary {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub infos: Vec<String>,
    pub has_errors: bool,
}

/// Get version information
#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = "getVersion")]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
