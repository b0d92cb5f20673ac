//! Python bindings for theorex

use pyo3::prelude::*;

/// Extract statements as `(title, body, label)` tuples
#[pyfunction]
fn extract(document: &str) -> Vec<(String, String, Option<String>)> {
    theorex::extract(document)
        .into_iter()
        .map(|record| (record.title, record.body, record.label))
        .collect()
}

/// Extract statements from raw bytes (UTF-8, Latin-1 fallback)
#[pyfunction]
fn extract_bytes(document: &[u8]) -> PyResult<Vec<(String, String, Option<String>)>> {
    let output = theorex::extract_bytes(document, &theorex::ExtractOptions::default())
        .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))?;
    Ok(output
        .records
        .into_iter()
        .map(|record| (record.title, record.body, record.label))
        .collect())
}

#[pymodule]
fn _native(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(extract, m)?)?;
    m.add_function(wrap_pyfunction!(extract_bytes, m)?)?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
