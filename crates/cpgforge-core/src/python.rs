//! Python-facing functions of the `_cpgforge_core` extension module.

use std::path::PathBuf;

use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyList, PyString};
use serde_json::{json, Value};

use crate::config::BuildConfig;
use crate::errors::CpgError;
use crate::indexer::extractors::ExtractorRegistry;
use crate::indexer::{filesystem, parser, pipeline};

/// Convert a JSON value into the equivalent Python object.
fn json_to_py<'py>(py: Python<'py>, value: &Value) -> PyResult<Bound<'py, PyAny>> {
    Ok(match value {
        Value::Null => py.None().into_bound(py),
        Value::Bool(b) => PyBool::new(py, *b).to_owned().into_any(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into_pyobject(py)?.into_any()
            } else if let Some(u) = n.as_u64() {
                u.into_pyobject(py)?.into_any()
            } else {
                n.as_f64().unwrap_or(0.0).into_pyobject(py)?.into_any()
            }
        }
        Value::String(s) => PyString::new(py, s).into_any(),
        Value::Array(items) => {
            let list = PyList::empty(py);
            for item in items {
                list.append(json_to_py(py, item)?)?;
            }
            list.into_any()
        }
        Value::Object(map) => {
            let dict = PyDict::new(py);
            for (key, item) in map {
                dict.set_item(key, json_to_py(py, item)?)?;
            }
            dict.into_any()
        }
    })
}

/// Build the code property graph of a directory.
///
/// Returns a dict with `nodes`, `edges`, `stats`, `failures`,
/// `file_hashes` and `files_seen`. The GIL is released while building.
#[pyfunction]
#[pyo3(signature = (path, workers=None))]
pub fn build_cpg(py: Python<'_>, path: PathBuf, workers: Option<usize>) -> PyResult<PyObject> {
    let mut config = BuildConfig::from_env();
    if let Some(n) = workers {
        config = config.with_workers(n);
    }
    let cancel = pipeline::CancelFlag::new();
    let output = py.allow_threads(|| pipeline::build_cpg(&path, &config, &cancel))?;

    let mut result = output.graph.to_json(None)?;
    if let Value::Object(map) = &mut result {
        map.insert(
            "stats".to_string(),
            serde_json::to_value(output.graph.stats()).map_err(CpgError::from)?,
        );
        map.insert(
            "failures".to_string(),
            serde_json::to_value(&output.failures).map_err(CpgError::from)?,
        );
        map.insert("file_hashes".to_string(), json!(output.file_hashes));
        map.insert("files_seen".to_string(), json!(output.files_seen));
        map.insert("elapsed_ms".to_string(), json!(output.elapsed_ms));
    }
    Ok(json_to_py(py, &result)?.unbind())
}

#[pyfunction]
pub fn detect_language(path: &str) -> Option<String> {
    filesystem::detect_language(path)
}

/// List of `{language, fidelity}` dicts for every detectable language.
#[pyfunction]
pub fn extractor_capability_report(py: Python<'_>) -> PyResult<PyObject> {
    let report = parser::extractor_capability_report(&ExtractorRegistry::default());
    let value = serde_json::to_value(report).map_err(CpgError::from)?;
    Ok(json_to_py(py, &value)?.unbind())
}
