//! Error types for the cpgforge core library.

/// Top-level error enum for the cpgforge core library.
#[derive(Debug, thiserror::Error)]
pub enum CpgError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Walk error: {0}")]
    Walk(String),

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Build cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(feature = "python")]
impl From<CpgError> for pyo3::PyErr {
    fn from(err: CpgError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
        match &err {
            CpgError::Io(_) | CpgError::Walk(_) => PyIOError::new_err(err.to_string()),
            CpgError::Parse(_) | CpgError::Json(_) | CpgError::InvalidGraph(_) => {
                PyValueError::new_err(err.to_string())
            }
            CpgError::Extraction(_) | CpgError::Store(_) | CpgError::Cancelled => {
                PyRuntimeError::new_err(err.to_string())
            }
        }
    }
}

pub type CpgResult<T> = Result<T, CpgError>;
