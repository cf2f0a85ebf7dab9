//! cpgforge core library: builds a code property graph from a source tree.
//!
//! Files are walked and handed to per-language extractors (tree-sitter for
//! Python, patterns for JavaScript/TypeScript, Java and Go, a single module
//! node for everything else), merged into one node list, and linked by a set
//! of name-based inference rules. Graphs can be annotated, merged with
//! collaborator edges and persisted in SQLite. With the `python` feature the
//! crate builds as the `_cpgforge_core` extension module.

pub mod annotations;
pub mod config;
pub mod errors;
pub mod graph;
pub mod indexer;
pub mod models;
pub mod store;

#[cfg(feature = "python")]
mod python;

pub use annotations::Annotations;
pub use config::BuildConfig;
pub use errors::{CpgError, CpgResult};
pub use graph::{ExternalEdge, Graph, GraphIndex, GraphStats, MergeReport};
pub use indexer::pipeline::{build_cpg, BuildOutput, CancelFlag};
pub use models::{Edge, EdgeKind, Fidelity, Node, NodeKind};
pub use store::database::GraphStore;

#[cfg(feature = "python")]
use pyo3::prelude::*;

// ---------------------------------------------------------------------------
// Top-level Python module: _cpgforge_core
// ---------------------------------------------------------------------------

#[cfg(feature = "python")]
#[pymodule]
fn _cpgforge_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_function(wrap_pyfunction!(python::build_cpg, m)?)?;
    m.add_function(wrap_pyfunction!(python::detect_language, m)?)?;
    m.add_function(wrap_pyfunction!(python::extractor_capability_report, m)?)?;
    Ok(())
}
