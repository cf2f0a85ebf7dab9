//! Extractor contract, registry and the per-file failure boundary.
//!
//! Each extractor turns one source file into nodes plus the module names the
//! file imports. Extractors are stateless across files and graded by
//! [`Fidelity`]; the registry picks the best one for a language tag and falls
//! back to [`GenericExtractor`] for anything it does not know.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::errors::CpgResult;
use crate::indexer::filesystem::FileRecord;
use crate::indexer::structured::PythonExtractor;
use crate::indexer::symbols::{GoExtractor, JavaExtractor, ScriptExtractor};
use crate::models::{Fidelity, Node, NodeKind};

/// One file handed to an extractor.
#[derive(Clone, Copy, Debug)]
pub struct SourceUnit<'a> {
    /// Path relative to the build root; stored on every node.
    pub path: &'a str,
    pub language: &'a str,
    pub source: &'a str,
}

impl SourceUnit<'_> {
    /// Module part of node ids: the file stem.
    pub fn module_name(&self) -> String {
        module_name(self.path)
    }
}

pub fn module_name(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Nodes and imports produced from one file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extraction {
    pub nodes: Vec<Node>,
    pub imports: Vec<String>,
}

pub trait Extractor: Send + Sync {
    /// Language tags this extractor is registered for.
    fn languages(&self) -> &'static [&'static str];

    fn fidelity(&self) -> Fidelity;

    fn extract(&self, unit: &SourceUnit<'_>) -> CpgResult<Extraction>;
}

// ---------------------------------------------------------------------------
// Generic fallback
// ---------------------------------------------------------------------------

/// Emits a single `module` node spanning the whole file.
#[derive(Clone, Copy, Debug, Default)]
pub struct GenericExtractor;

impl Extractor for GenericExtractor {
    fn languages(&self) -> &'static [&'static str] {
        &[]
    }

    fn fidelity(&self) -> Fidelity {
        Fidelity::Generic
    }

    fn extract(&self, unit: &SourceUnit<'_>) -> CpgResult<Extraction> {
        let module = unit.module_name();
        let line_count = unit.source.lines().count() as u32;
        let node = Node::new(
            module.clone(),
            NodeKind::Module,
            module,
            unit.path,
            unit.language,
            Fidelity::Generic,
            1,
            line_count,
        );
        Ok(Extraction {
            nodes: vec![node],
            imports: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct ExtractorRegistry {
    by_language: HashMap<&'static str, Arc<dyn Extractor>>,
    fallback: Arc<dyn Extractor>,
}

impl ExtractorRegistry {
    /// A registry with no dedicated extractors: everything is generic.
    pub fn empty() -> Self {
        Self {
            by_language: HashMap::new(),
            fallback: Arc::new(GenericExtractor),
        }
    }

    /// Register `extractor` for each of its languages, replacing any
    /// previous registration.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        for language in extractor.languages() {
            self.by_language.insert(*language, Arc::clone(&extractor));
        }
    }

    pub fn for_language(&self, language: &str) -> &dyn Extractor {
        self.by_language
            .get(language)
            .map(|e| e.as_ref())
            .unwrap_or_else(|| self.fallback.as_ref())
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(PythonExtractor));
        registry.register(Arc::new(ScriptExtractor));
        registry.register(Arc::new(JavaExtractor));
        registry.register(Arc::new(GoExtractor));
        registry
    }
}

// ---------------------------------------------------------------------------
// Failure boundary
// ---------------------------------------------------------------------------

/// A file whose extraction failed and contributed nothing to the graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExtractionFailure {
    pub file: String,
    pub language: String,
    /// `read` or `extract`.
    pub stage: String,
    pub message: String,
}

/// Result of extracting one file; never an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileExtraction {
    pub file: String,
    pub language: String,
    pub fidelity: Fidelity,
    pub nodes: Vec<Node>,
    pub imports: Vec<String>,
    pub failure: Option<ExtractionFailure>,
}

impl FileExtraction {
    fn failed(record: &FileRecord, fidelity: Fidelity, stage: &str, message: String) -> Self {
        warn!("Extraction of {} failed at {stage}: {message}", record.path);
        Self {
            file: record.path.clone(),
            language: record.language.clone(),
            fidelity,
            nodes: Vec::new(),
            imports: Vec::new(),
            failure: Some(ExtractionFailure {
                file: record.path.clone(),
                language: record.language.clone(),
                stage: stage.to_string(),
                message,
            }),
        }
    }
}

/// Text of a caught panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("extractor panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("extractor panicked: {s}")
    } else {
        "extractor panicked".to_string()
    }
}

/// Read and extract one file. Any failure, including a panic inside the
/// extractor, becomes an empty result carrying the failure record; it is
/// not retried.
pub fn extract_file(root: &Path, record: &FileRecord, registry: &ExtractorRegistry) -> FileExtraction {
    let extractor = registry.for_language(&record.language);
    let fidelity = extractor.fidelity();

    let bytes = match std::fs::read(root.join(&record.path)) {
        Ok(b) => b,
        Err(e) => return FileExtraction::failed(record, fidelity, "read", e.to_string()),
    };
    let source = String::from_utf8_lossy(&bytes);
    let unit = SourceUnit {
        path: &record.path,
        language: &record.language,
        source: &source,
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| extractor.extract(&unit)));
    match outcome {
        Ok(Ok(extraction)) => FileExtraction {
            file: record.path.clone(),
            language: record.language.clone(),
            fidelity,
            nodes: extraction.nodes,
            imports: extraction.imports,
            failure: None,
        },
        Ok(Err(e)) => FileExtraction::failed(record, fidelity, "extract", e.to_string()),
        Err(payload) => {
            FileExtraction::failed(record, fidelity, "extract", panic_message(payload.as_ref()))
        }
    }
}
