//! Build orchestration with Rayon-based parallel extraction.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::BuildConfig;
use crate::errors::{CpgError, CpgResult};
use crate::graph::Graph;
use crate::indexer::aggregate::aggregate;
use crate::indexer::edges::infer_edges;
use crate::indexer::extractors::{extract_file, ExtractionFailure, ExtractorRegistry, FileExtraction};
use crate::indexer::filesystem::{scan_source_files, FileRecord};

/// Cooperative cancellation shared between a build and its caller.
///
/// Checked before each file is extracted; a file already being extracted
/// runs to completion.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Extract every file on a pool of `workers` threads.
///
/// Results come back in `files` order regardless of completion order. If
/// the pool cannot be built, extraction runs sequentially.
pub fn parallel_extract(
    root: &Path,
    files: &[FileRecord],
    registry: &ExtractorRegistry,
    workers: usize,
    cancel: &CancelFlag,
) -> CpgResult<Vec<FileExtraction>> {
    if files.is_empty() {
        return Ok(vec![]);
    }

    let extract_one = |record: &FileRecord| -> Option<FileExtraction> {
        if cancel.is_cancelled() {
            return None;
        }
        Some(extract_file(root, record, registry))
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();

    let results: Option<Vec<FileExtraction>> = match pool {
        Ok(pool) => pool.install(|| files.par_iter().map(extract_one).collect()),
        Err(e) => {
            warn!("Falling back to sequential extraction: {e}");
            files.iter().map(extract_one).collect()
        }
    };
    results.ok_or(CpgError::Cancelled)
}

/// Everything a build produces.
#[derive(Clone, Debug)]
pub struct BuildOutput {
    pub graph: Graph,
    /// File → imported module names.
    pub imports: IndexMap<String, Vec<String>>,
    /// Files that contributed nothing because extraction failed.
    pub failures: Vec<ExtractionFailure>,
    /// File → SHA-256 of its contents at scan time, empty if unreadable.
    pub file_hashes: IndexMap<String, String>,
    pub files_seen: usize,
    pub duplicates_dropped: usize,
    pub elapsed_ms: u64,
}

/// Build the code property graph of the tree under `root`.
///
/// Per-file failures are reported in [`BuildOutput::failures`] and never
/// abort the build; an empty tree yields an empty graph. Only a missing
/// root and cancellation are errors.
pub fn build_cpg(root: &Path, config: &BuildConfig, cancel: &CancelFlag) -> CpgResult<BuildOutput> {
    build_cpg_with(root, config, &ExtractorRegistry::default(), cancel)
}

/// [`build_cpg`] with a caller-supplied extractor registry.
pub fn build_cpg_with(
    root: &Path,
    config: &BuildConfig,
    registry: &ExtractorRegistry,
    cancel: &CancelFlag,
) -> CpgResult<BuildOutput> {
    let started = Instant::now();
    if cancel.is_cancelled() {
        return Err(CpgError::Cancelled);
    }

    let (files_seen, records) = scan_source_files(root, config)?;
    info!("Found {} source files under {}", records.len(), root.display());
    let file_hashes: IndexMap<String, String> = records
        .iter()
        .map(|r| (r.path.clone(), r.content_hash.clone()))
        .collect();

    let extractions = parallel_extract(root, &records, registry, config.workers, cancel)?;
    let failures: Vec<ExtractionFailure> = extractions
        .iter()
        .filter_map(|e| e.failure.clone())
        .collect();

    let aggregated = aggregate(extractions);
    let edges = infer_edges(&aggregated.nodes, &aggregated.imports);
    let graph = Graph::assemble(aggregated.nodes, edges);

    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        "Built graph with {} nodes and {} edges from {} files in {elapsed_ms}ms ({} failed)",
        graph.node_count(),
        graph.edge_count(),
        files_seen,
        failures.len()
    );

    Ok(BuildOutput {
        graph,
        imports: aggregated.imports,
        failures,
        file_hashes,
        files_seen,
        duplicates_dropped: aggregated.duplicates_dropped,
        elapsed_ms,
    })
}
