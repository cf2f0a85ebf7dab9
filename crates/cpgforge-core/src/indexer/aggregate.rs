//! Merge per-file extraction results into one node list.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use crate::indexer::extractors::FileExtraction;
use crate::models::Node;

/// Nodes of a whole build plus per-file imports.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Aggregate {
    pub nodes: Vec<Node>,
    /// File (relative path) → imported module names, in walk order.
    pub imports: IndexMap<String, Vec<String>>,
    pub duplicates_dropped: usize,
}

/// Concatenate extraction results in order. The first node with a given id
/// wins; later ones are discarded, not merged.
pub fn aggregate(extractions: Vec<FileExtraction>) -> Aggregate {
    let mut out = Aggregate::default();
    let mut seen: HashSet<String> = HashSet::new();

    for extraction in extractions {
        for node in extraction.nodes {
            if seen.contains(&node.id) {
                debug!("Dropping duplicate node id {} from {}", node.id, extraction.file);
                out.duplicates_dropped += 1;
                continue;
            }
            seen.insert(node.id.clone());
            out.nodes.push(node);
        }
        if !extraction.imports.is_empty() {
            out.imports
                .entry(extraction.file)
                .or_default()
                .extend(extraction.imports);
        }
    }
    out
}
