//! Native syntax-tree parsing for the structured extractor.
//!
//! Python is the one language parsed with tree-sitter; every other language
//! is handled by a pattern extractor or the generic fallback. The capability
//! report tells callers which tier each detected language gets.

use serde::Serialize;

use crate::errors::{CpgError, CpgResult};
use crate::indexer::extractors::ExtractorRegistry;
use crate::indexer::filesystem::known_languages;
use crate::models::Fidelity;

/// Parse Python source into a tree-sitter tree.
///
/// tree-sitter recovers from syntax errors, but a tree containing error or
/// missing nodes is rejected here so a malformed file contributes nothing
/// rather than a half-understood structure.
pub fn parse_python(source: &str, path: &str) -> CpgResult<tree_sitter::Tree> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| CpgError::Extraction(format!("Failed to set language: {e}")))?;

    let tree = parser
        .parse(source.as_bytes(), None)
        .ok_or_else(|| CpgError::Parse(format!("Failed to parse {path}")))?;

    let root = tree.root_node();
    if root.has_error() {
        let line = first_error_line(root).unwrap_or(1);
        return Err(CpgError::Parse(format!("Syntax error in {path} near line {line}")));
    }
    Ok(tree)
}

fn first_error_line(node: tree_sitter::Node<'_>) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error_line)
}

/// Extraction tier available for one detected language.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LanguageCapability {
    pub language: String,
    pub fidelity: Fidelity,
}

/// Report the extraction tier of every language the detector recognizes.
pub fn extractor_capability_report(registry: &ExtractorRegistry) -> Vec<LanguageCapability> {
    known_languages()
        .into_iter()
        .map(|language| LanguageCapability {
            language: language.to_string(),
            fidelity: registry.for_language(language).fidelity(),
        })
        .collect()
}
