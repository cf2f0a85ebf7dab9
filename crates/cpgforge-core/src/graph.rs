//! The assembled code property graph and its presentation helpers.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::annotations::Annotations;
use crate::errors::{CpgError, CpgResult};
use crate::indexer::edges::dedup_edges;
use crate::models::{Edge, EdgeKind, Node, NodeKind};

/// Ordered nodes plus deduplicated edges. A value: nothing mutates it once
/// returned; merges produce a new graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Lookup tables over a borrowed [`Graph`].
pub struct GraphIndex<'a> {
    graph: &'a Graph,
    by_id: HashMap<&'a str, usize>,
    /// Id → (outgoing, incoming).
    degrees: HashMap<&'a str, (usize, usize)>,
    /// Class id → method count.
    methods: HashMap<&'a str, usize>,
}

impl<'a> GraphIndex<'a> {
    pub fn node(&self, id: &str) -> Option<&'a Node> {
        self.by_id.get(id).map(|&position| &self.graph.nodes[position])
    }

    pub fn degree(&self, id: &str) -> (usize, usize) {
        self.degrees.get(id).copied().unwrap_or_default()
    }

    pub fn describe(&self, id: &str) -> Option<String> {
        self.node(id).map(|node| self.render(node))
    }

    fn render(&self, node: &Node) -> String {
        let methods = self.methods.get(node.id.as_str()).copied().unwrap_or_default();
        self.graph.render_description(node, self.degree(&node.id), methods)
    }
}

/// Summary counts of a graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub nodes_by_kind: IndexMap<String, usize>,
    pub edges_by_kind: IndexMap<String, usize>,
    pub total_loc: u64,
    pub files: usize,
    pub languages: Vec<String>,
    /// `total_loc` shortened for display: `842`, `12k`.
    pub loc_label: String,
}

/// An edge offered by a collaborator, before validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExternalEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub accepted: usize,
    pub rejected: usize,
}

pub fn loc_label(total_loc: u64) -> String {
    if total_loc >= 1000 {
        format!("{}k", total_loc / 1000)
    } else {
        total_loc.to_string()
    }
}

const NODE_KINDS: [NodeKind; 4] = [
    NodeKind::Module,
    NodeKind::Class,
    NodeKind::Function,
    NodeKind::ApiCall,
];

const EDGE_KINDS: [EdgeKind; 6] = [
    EdgeKind::Calls,
    EdgeKind::Structural,
    EdgeKind::Dependency,
    EdgeKind::Flow,
    EdgeKind::Contains,
    EdgeKind::Pattern,
];

impl Graph {
    pub fn assemble(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Linear scan; use [`Graph::index`] for repeated lookups.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Id, degree and method-count lookups built in one pass.
    pub fn index(&self) -> GraphIndex<'_> {
        GraphIndex {
            graph: self,
            by_id: self
                .nodes
                .iter()
                .enumerate()
                .map(|(position, n)| (n.id.as_str(), position))
                .collect(),
            degrees: self.degrees(),
            methods: self.method_counts(),
        }
    }

    fn id_set(&self) -> HashSet<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    /// Check the structural invariants: unique node ids, edges between
    /// existing distinct nodes, unique `(source, target, kind)` triples.
    pub fn validate(&self) -> CpgResult<()> {
        let mut ids = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(CpgError::InvalidGraph(format!("duplicate node id {}", node.id)));
            }
        }
        let mut keys = HashSet::with_capacity(self.edges.len());
        for edge in &self.edges {
            if edge.source == edge.target {
                return Err(CpgError::InvalidGraph(format!("self-loop on {}", edge.source)));
            }
            for endpoint in [&edge.source, &edge.target] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(CpgError::InvalidGraph(format!(
                        "edge {} -> {} references unknown node {endpoint}",
                        edge.source, edge.target
                    )));
                }
            }
            if !keys.insert(edge.key()) {
                return Err(CpgError::InvalidGraph(format!(
                    "duplicate {} edge {} -> {}",
                    edge.kind, edge.source, edge.target
                )));
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> GraphStats {
        let mut nodes_by_kind: IndexMap<String, usize> =
            NODE_KINDS.iter().map(|k| (k.as_str().to_string(), 0)).collect();
        let mut edges_by_kind: IndexMap<String, usize> =
            EDGE_KINDS.iter().map(|k| (k.as_str().to_string(), 0)).collect();
        let mut files = HashSet::new();
        let mut languages = BTreeSet::new();
        let mut total_loc = 0u64;

        for node in &self.nodes {
            *nodes_by_kind.entry(node.kind.as_str().to_string()).or_default() += 1;
            files.insert(node.file.as_str());
            languages.insert(node.language.clone());
            total_loc += u64::from(node.loc);
        }
        for edge in &self.edges {
            *edges_by_kind.entry(edge.kind.as_str().to_string()).or_default() += 1;
        }

        GraphStats {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            nodes_by_kind,
            edges_by_kind,
            total_loc,
            files: files.len(),
            languages: languages.into_iter().collect(),
            loc_label: loc_label(total_loc),
        }
    }

    fn degrees(&self) -> HashMap<&str, (usize, usize)> {
        let mut degrees: HashMap<&str, (usize, usize)> = HashMap::new();
        for edge in &self.edges {
            degrees.entry(edge.source.as_str()).or_default().0 += 1;
            degrees.entry(edge.target.as_str()).or_default().1 += 1;
        }
        degrees
    }

    fn render_description(&self, node: &Node, degree: (usize, usize), methods: usize) -> String {
        let mut text = format!(
            "{} {} in {} (lines {}-{}, {} LoC)",
            node.kind, node.name, node.file, node.line_start, node.line_end, node.loc
        );

        let mut parts: Vec<String> = Vec::new();
        if !node.inherits.is_empty() {
            parts.push(format!("inherits {}", node.inherits.join(", ")));
        }
        if methods > 0 {
            parts.push(format!("{methods} methods"));
        }
        if !node.parameters.is_empty() {
            parts.push(format!("{} parameters", node.parameters.len()));
        }
        if !node.calls.is_empty() {
            parts.push(format!("{} calls", node.calls.len()));
        }
        if !node.variables.is_empty() {
            parts.push(format!("{} variables", node.variables.len()));
        }
        if !node.api_calls.is_empty() {
            parts.push(format!("{} API calls", node.api_calls.len()));
        }
        if let Some(parent) = &node.parent {
            parts.push(format!("called from {parent}"));
        }
        parts.push(format!("{} outgoing, {} incoming edges", degree.0, degree.1));

        text.push_str(": ");
        text.push_str(&parts.join("; "));
        text
    }

    fn method_counts(&self) -> HashMap<&str, usize> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for node in self.nodes.iter().filter(|n| n.is_method()) {
            if let Some(class_id) = node.parent_class.as_deref() {
                *counts.entry(class_id).or_default() += 1;
            }
        }
        counts
    }

    /// One-line summary of a node's shape and connectivity.
    ///
    /// Walks the whole graph; callers describing many nodes should go
    /// through [`Graph::index`] or [`Graph::descriptions`].
    pub fn describe_node(&self, id: &str) -> Option<String> {
        let node = self.node(id)?;
        let degree = self.edges.iter().fold((0, 0), |(out, inc), edge| {
            (out + usize::from(edge.source == id), inc + usize::from(edge.target == id))
        });
        let methods = self
            .nodes
            .iter()
            .filter(|n| n.is_method() && n.parent_class.as_deref() == Some(id))
            .count();
        Some(self.render_description(node, degree, methods))
    }

    /// [`Graph::describe_node`] for every node, in node order.
    pub fn descriptions(&self) -> IndexMap<String, String> {
        let index = self.index();
        self.nodes
            .iter()
            .map(|node| (node.id.clone(), index.render(node)))
            .collect()
    }

    /// Merge collaborator edges into a new graph.
    ///
    /// Relation aliases are normalized; edges with an unknown type, a
    /// missing endpoint or equal endpoints are rejected. An accepted edge
    /// matching an existing `(source, target, kind)` replaces its payload in
    /// place.
    pub fn with_external_edges(&self, external: Vec<ExternalEdge>) -> (Graph, MergeReport) {
        let ids = self.id_set();
        let mut report = MergeReport::default();
        let mut merged = self.edges.clone();

        for candidate in external {
            let Some(kind) = EdgeKind::from_label(&candidate.kind) else {
                debug!("Rejecting edge with unknown type {:?}", candidate.kind);
                report.rejected += 1;
                continue;
            };
            if candidate.source == candidate.target
                || !ids.contains(candidate.source.as_str())
                || !ids.contains(candidate.target.as_str())
            {
                debug!(
                    "Rejecting dangling edge {} -> {}",
                    candidate.source, candidate.target
                );
                report.rejected += 1;
                continue;
            }
            let mut edge = Edge::new(candidate.source, candidate.target, kind);
            edge.description = candidate.description;
            edge.confidence = candidate.confidence;
            merged.push(edge);
            report.accepted += 1;
        }

        let edges = dedup_edges(merged, |id| ids.contains(id));
        (Graph::assemble(self.nodes.clone(), edges), report)
    }

    /// Render as `{"nodes": [...], "edges": [...]}`, merging annotation
    /// fields into node objects when given.
    pub fn to_json(&self, annotations: Option<&Annotations>) -> CpgResult<Value> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let mut value = serde_json::to_value(node)?;
            if let (Some(annotations), Value::Object(object)) = (annotations, &mut value) {
                annotations.apply(&node.id, object);
            }
            nodes.push(value);
        }
        Ok(json!({
            "nodes": nodes,
            "edges": serde_json::to_value(&self.edges)?,
        }))
    }
}
