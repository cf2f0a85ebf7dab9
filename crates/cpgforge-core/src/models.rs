//! Node and edge schema shared by the extractors, the edge engine and the
//! assembled graph.
//!
//! Field names follow the JSON contract consumed by downstream collaborators
//! (embedding, clustering, LLM relation discovery, visualization). `kind` is
//! serialized as `type` on both nodes and edges.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Node kinds and extractor fidelity
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Module,
    Class,
    Function,
    ApiCall,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Module => "module",
            NodeKind::Class => "class",
            NodeKind::Function => "function",
            NodeKind::ApiCall => "api_call",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality tier of the extractor that produced a node.
///
/// Consumers can discount `pattern` and `generic` nodes: they come from
/// regex scans or whole-file fallbacks rather than a syntax tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fidelity {
    Structured,
    Pattern,
    Generic,
}

impl Fidelity {
    pub fn as_str(self) -> &'static str {
        match self {
            Fidelity::Structured => "structured",
            Fidelity::Pattern => "pattern",
            Fidelity::Generic => "generic",
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A code entity in the property graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: String,
    pub file: String,
    pub language: String,
    pub line_start: u32,
    pub line_end: u32,
    pub loc: u32,
    pub fidelity: Fidelity,
    /// Base-class names as written, unresolved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inherits: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub calls: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub variables: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_class: Option<String>,
    /// Enclosing function id of an `api_call` node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_calls: Vec<String>,
}

impl Node {
    /// Create a node with empty optional fields. `loc` is derived from the
    /// line span and never drops below 1.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        kind: NodeKind,
        name: impl Into<String>,
        file: &str,
        language: &str,
        fidelity: Fidelity,
        line_start: u32,
        line_end: u32,
    ) -> Self {
        let line_end = line_end.max(line_start);
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            file: file.to_string(),
            language: language.to_string(),
            line_start,
            line_end,
            loc: line_end - line_start + 1,
            fidelity,
            inherits: Vec::new(),
            calls: BTreeSet::new(),
            variables: BTreeSet::new(),
            parameters: Vec::new(),
            parent_class: None,
            parent: None,
            api_calls: Vec::new(),
        }
    }

    pub fn is_method(&self) -> bool {
        self.kind == NodeKind::Function && self.parent_class.is_some()
    }
}

/// Id of a call-site node: `api_<enclosing-id>_<callee>_<line>`.
pub fn api_call_id(enclosing_id: &str, callee: &str, line: u32) -> String {
    format!("api_{enclosing_id}_{callee}_{line}")
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Calls,
    Structural,
    Dependency,
    Flow,
    Contains,
    /// Architectural relationship appended by external collaborators; the
    /// core never infers it.
    Pattern,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Calls => "calls",
            EdgeKind::Structural => "structural",
            EdgeKind::Dependency => "dependency",
            EdgeKind::Flow => "flow",
            EdgeKind::Contains => "contains",
            EdgeKind::Pattern => "pattern",
        }
    }

    /// Map a relation label, including the aliases collaborators emit, onto
    /// an edge kind.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "calls" | "call" => Some(EdgeKind::Calls),
            "structural" | "composition" | "inheritance" | "inherits" => {
                Some(EdgeKind::Structural)
            }
            "dependency" | "import" | "imports" | "same_file" | "coupling" => {
                Some(EdgeKind::Dependency)
            }
            "flow" | "data_flow" | "temporal" => Some(EdgeKind::Flow),
            "contains" => Some(EdgeKind::Contains),
            "pattern" => Some(EdgeKind::Pattern),
            _ => None,
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inferred (or externally appended) relationship between two nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_vars: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            shared_vars: None,
            description: None,
            confidence: None,
        }
    }

    pub fn flow(
        source: impl Into<String>,
        target: impl Into<String>,
        shared_vars: BTreeSet<String>,
    ) -> Self {
        Self {
            shared_vars: Some(shared_vars),
            ..Self::new(source, target, EdgeKind::Flow)
        }
    }

    /// Dedup key: `(source, target, kind)`.
    pub fn key(&self) -> (String, String, EdgeKind) {
        (self.source.clone(), self.target.clone(), self.kind)
    }
}
