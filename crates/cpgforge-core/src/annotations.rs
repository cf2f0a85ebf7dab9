//! Node annotations kept beside the graph.
//!
//! Collaborators attach opaque fields (risk level, failure reason, cluster
//! labels) to nodes after a build. They are stored here keyed by node id
//! and merged into node objects only when the graph is rendered; the graph
//! itself is never touched.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names owned by the node schema. Annotations using them are kept
/// but never rendered over the core value.
pub const CORE_NODE_FIELDS: &[&str] = &[
    "id",
    "type",
    "name",
    "file",
    "language",
    "line_start",
    "line_end",
    "loc",
    "fidelity",
    "inherits",
    "calls",
    "variables",
    "parameters",
    "parent_class",
    "parent",
    "api_calls",
];

pub fn is_core_field(key: &str) -> bool {
    CORE_NODE_FIELDS.contains(&key)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Annotations {
    by_node: IndexMap<String, Map<String, Value>>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch the fields of `node_id`. Keys already present are overwritten;
    /// other keys are left alone. Content is not validated.
    pub fn annotate(&mut self, node_id: impl Into<String>, fields: Map<String, Value>) {
        let entry = self.by_node.entry(node_id.into()).or_default();
        for (key, value) in fields {
            entry.insert(key, value);
        }
    }

    /// Set `defaults` on every listed node, only for keys it does not have yet.
    pub fn fill_defaults<'a>(
        &mut self,
        node_ids: impl IntoIterator<Item = &'a str>,
        defaults: &Map<String, Value>,
    ) {
        for id in node_ids {
            let entry = self.by_node.entry(id.to_string()).or_default();
            for (key, value) in defaults {
                if !entry.contains_key(key) {
                    entry.insert(key.clone(), value.clone());
                }
            }
        }
    }

    pub fn get(&self, node_id: &str) -> Option<&Map<String, Value>> {
        self.by_node.get(node_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Map<String, Value>)> {
        self.by_node.iter()
    }

    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }

    /// Merge the annotations of `node_id` into a rendered node object,
    /// skipping core fields.
    pub fn apply(&self, node_id: &str, object: &mut Map<String, Value>) {
        if let Some(fields) = self.by_node.get(node_id) {
            for (key, value) in fields {
                if !is_core_field(key) {
                    object.insert(key.clone(), value.clone());
                }
            }
        }
    }
}
