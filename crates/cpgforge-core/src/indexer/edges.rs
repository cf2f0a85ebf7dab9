//! Edge inference over aggregated nodes.
//!
//! Seven independent rules run per node against lookup tables built once
//! after aggregation:
//!
//! 1. `calls`: exact name, trailing segment of a dotted name, and substring
//!    fan-out against every indexed name (recall over precision).
//! 2. `structural`: declared base names that resolve by name.
//! 3. `dependency`: every node of every other file matching an import.
//! 4. `dependency`: every other node of the same file.
//! 5. `structural`: class to each of its methods.
//! 6. `contains`: enclosing function to its `api_call` nodes.
//! 7. `flow`: both directions between nodes sharing referenced variables.
//!
//! The union is deduplicated by `(source, target, kind)`, later duplicates
//! overwriting earlier ones in place, then dangling edges and self-loops are
//! dropped.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use tracing::debug;

use crate::models::{Edge, EdgeKind, Node, NodeKind};

/// Lookup tables shared by all rules. Never updated after construction.
pub struct EdgeIndex<'a> {
    /// Node name → id. A later node with the same name replaces the earlier
    /// one; names keep their first-seen position for fan-out order.
    by_name: IndexMap<&'a str, &'a str>,
    /// Lower-cased names paired with their resolved id, in `by_name` order.
    lowered: Vec<(String, &'a str)>,
    /// File → ids declared in it, in node order.
    by_file: IndexMap<&'a str, Vec<&'a str>>,
    /// Class id → method ids.
    methods_by_class: HashMap<&'a str, Vec<&'a str>>,
    /// Variable → indices of nodes referencing it.
    by_variable: HashMap<&'a str, Vec<usize>>,
    ids: HashSet<&'a str>,
}

impl<'a> EdgeIndex<'a> {
    pub fn build(nodes: &'a [Node]) -> Self {
        let mut by_name: IndexMap<&str, &str> = IndexMap::new();
        let mut by_file: IndexMap<&str, Vec<&str>> = IndexMap::new();
        let mut methods_by_class: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut by_variable: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut ids = HashSet::with_capacity(nodes.len());

        for (index, node) in nodes.iter().enumerate() {
            by_name.insert(&node.name, &node.id);
            by_file.entry(&node.file).or_default().push(&node.id);
            if node.is_method() {
                if let Some(class_id) = node.parent_class.as_deref() {
                    methods_by_class.entry(class_id).or_default().push(&node.id);
                }
            }
            for var in &node.variables {
                by_variable.entry(var).or_default().push(index);
            }
            ids.insert(node.id.as_str());
        }

        let lowered = by_name
            .iter()
            .map(|(name, id)| (name.to_lowercase(), *id))
            .collect();

        Self {
            by_name,
            lowered,
            by_file,
            methods_by_class,
            by_variable,
            ids,
        }
    }

    pub fn resolve(&self, name: &str) -> Option<&'a str> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Rule 1: call targets for one call name, with repeats.
    fn call_targets(&self, call: &str, caller: &str) -> Vec<&'a str> {
        let mut targets = Vec::new();
        if let Some(id) = self.resolve(call).filter(|id| *id != caller) {
            targets.push(id);
        }
        if let Some((_, last)) = call.rsplit_once('.') {
            if let Some(id) = self.resolve(last) {
                targets.push(id);
            }
        }
        let call_lower = call.to_lowercase();
        for (name, id) in &self.lowered {
            if *id != caller && (name.contains(&call_lower) || call_lower.contains(name.as_str())) {
                targets.push(*id);
            }
        }
        targets
    }

    /// Rule 3: files other than `own_file` whose path matches `module`.
    fn import_targets(&self, module: &str, own_file: &str) -> Vec<&'a str> {
        let module = normalize_import(module);
        if module.is_empty() {
            return Vec::new();
        }
        let slashed = module.replace('.', "/");
        self.by_file
            .iter()
            .filter(|(file, _)| **file != own_file)
            .filter(|(file, _)| {
                file.contains(module)
                    || file.contains(slashed.as_str())
                    || file.split('/').any(|segment| segment == module)
            })
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }
}

/// Strip relative-path prefixes (`./`, `../`, leading dots) from an import.
pub fn normalize_import(module: &str) -> &str {
    let mut rest = module.trim();
    loop {
        if let Some(stripped) = rest.strip_prefix("../") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('.') {
            rest = stripped;
        } else {
            return rest;
        }
    }
}

/// Infer the deduplicated edge list for `nodes`.
///
/// `imports` maps a node's `file` to the module names that file imports.
pub fn infer_edges(nodes: &[Node], imports: &IndexMap<String, Vec<String>>) -> Vec<Edge> {
    let index = EdgeIndex::build(nodes);
    // Import targets depend only on the importing file.
    let targets_by_file: IndexMap<&str, Vec<&str>> = imports
        .iter()
        .filter(|(file, _)| index.by_file.contains_key(file.as_str()))
        .map(|(file, modules)| {
            let targets = modules
                .iter()
                .flat_map(|module| index.import_targets(module, file))
                .collect();
            (file.as_str(), targets)
        })
        .collect();
    let mut raw: Vec<Edge> = Vec::new();
    let mut per_rule = [0usize; 7];

    for (position, node) in nodes.iter().enumerate() {
        let id = node.id.as_str();

        // 1. calls
        for call in &node.calls {
            for target in index.call_targets(call, id) {
                raw.push(Edge::new(id, target, EdgeKind::Calls));
                per_rule[0] += 1;
            }
        }

        // 2. inheritance
        for base in &node.inherits {
            if let Some(target) = index.resolve(base) {
                raw.push(Edge::new(id, target, EdgeKind::Structural));
                per_rule[1] += 1;
            }
        }

        // 3. imports
        if let Some(targets) = targets_by_file.get(node.file.as_str()) {
            for target in targets {
                raw.push(Edge::new(id, *target, EdgeKind::Dependency));
                per_rule[2] += 1;
            }
        }

        // 4. same file
        if let Some(siblings) = index.by_file.get(node.file.as_str()) {
            for sibling in siblings.iter().filter(|s| **s != id) {
                raw.push(Edge::new(id, *sibling, EdgeKind::Dependency));
                per_rule[3] += 1;
            }
        }

        // 5. class → methods
        if node.kind == NodeKind::Class {
            if let Some(methods) = index.methods_by_class.get(id) {
                for method in methods {
                    raw.push(Edge::new(id, *method, EdgeKind::Structural));
                    per_rule[4] += 1;
                }
            }
        }

        // 6. api containment
        if node.kind == NodeKind::ApiCall {
            if let Some(parent) = node.parent.as_deref() {
                raw.push(Edge::new(parent, id, EdgeKind::Contains));
                per_rule[5] += 1;
            }
        }

        // 7. shared variables
        if !node.variables.is_empty() {
            let candidates: BTreeSet<usize> = node
                .variables
                .iter()
                .filter_map(|var| index.by_variable.get(var.as_str()))
                .flatten()
                .copied()
                .filter(|&other| other != position)
                .collect();
            for other in candidates {
                let other = &nodes[other];
                let shared: BTreeSet<String> =
                    node.variables.intersection(&other.variables).cloned().collect();
                if !shared.is_empty() {
                    raw.push(Edge::flow(id, other.id.as_str(), shared));
                    per_rule[6] += 1;
                }
            }
        }
    }

    debug!(
        "Edge rules produced calls={} inherits={} imports={} same_file={} class_methods={} contains={} flow={}",
        per_rule[0], per_rule[1], per_rule[2], per_rule[3], per_rule[4], per_rule[5], per_rule[6]
    );

    let edges = dedup_edges(raw, |id| index.contains(id));
    debug!("Kept {} edges after deduplication", edges.len());
    edges
}

/// Deduplicate by `(source, target, kind)`, a later edge replacing the
/// payload of an earlier one at the earlier position. Edges whose endpoints
/// fail `exists`, and self-loops, are dropped.
pub fn dedup_edges(edges: Vec<Edge>, exists: impl Fn(&str) -> bool) -> Vec<Edge> {
    let mut unique: IndexMap<(String, String, EdgeKind), Edge> = IndexMap::new();
    for edge in edges {
        unique.insert(edge.key(), edge);
    }
    unique
        .into_values()
        .filter(|e| e.source != e.target && exists(&e.source) && exists(&e.target))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Fidelity;

    fn node(id: &str, kind: NodeKind, name: &str, file: &str) -> Node {
        Node::new(id, kind, name, file, "python", Fidelity::Structured, 1, 3)
    }

    fn has_edge(edges: &[Edge], source: &str, target: &str, kind: EdgeKind) -> bool {
        edges
            .iter()
            .any(|e| e.source == source && e.target == target && e.kind == kind)
    }

    fn vars(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_import() {
        assert_eq!(normalize_import("./api"), "api");
        assert_eq!(normalize_import("../../lib/util"), "lib/util");
        assert_eq!(normalize_import(".models"), "models");
        assert_eq!(normalize_import("."), "");
        assert_eq!(normalize_import("os.path"), "os.path");
    }

    #[test]
    fn test_shared_variables_flow_both_directions() {
        let mut a = node("m.a", NodeKind::Function, "a", "m.py");
        a.variables = vars(&["cache", "x"]);
        let mut b = node("m.b", NodeKind::Function, "b", "m.py");
        b.variables = vars(&["cache", "y"]);
        let nodes = vec![a, b];

        let edges = infer_edges(&nodes, &IndexMap::new());
        let flow: Vec<&Edge> = edges.iter().filter(|e| e.kind == EdgeKind::Flow).collect();
        assert_eq!(flow.len(), 2);
        for edge in flow {
            assert_eq!(edge.shared_vars.as_ref().unwrap(), &vars(&["cache"]));
        }
        assert!(has_edge(&edges, "m.a", "m.b", EdgeKind::Flow));
        assert!(has_edge(&edges, "m.b", "m.a", EdgeKind::Flow));
    }

    #[test]
    fn test_flow_requires_intersection() {
        let mut a = node("m.a", NodeKind::Function, "a", "a.py");
        a.variables = vars(&["x"]);
        let mut b = node("n.b", NodeKind::Function, "b", "b.py");
        b.variables = vars(&["y"]);
        let edges = infer_edges(&[a, b], &IndexMap::new());
        assert!(edges.is_empty());
    }

    #[test]
    fn test_inheritance_resolves_by_name() {
        let mut derived = node("shapes.Derived", NodeKind::Class, "Derived", "shapes.py");
        derived.inherits = vec!["Base".to_string(), "Unknown".to_string()];
        let base = node("core.Base", NodeKind::Class, "Base", "core.py");
        let edges = infer_edges(&[derived, base], &IndexMap::new());
        assert!(has_edge(&edges, "shapes.Derived", "core.Base", EdgeKind::Structural));
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn test_class_to_methods_keyed_by_class_id() {
        let class = node("models.User", NodeKind::Class, "User", "models.py");
        let mut method = node("models.User.save", NodeKind::Function, "save", "models.py");
        method.parent_class = Some("models.User".to_string());
        let other_class = node("legacy.User", NodeKind::Class, "User", "legacy.py");

        let edges = infer_edges(&[class, method, other_class], &IndexMap::new());
        assert!(has_edge(&edges, "models.User", "models.User.save", EdgeKind::Structural));
        assert!(!has_edge(&edges, "legacy.User", "models.User.save", EdgeKind::Structural));
    }

    #[test]
    fn test_call_resolution_exact_trailing_and_fan_out() {
        let mut caller = node("main.run", NodeKind::Function, "run", "main.py");
        caller.calls = vars(&["utils.process"]);
        let process = node("utils.process", NodeKind::Function, "process", "utils.py");
        let preprocess = node("utils.preprocess", NodeKind::Function, "preprocess", "utils.py");
        let unrelated = node("utils.validate", NodeKind::Function, "validate", "utils.py");

        let edges = infer_edges(&[caller, process, preprocess, unrelated], &IndexMap::new());
        assert!(has_edge(&edges, "main.run", "utils.process", EdgeKind::Calls));
        // Neither "utils.process" nor "preprocess" contains the other.
        assert!(!has_edge(&edges, "main.run", "utils.preprocess", EdgeKind::Calls));
        assert!(!has_edge(&edges, "main.run", "utils.validate", EdgeKind::Calls));
    }

    #[test]
    fn test_call_fan_out_is_case_insensitive() {
        let mut caller = node("app.main", NodeKind::Function, "main", "app.py");
        caller.calls = vars(&["Load"]);
        let load = node("io.load_all", NodeKind::Function, "load_all", "io.py");
        let reload = node("io.reload", NodeKind::Function, "reload", "io.py");
        let edges = infer_edges(&[caller, load, reload], &IndexMap::new());
        assert!(has_edge(&edges, "app.main", "io.load_all", EdgeKind::Calls));
        assert!(has_edge(&edges, "app.main", "io.reload", EdgeKind::Calls));
    }

    #[test]
    fn test_import_dependency_targets_every_node_of_matching_file() {
        let importer = node("main.main", NodeKind::Function, "main", "app/main.py");
        let user = node("models.User", NodeKind::Class, "User", "app/models.py");
        let product = node("models.Product", NodeKind::Class, "Product", "app/models.py");
        let other = node("views.index", NodeKind::Function, "index", "app/views.py");
        let mut imports = IndexMap::new();
        imports.insert("app/main.py".to_string(), vec!["models".to_string()]);

        let edges = infer_edges(&[importer, user, product, other], &imports);
        assert!(has_edge(&edges, "main.main", "models.User", EdgeKind::Dependency));
        assert!(has_edge(&edges, "main.main", "models.Product", EdgeKind::Dependency));
        assert!(!has_edge(&edges, "main.main", "views.index", EdgeKind::Dependency));
    }

    #[test]
    fn test_import_targets_apply_to_every_node_of_importing_file() {
        let run = node("main.run", NodeKind::Function, "run", "app/main.py");
        let stop = node("main.stop", NodeKind::Function, "stop", "app/main.py");
        let user = node("models.User", NodeKind::Class, "User", "app/models.py");
        let helper = node("utils.helper", NodeKind::Function, "helper", "app/utils.py");
        let mut imports = IndexMap::new();
        imports.insert(
            "app/main.py".to_string(),
            vec!["models".to_string(), "utils".to_string(), "missing".to_string()],
        );
        imports.insert("gone/ghost.py".to_string(), vec!["models".to_string()]);

        let edges = infer_edges(&[run, stop, user, helper], &imports);
        let dependency_targets = |source: &str| -> Vec<&str> {
            edges
                .iter()
                .filter(|e| {
                    e.source == source
                        && e.kind == EdgeKind::Dependency
                        && !e.target.starts_with("main.")
                })
                .map(|e| e.target.as_str())
                .collect()
        };
        assert_eq!(dependency_targets("main.run"), vec!["models.User", "utils.helper"]);
        assert_eq!(dependency_targets("main.stop"), vec!["models.User", "utils.helper"]);
        let into_user = edges
            .iter()
            .filter(|e| e.target == "models.User" && e.kind == EdgeKind::Dependency)
            .count();
        assert_eq!(into_user, 2);
    }

    #[test]
    fn test_import_dotted_and_relative_names() {
        let importer = node("Main.run", NodeKind::Function, "run", "src/Main.java");
        let target = node("User.User", NodeKind::Class, "User", "src/com/acme/model/User.java");
        let js = node("App.App", NodeKind::Function, "App", "web/App.js");
        let api = node("api.get", NodeKind::Function, "get", "web/api.js");
        let mut imports = IndexMap::new();
        imports.insert("src/Main.java".to_string(), vec!["com.acme.model.User".to_string()]);
        imports.insert("web/App.js".to_string(), vec!["./api".to_string(), ".".to_string()]);

        let edges = infer_edges(&[importer, target, js, api], &imports);
        assert!(has_edge(&edges, "Main.run", "User.User", EdgeKind::Dependency));
        assert!(has_edge(&edges, "App.App", "api.get", EdgeKind::Dependency));
        assert!(!has_edge(&edges, "App.App", "Main.run", EdgeKind::Dependency));
    }

    #[test]
    fn test_same_file_clique() {
        let nodes = vec![
            node("m.a", NodeKind::Function, "a", "m.py"),
            node("m.b", NodeKind::Function, "b", "m.py"),
            node("m.c", NodeKind::Function, "c", "m.py"),
        ];
        let edges = infer_edges(&nodes, &IndexMap::new());
        assert_eq!(edges.len(), 6);
        assert!(edges.iter().all(|e| e.kind == EdgeKind::Dependency));
    }

    #[test]
    fn test_api_containment() {
        let mut fetch = node("svc.fetch", NodeKind::Function, "fetch", "svc.py");
        fetch.api_calls = vec!["api_svc.fetch_requests.get_2".to_string()];
        let mut call = node("api_svc.fetch_requests.get_2", NodeKind::ApiCall, "requests.get", "other.py");
        call.parent = Some("svc.fetch".to_string());
        let mut orphan = node("api_gone_requests.get_9", NodeKind::ApiCall, "requests.get", "x.py");
        orphan.parent = Some("gone".to_string());

        let edges = infer_edges(&[fetch, call, orphan], &IndexMap::new());
        assert!(has_edge(&edges, "svc.fetch", "api_svc.fetch_requests.get_2", EdgeKind::Contains));
        assert!(!edges.iter().any(|e| e.source == "gone"));
    }

    #[test]
    fn test_no_self_loops_and_endpoints_exist() {
        let mut recursive = node("m.fact", NodeKind::Function, "fact", "m.py");
        recursive.calls = vars(&["fact", "missing"]);
        recursive.variables = vars(&["n"]);
        let mut missing = node("m.helper", NodeKind::Function, "helper", "m.py");
        missing.inherits = vec!["fact".to_string()];
        let nodes = vec![recursive, missing];

        let edges = infer_edges(&nodes, &IndexMap::new());
        let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in &edges {
            assert_ne!(edge.source, edge.target);
            assert!(ids.contains(edge.source.as_str()));
            assert!(ids.contains(edge.target.as_str()));
        }
    }

    #[test]
    fn test_inference_is_deterministic_and_unique() {
        let mut a = node("m.a", NodeKind::Function, "a", "m.py");
        a.calls = vars(&["b", "m.b"]);
        a.variables = vars(&["v"]);
        let mut b = node("m.b", NodeKind::Function, "b", "m.py");
        b.variables = vars(&["v"]);
        let nodes = vec![a, b];

        let first = infer_edges(&nodes, &IndexMap::new());
        let second = infer_edges(&nodes, &IndexMap::new());
        assert_eq!(first, second);

        let keys: HashSet<_> = first.iter().map(Edge::key).collect();
        assert_eq!(keys.len(), first.len());
    }

    #[test]
    fn test_dedup_overwrites_in_place() {
        let mut described = Edge::new("a", "b", EdgeKind::Calls);
        described.description = Some("later".to_string());
        let edges = dedup_edges(
            vec![
                Edge::new("a", "b", EdgeKind::Calls),
                Edge::new("b", "a", EdgeKind::Calls),
                described,
                Edge::new("a", "a", EdgeKind::Calls),
            ],
            |_| true,
        );
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].source, "a");
        assert_eq!(edges[0].description.as_deref(), Some("later"));
    }
}
