//! Structured Python extraction over a tree-sitter syntax tree.
//!
//! Records classes (with declared base names), functions and methods
//! (including nested and `async` ones) with their calls, referenced
//! identifiers and parameters, and materializes outbound HTTP/API calls as
//! `api_call` nodes nested under the calling function. Imports are recorded
//! at module granularity.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use tree_sitter::Node as TsNode;

use crate::errors::CpgResult;
use crate::indexer::extractors::{Extraction, Extractor, SourceUnit};
use crate::indexer::parser::parse_python;
use crate::models::{api_call_id, Fidelity, Node, NodeKind};

/// Library names whose presence in a callee marks an external API call.
const API_LIBRARIES: &[&str] = &[
    "requests", "httpx", "urllib", "flask", "fastapi", "django", "aiohttp",
];

/// Bare callee names treated as HTTP verbs.
const API_VERBS: &[&str] = &["get", "post", "put", "delete", "patch"];

/// Receiver names never reported as referenced variables.
const RECEIVER_NAMES: &[&str] = &["self", "cls"];

pub fn is_api_call(callee: &str) -> bool {
    let lower = callee.to_lowercase();
    API_LIBRARIES.iter().any(|lib| lower.contains(lib)) || API_VERBS.contains(&lower.as_str())
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PythonExtractor;

impl Extractor for PythonExtractor {
    fn languages(&self) -> &'static [&'static str] {
        &["python"]
    }

    fn fidelity(&self) -> Fidelity {
        Fidelity::Structured
    }

    fn extract(&self, unit: &SourceUnit<'_>) -> CpgResult<Extraction> {
        let tree = parse_python(unit.source, unit.path)?;
        let mut visitor = PythonVisitor::new(unit);
        let module = unit.module_name();
        visitor.visit(tree.root_node(), &Scope::Module(module));
        Ok(Extraction {
            nodes: visitor.nodes,
            imports: visitor.imports,
        })
    }
}

// ---------------------------------------------------------------------------
// Visitor
// ---------------------------------------------------------------------------

/// Innermost definition enclosing the node being visited.
enum Scope {
    Module(String),
    Class(String),
    Function(String),
}

impl Scope {
    fn prefix(&self) -> &str {
        match self {
            Scope::Module(id) | Scope::Class(id) | Scope::Function(id) => id,
        }
    }
}

struct PythonVisitor<'a> {
    unit: &'a SourceUnit<'a>,
    nodes: Vec<Node>,
    imports: Vec<String>,
}

/// Facts gathered from one function body.
#[derive(Default)]
struct BodyFacts {
    /// Callee names with the 1-based line of each call site, in source order.
    call_sites: Vec<(String, u32)>,
    identifiers: BTreeSet<String>,
}

fn line_of(node: TsNode<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

fn end_line_of(node: TsNode<'_>) -> u32 {
    node.end_position().row as u32 + 1
}

fn named_children(node: TsNode<'_>) -> Vec<TsNode<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

impl<'a> PythonVisitor<'a> {
    fn new(unit: &'a SourceUnit<'a>) -> Self {
        Self {
            unit,
            nodes: Vec::new(),
            imports: Vec::new(),
        }
    }

    fn text(&self, node: TsNode<'_>) -> &'a str {
        node.utf8_text(self.unit.source.as_bytes()).unwrap_or("")
    }

    fn visit(&mut self, node: TsNode<'_>, scope: &Scope) {
        match node.kind() {
            "import_statement" => self.record_import(node),
            "import_from_statement" => self.record_import_from(node),
            "class_definition" => self.visit_class(node, scope),
            "function_definition" => self.visit_function(node, scope),
            _ => {
                for child in named_children(node) {
                    self.visit(child, scope);
                }
            }
        }
    }

    fn record_import(&mut self, node: TsNode<'_>) {
        let mut cursor = node.walk();
        let names: Vec<TsNode<'_>> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let module = match name.kind() {
                "aliased_import" => name.child_by_field_name("name").map(|n| self.text(n)),
                _ => Some(self.text(name)),
            };
            if let Some(module) = module.filter(|m| !m.is_empty()) {
                self.imports.push(module.to_string());
            }
        }
    }

    fn record_import_from(&mut self, node: TsNode<'_>) {
        let Some(module) = node.child_by_field_name("module_name") else {
            return;
        };
        // `from .models import x` records `models`; a bare `from . import x`
        // names no module.
        let name = self.text(module).trim_start_matches('.');
        if !name.is_empty() {
            self.imports.push(name.to_string());
        }
    }

    fn visit_class(&mut self, node: TsNode<'_>, scope: &Scope) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        let class_id = format!("{}.{}", scope.prefix(), name);

        let mut class = Node::new(
            class_id.clone(),
            NodeKind::Class,
            name,
            self.unit.path,
            self.unit.language,
            Fidelity::Structured,
            line_of(node),
            end_line_of(node),
        );
        if let Some(bases) = node.child_by_field_name("superclasses") {
            class.inherits = named_children(bases)
                .into_iter()
                .filter_map(|base| self.dotted_name(base))
                .collect();
        }
        self.nodes.push(class);

        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body, &Scope::Class(class_id));
        }
    }

    fn visit_function(&mut self, node: TsNode<'_>, scope: &Scope) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        let func_id = format!("{}.{}", scope.prefix(), name);
        let parent_class = match scope {
            Scope::Class(class_id) => Some(class_id.clone()),
            _ => None,
        };

        let parameters = node
            .child_by_field_name("parameters")
            .map(|params| self.parameter_names(params))
            .unwrap_or_default();

        let body = node.child_by_field_name("body");
        let mut facts = BodyFacts::default();
        if let Some(body) = body {
            self.collect_body(body, &mut facts);
        }

        let mut api_nodes: IndexMap<String, Node> = IndexMap::new();
        for (callee, line) in &facts.call_sites {
            if !is_api_call(callee) {
                continue;
            }
            let api_id = api_call_id(&func_id, callee, *line);
            api_nodes.entry(api_id.clone()).or_insert_with(|| {
                let mut api = Node::new(
                    api_id,
                    NodeKind::ApiCall,
                    callee.clone(),
                    self.unit.path,
                    self.unit.language,
                    Fidelity::Structured,
                    *line,
                    *line,
                );
                api.parent = Some(func_id.clone());
                api
            });
        }

        let mut function = Node::new(
            func_id.clone(),
            NodeKind::Function,
            name,
            self.unit.path,
            self.unit.language,
            Fidelity::Structured,
            line_of(node),
            end_line_of(node),
        );
        function.calls = facts.call_sites.into_iter().map(|(callee, _)| callee).collect();
        function.variables = facts
            .identifiers
            .into_iter()
            .filter(|ident| {
                !parameters.contains(ident) && !RECEIVER_NAMES.contains(&ident.as_str())
            })
            .collect();
        function.parameters = parameters;
        function.parent_class = parent_class;
        function.api_calls = api_nodes.keys().cloned().collect();

        self.nodes.push(function);
        self.nodes.extend(api_nodes.into_values());

        if let Some(body) = body {
            self.visit(body, &Scope::Function(func_id));
        }
    }

    /// `Name` or dotted `a.b.C`; anything else (calls, subscripts, keyword
    /// arguments such as `metaclass=`) yields nothing.
    fn dotted_name(&self, node: TsNode<'_>) -> Option<String> {
        match node.kind() {
            "identifier" => Some(self.text(node).to_string()),
            "attribute" => {
                let object = self.dotted_name(node.child_by_field_name("object")?)?;
                let attr = self.text(node.child_by_field_name("attribute")?);
                Some(format!("{object}.{attr}"))
            }
            _ => None,
        }
    }

    /// Callee name of a `call` node: `f`, `obj.method`, `a.b.method`, or the
    /// bare attribute when the receiver is not a plain name chain.
    fn call_name(&self, call: TsNode<'_>) -> Option<String> {
        let function = call.child_by_field_name("function")?;
        match function.kind() {
            "identifier" => Some(self.text(function).to_string()),
            "attribute" => {
                let attr = self.text(function.child_by_field_name("attribute")?);
                match function
                    .child_by_field_name("object")
                    .and_then(|object| self.dotted_name(object))
                {
                    Some(base) => Some(format!("{base}.{attr}")),
                    None => Some(attr.to_string()),
                }
            }
            _ => None,
        }
    }

    fn parameter_names(&self, params: TsNode<'_>) -> Vec<String> {
        let mut names = Vec::new();
        for param in named_children(params) {
            if let Some(name) = self.parameter_name(param) {
                if !name.is_empty() && !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    fn parameter_name(&self, param: TsNode<'_>) -> Option<String> {
        match param.kind() {
            "identifier" => Some(self.text(param).to_string()),
            "default_parameter" | "typed_default_parameter" => {
                let name = param.child_by_field_name("name")?;
                self.parameter_name(name)
            }
            "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                let inner = param.named_child(0)?;
                self.parameter_name(inner)
            }
            _ => None,
        }
    }

    /// Walk a function body collecting call sites and identifiers in
    /// expression position. Nested definitions are walked too, minus their
    /// names and parameter lists.
    fn collect_body(&self, node: TsNode<'_>, facts: &mut BodyFacts) {
        match node.kind() {
            "identifier" => {
                facts.identifiers.insert(self.text(node).to_string());
            }
            "call" => {
                if let Some(callee) = self.call_name(node) {
                    facts.call_sites.push((callee, line_of(node)));
                }
                for child in named_children(node) {
                    self.collect_body(child, facts);
                }
            }
            "attribute" => {
                if let Some(object) = node.child_by_field_name("object") {
                    self.collect_body(object, facts);
                }
            }
            "keyword_argument" => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.collect_body(value, facts);
                }
            }
            "function_definition" | "lambda" => {
                if let Some(body) = node.child_by_field_name("body") {
                    self.collect_body(body, facts);
                }
            }
            "class_definition" => {
                for field in ["superclasses", "body"] {
                    if let Some(child) = node.child_by_field_name(field) {
                        self.collect_body(child, facts);
                    }
                }
            }
            "import_statement"
            | "import_from_statement"
            | "future_import_statement"
            | "global_statement"
            | "nonlocal_statement"
            | "parameters"
            | "lambda_parameters" => {}
            _ => {
                for child in named_children(node) {
                    self.collect_body(child, facts);
                }
            }
        }
    }
}
