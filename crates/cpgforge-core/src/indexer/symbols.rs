//! Pattern-based symbol extraction for languages without a native parser.
//!
//! JavaScript/TypeScript, Java and Go are scanned with ordered regular
//! expressions over the raw source. Declarations become class/function
//! nodes, bodies are delimited by brace matching, calls inside a body are
//! picked up with a call-site pattern, and recognizable HTTP-client calls
//! become `api_call` nodes. Strings and comments are not understood, so
//! keyword-shaped text can produce false positives; that is the price of
//! covering these languages without a parser.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::CpgResult;
use crate::indexer::extractors::{Extraction, Extractor, SourceUnit};
use crate::models::{api_call_id, Fidelity, Node, NodeKind};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// 1-based line of a byte offset: newlines before it, plus one.
pub fn line_at(source: &str, offset: usize) -> u32 {
    let end = offset.min(source.len());
    source.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() as u32 + 1
}

/// Locate the brace-delimited body of a declaration.
///
/// Scans from `from` for the opening `{`. With `immediate`, only whitespace
/// may precede it; otherwise a `;` seen first means the declaration has no
/// body. Returns the byte offsets of the opening brace and its matching
/// closing brace. An unbalanced body closes at `source.len()`, so both
/// offsets are always char boundaries and `source[open + 1..close]` is valid.
pub fn find_body(source: &str, from: usize, immediate: bool) -> Option<(usize, usize)> {
    let bytes = source.as_bytes();
    let mut open = None;
    for (offset, &b) in bytes.iter().enumerate().skip(from) {
        match b {
            b'{' => {
                open = Some(offset);
                break;
            }
            b';' => return None,
            _ if immediate && !b.is_ascii_whitespace() => return None,
            _ => {}
        }
    }
    let open = open?;

    let mut depth = 0i32;
    for (offset, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((open, offset));
                }
            }
            _ => {}
        }
    }
    Some((open, bytes.len()))
}

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());

/// Parse a raw comma-separated parameter list into parameter names.
///
/// The `language` argument controls which token is the name:
/// - `"typescript"`/`"javascript"`: text before any `:` or `=`
/// - `"go"`: first token
/// - everything else (e.g. `"java"`): last token
///
/// Chunks that do not reduce to a plain identifier (destructuring patterns,
/// bare types) are dropped.
pub fn parameter_names(params_raw: &str, language: &str) -> Vec<String> {
    let mut names = Vec::new();
    for chunk in params_raw.split(',') {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        let name = match language {
            "typescript" | "javascript" => chunk
                .split([':', '='])
                .next()
                .unwrap_or("")
                .trim()
                .trim_start_matches("...")
                .trim_end_matches('?')
                .to_string(),
            "go" => chunk
                .split_whitespace()
                .next()
                .unwrap_or("")
                .replace("...", ""),
            _ => chunk
                .split_whitespace()
                .filter(|t| !t.starts_with('@'))
                .last()
                .unwrap_or("")
                .replace("...", ""),
        };
        if IDENTIFIER_RE.is_match(&name) && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Names that look like calls or declarations but are control flow.
fn is_keyword(name: &str) -> bool {
    matches!(
        name,
        "if" | "else"
            | "for"
            | "while"
            | "do"
            | "switch"
            | "case"
            | "return"
            | "new"
            | "function"
            | "func"
            | "class"
            | "catch"
            | "try"
            | "finally"
            | "throw"
            | "synchronized"
            | "typeof"
            | "instanceof"
            | "await"
            | "yield"
            | "go"
            | "defer"
            | "select"
            | "range"
    )
}

static CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:([A-Za-z_][A-Za-z0-9_]*)\s*\.\s*)?([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap()
});

/// Call names inside a body: `name` or `receiver.name`. Keywords and
/// definition sites (`function f(`, `func f(`, `def f(`, `class C(`) are
/// skipped.
pub fn scan_calls(body: &str) -> BTreeSet<String> {
    let mut calls = BTreeSet::new();
    for caps in CALL_RE.captures_iter(body) {
        let Some(name) = caps.get(2) else {
            continue;
        };
        if is_keyword(name.as_str()) {
            continue;
        }
        let whole = caps.get(0).map(|m| m.start()).unwrap_or(0);
        let prefix = body[..whole].trim_end();
        if prefix.ends_with("function")
            || prefix.ends_with("func")
            || prefix.ends_with("def")
            || prefix.ends_with("class")
        {
            continue;
        }
        match caps.get(1) {
            Some(receiver) => calls.insert(format!("{}.{}", receiver.as_str(), name.as_str())),
            None => calls.insert(name.as_str().to_string()),
        };
    }
    calls
}

/// Split an `extends`/`implements` clause into base names, dropping generic
/// arguments.
fn base_names(clause: &str) -> Vec<String> {
    let mut depth = 0i32;
    let mut cleaned = String::with_capacity(clause.len());
    for c in clause.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            _ if depth == 0 => cleaned.push(c),
            _ => {}
        }
    }
    cleaned
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Declarations and node assembly shared by the pattern extractors
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Decl {
    kind: NodeKind,
    name: String,
    start: usize,
    body: Option<(usize, usize)>,
    inherits: Vec<String>,
    parameters: Vec<String>,
    /// Declared inside a class body; scoped to the innermost enclosing class.
    member: bool,
    /// Go receiver type of a method.
    receiver: Option<String>,
}

impl Decl {
    fn class(name: &str, start: usize, body: Option<(usize, usize)>, inherits: Vec<String>) -> Self {
        Self {
            kind: NodeKind::Class,
            name: name.to_string(),
            start,
            body,
            inherits,
            parameters: Vec::new(),
            member: false,
            receiver: None,
        }
    }

    fn function(name: &str, start: usize, body: Option<(usize, usize)>, parameters: Vec<String>) -> Self {
        Self {
            kind: NodeKind::Function,
            name: name.to_string(),
            start,
            body,
            inherits: Vec::new(),
            parameters,
            member: false,
            receiver: None,
        }
    }

    fn contains(&self, offset: usize) -> bool {
        matches!(self.body, Some((open, close)) if open < offset && offset <= close)
    }

    fn span_len(&self) -> usize {
        self.body.map(|(open, close)| close - open).unwrap_or(usize::MAX)
    }
}

/// An HTTP-client call site found by a pattern.
struct ApiSite {
    callee: String,
    offset: usize,
}

/// Turn declarations and API call sites into nodes.
///
/// Declarations are ordered by position. Members are qualified by the
/// innermost class whose body contains them, Go methods by their receiver
/// type, everything else by the module. Call sites are attributed to the
/// innermost function body containing them, or to the module.
fn assemble(unit: &SourceUnit<'_>, mut decls: Vec<Decl>, api_sites: Vec<ApiSite>) -> Vec<Node> {
    let module = unit.module_name();
    decls.sort_by_key(|d| d.start);
    decls.dedup_by(|a, b| a.start == b.start && a.name == b.name);

    let innermost = |offset: usize, kind: NodeKind| -> Option<usize> {
        decls
            .iter()
            .enumerate()
            .filter(|(_, d)| d.kind == kind && d.contains(offset))
            .min_by_key(|(_, d)| d.span_len())
            .map(|(i, _)| i)
    };

    let class_ids: Vec<Option<String>> = decls
        .iter()
        .map(|d| (d.kind == NodeKind::Class).then(|| format!("{module}.{}", d.name)))
        .collect();

    let mut nodes: Vec<Node> = Vec::with_capacity(decls.len() + api_sites.len());
    for (index, decl) in decls.iter().enumerate() {
        let (id, parent_class) = match (&decl.kind, &decl.receiver) {
            (NodeKind::Class, _) => (class_ids[index].clone().unwrap_or_default(), None),
            (_, Some(receiver)) => {
                let class_id = format!("{module}.{receiver}");
                let declared = decls
                    .iter()
                    .any(|d| d.kind == NodeKind::Class && &d.name == receiver);
                (
                    format!("{class_id}.{}", decl.name),
                    declared.then_some(class_id),
                )
            }
            _ => match innermost(decl.start, NodeKind::Class).filter(|_| decl.member) {
                Some(class_index) => {
                    let class_id = class_ids[class_index].clone().unwrap_or_default();
                    (format!("{class_id}.{}", decl.name), Some(class_id))
                }
                None => (format!("{module}.{}", decl.name), None),
            },
        };

        let line_start = line_at(unit.source, decl.start);
        let line_end = decl
            .body
            .map(|(_, close)| line_at(unit.source, close))
            .unwrap_or(line_start);
        let mut node = Node::new(
            id,
            decl.kind,
            decl.name.clone(),
            unit.path,
            unit.language,
            Fidelity::Pattern,
            line_start,
            line_end,
        );
        node.inherits = decl.inherits.clone();
        node.parameters = decl.parameters.clone();
        node.parent_class = parent_class;
        if decl.kind == NodeKind::Function {
            if let Some((open, close)) = decl.body {
                node.calls = scan_calls(&unit.source[open + 1..close.max(open + 1)]);
            }
        }
        nodes.push(node);
    }

    let mut api_nodes: Vec<Node> = Vec::new();
    for site in api_sites {
        let line = line_at(unit.source, site.offset);
        let enclosing = innermost(site.offset, NodeKind::Function);
        let enclosing_id = enclosing
            .map(|i| nodes[i].id.clone())
            .unwrap_or_else(|| module.clone());
        let id = api_call_id(&enclosing_id, &site.callee, line);
        if api_nodes.iter().any(|n| n.id == id) {
            continue;
        }
        let mut api = Node::new(
            id.clone(),
            NodeKind::ApiCall,
            site.callee,
            unit.path,
            unit.language,
            Fidelity::Pattern,
            line,
            line,
        );
        if let Some(i) = enclosing {
            api.parent = Some(nodes[i].id.clone());
            nodes[i].api_calls.push(id);
        }
        api_nodes.push(api);
    }

    nodes.extend(api_nodes);
    nodes
}

// ---------------------------------------------------------------------------
// JavaScript / TypeScript
// ---------------------------------------------------------------------------

static JS_IMPORT_FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"import\s+[^;'"]*?\s+from\s+['"]([^'"]+)['"]"#).unwrap());

static JS_IMPORT_BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"import\s+['"]([^'"]+)['"]"#).unwrap());

static JS_REQUIRE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"require\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

static JS_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bclass\s+([A-Za-z_$][\w$]*)(?:\s*<[^{]*?>)?(?:\s+extends\s+([\w$.]+)(?:\s*<[^{]*?>)?)?(?:\s+implements\s+([\w$.,\s<>]+?))?\s*\{",
    )
    .unwrap()
});

static JS_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bfunction\s*\*?\s*([A-Za-z_$][\w$]*)\s*(?:<[^>(]*>)?\s*\(([^)]*)\)").unwrap()
});

static JS_ARROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::\s*[^=]+)?=\s*(?:async\s+)?(?:\(([^)]*)\)|([A-Za-z_$][\w$]*))\s*(?::\s*[^=]+?)?\s*=>",
    )
    .unwrap()
});

static JS_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?:(?:public|private|protected|static|readonly|async|override|abstract)\s+)*\*?([A-Za-z_$][\w$]*)\s*(?:<[^>(]*>)?\s*\(([^)]*)\)\s*(?::\s*[^{;]+)?\{",
    )
    .unwrap()
});

static JS_AXIOS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\baxios\s*\.\s*(get|post|put|delete|patch)\s*\(").unwrap());

static JS_FETCH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bfetch\s*\(").unwrap());

/// JavaScript and TypeScript (`.js`, `.jsx`, `.ts`, `.tsx`).
#[derive(Clone, Copy, Debug, Default)]
pub struct ScriptExtractor;

impl Extractor for ScriptExtractor {
    fn languages(&self) -> &'static [&'static str] {
        &["javascript", "typescript"]
    }

    fn fidelity(&self) -> Fidelity {
        Fidelity::Pattern
    }

    fn extract(&self, unit: &SourceUnit<'_>) -> CpgResult<Extraction> {
        let source = unit.source;
        let mut imports = Vec::new();
        for pattern in [&*JS_IMPORT_FROM_RE, &*JS_IMPORT_BARE_RE, &*JS_REQUIRE_RE] {
            imports.extend(pattern.captures_iter(source).map(|c| c[1].to_string()));
        }

        let mut decls = Vec::new();
        for caps in JS_CLASS_RE.captures_iter(source) {
            let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or_default();
            let mut inherits = Vec::new();
            if let Some(base) = caps.get(2) {
                inherits.push(base.as_str().to_string());
            }
            if let Some(clause) = caps.get(3) {
                inherits.extend(base_names(clause.as_str()));
            }
            decls.push(Decl::class(
                &caps[1],
                whole.0,
                find_body(source, whole.1 - 1, true),
                inherits,
            ));
        }
        for caps in JS_FUNCTION_RE.captures_iter(source) {
            let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or_default();
            decls.push(Decl::function(
                &caps[1],
                whole.0,
                find_body(source, whole.1, false),
                parameter_names(&caps[2], unit.language),
            ));
        }
        for caps in JS_ARROW_RE.captures_iter(source) {
            let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or_default();
            let params = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| parameter_names(m.as_str(), unit.language))
                .unwrap_or_default();
            decls.push(Decl::function(
                &caps[1],
                whole.0,
                find_body(source, whole.1, true),
                params,
            ));
        }

        let class_bodies: Vec<(usize, usize)> = decls
            .iter()
            .filter(|d| d.kind == NodeKind::Class)
            .filter_map(|d| d.body)
            .collect();
        for caps in JS_METHOD_RE.captures_iter(source) {
            let name = &caps[1];
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let in_class = class_bodies
                .iter()
                .any(|&(open, close)| open < whole.start() && whole.start() < close);
            if !in_class || is_keyword(name) {
                continue;
            }
            let mut decl = Decl::function(
                name,
                whole.start() + (whole.as_str().len() - whole.as_str().trim_start().len()),
                find_body(source, whole.end() - 1, true),
                parameter_names(&caps[2], unit.language),
            );
            decl.member = true;
            decls.push(decl);
        }

        let mut api_sites = Vec::new();
        for caps in JS_AXIOS_RE.captures_iter(source) {
            let offset = caps.get(0).map(|m| m.start()).unwrap_or(0);
            api_sites.push(ApiSite {
                callee: format!("axios.{}", &caps[1]),
                offset,
            });
        }
        for m in JS_FETCH_RE.find_iter(source) {
            api_sites.push(ApiSite {
                callee: "fetch".to_string(),
                offset: m.start(),
            });
        }
        api_sites.sort_by_key(|s| s.offset);

        Ok(Extraction {
            nodes: assemble(unit, decls, api_sites),
            imports,
        })
    }
}

// ---------------------------------------------------------------------------
// Java
// ---------------------------------------------------------------------------

static JAVA_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*import\s+(?:static\s+)?([A-Za-z0-9_.]+(?:\.\*)?)\s*;").unwrap()
});

static JAVA_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?:(?:public|private|protected|abstract|final|static|sealed)\s+)*(?:class|interface|enum)\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s*<[^{]*?>)?(?:\s+extends\s+([\w.<>,\s]+?))?(?:\s+implements\s+([\w.<>,\s]+?))?\s*\{",
    )
    .unwrap()
});

static JAVA_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?:(?:public|private|protected|static|final|abstract|synchronized|native|default)\s+)*(?:<[^>]+>\s+)?([A-Za-z0-9_<>\[\],.?]+)\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(([^)]*)\)\s*(?:throws\s+[\w.,\s]+)?\{",
    )
    .unwrap()
});

static JAVA_API_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b([A-Za-z_]\w*(?:Client|client|Template|template))\s*\.\s*((?:get|post|put|delete|patch|exchange|send|execute)\w*)\s*\(",
    )
    .unwrap()
});

#[derive(Clone, Copy, Debug, Default)]
pub struct JavaExtractor;

impl Extractor for JavaExtractor {
    fn languages(&self) -> &'static [&'static str] {
        &["java"]
    }

    fn fidelity(&self) -> Fidelity {
        Fidelity::Pattern
    }

    fn extract(&self, unit: &SourceUnit<'_>) -> CpgResult<Extraction> {
        let source = unit.source;
        let imports: Vec<String> = JAVA_IMPORT_RE
            .captures_iter(source)
            .map(|c| c[1].to_string())
            .collect();

        let mut decls = Vec::new();
        for caps in JAVA_CLASS_RE.captures_iter(source) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let mut inherits = Vec::new();
            for clause in [caps.get(2), caps.get(3)].into_iter().flatten() {
                inherits.extend(base_names(clause.as_str()));
            }
            let start = whole.start() + (whole.as_str().len() - whole.as_str().trim_start().len());
            decls.push(Decl::class(
                &caps[1],
                start,
                find_body(source, whole.end() - 1, true),
                inherits,
            ));
        }
        for caps in JAVA_METHOD_RE.captures_iter(source) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let return_type = &caps[1];
            let name = &caps[2];
            if is_keyword(name) || is_keyword(return_type) {
                continue;
            }
            let start = whole.start() + (whole.as_str().len() - whole.as_str().trim_start().len());
            let mut decl = Decl::function(
                name,
                start,
                find_body(source, whole.end() - 1, true),
                parameter_names(&caps[3], "java"),
            );
            decl.member = true;
            decls.push(decl);
        }

        let api_sites = JAVA_API_RE
            .captures_iter(source)
            .filter_map(|caps| {
                let offset = caps.get(0)?.start();
                Some(ApiSite {
                    callee: format!("{}.{}", &caps[1], &caps[2]),
                    offset,
                })
            })
            .collect();

        Ok(Extraction {
            nodes: assemble(unit, decls, api_sites),
            imports,
        })
    }
}

// ---------------------------------------------------------------------------
// Go
// ---------------------------------------------------------------------------

static GO_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*import\s+(?:\(([^)]*)\)|(?:[A-Za-z_.][\w.]*\s+)?"([^"]+)")"#).unwrap()
});

static GO_QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([^"]+)""#).unwrap());

static GO_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*type\s+([A-Za-z_][A-Za-z0-9_]*)(?:\[[^\]]*\])?\s+(struct|interface)\b")
        .unwrap()
});

static GO_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*func\s+([A-Za-z_][A-Za-z0-9_]*)\s*(?:\[[^\]]*\])?\s*\(([^)]*)\)").unwrap()
});

static GO_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*func\s*\(([^)]*)\)\s*([A-Za-z_][A-Za-z0-9_]*)\s*\(([^)]*)\)").unwrap()
});

static GO_API_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(http|[A-Za-z_]\w*[Cc]lient)\s*\.\s*(Get|Post|Head|PostForm|Do|NewRequest(?:WithContext)?)\s*\(",
    )
    .unwrap()
});

#[derive(Clone, Copy, Debug, Default)]
pub struct GoExtractor;

impl Extractor for GoExtractor {
    fn languages(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn fidelity(&self) -> Fidelity {
        Fidelity::Pattern
    }

    fn extract(&self, unit: &SourceUnit<'_>) -> CpgResult<Extraction> {
        let source = unit.source;
        let mut imports = Vec::new();
        for caps in GO_IMPORT_RE.captures_iter(source) {
            if let Some(block) = caps.get(1) {
                imports.extend(
                    GO_QUOTED_RE
                        .captures_iter(block.as_str())
                        .map(|c| c[1].to_string()),
                );
            } else if let Some(single) = caps.get(2) {
                imports.push(single.as_str().to_string());
            }
        }

        let mut decls = Vec::new();
        for caps in GO_TYPE_RE.captures_iter(source) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let start = whole.start() + (whole.as_str().len() - whole.as_str().trim_start().len());
            decls.push(Decl::class(
                &caps[1],
                start,
                find_body(source, whole.end(), true),
                Vec::new(),
            ));
        }
        for caps in GO_FUNCTION_RE.captures_iter(source) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let start = whole.start() + (whole.as_str().len() - whole.as_str().trim_start().len());
            decls.push(Decl::function(
                &caps[1],
                start,
                find_body(source, whole.end(), false),
                parameter_names(&caps[2], "go"),
            ));
        }
        for caps in GO_METHOD_RE.captures_iter(source) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let receiver = caps[1]
                .split_whitespace()
                .last()
                .map(|t| t.trim_start_matches('*').to_string())
                .filter(|t| !t.is_empty());
            let start = whole.start() + (whole.as_str().len() - whole.as_str().trim_start().len());
            let mut decl = Decl::function(
                &caps[2],
                start,
                find_body(source, whole.end(), false),
                parameter_names(&caps[3], "go"),
            );
            decl.receiver = receiver;
            decls.push(decl);
        }

        let api_sites = GO_API_RE
            .captures_iter(source)
            .filter_map(|caps| {
                let offset = caps.get(0)?.start();
                Some(ApiSite {
                    callee: format!("{}.{}", &caps[1], &caps[2]),
                    offset,
                })
            })
            .collect();

        Ok(Extraction {
            nodes: assemble(unit, decls, api_sites),
            imports,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn unit<'a>(path: &'a str, language: &'a str, source: &'a str) -> SourceUnit<'a> {
        SourceUnit {
            path,
            language,
            source,
        }
    }

    fn node<'a>(extraction: &'a Extraction, id: &str) -> &'a Node {
        extraction
            .nodes
            .iter()
            .find(|n| n.id == id)
            .unwrap_or_else(|| panic!("missing node {id}"))
    }

    // -- Helper tests -------------------------------------------------------

    #[test]
    fn test_line_at() {
        let src = "a\nb\nc";
        assert_eq!(line_at(src, 0), 1);
        assert_eq!(line_at(src, 2), 2);
        assert_eq!(line_at(src, 4), 3);
        assert_eq!(line_at(src, 100), 3);
    }

    #[test]
    fn test_find_body_matches_braces() {
        let src = "f() { if (x) { y(); } }\nrest";
        let (open, close) = find_body(src, 3, false).unwrap();
        assert_eq!(open, 4);
        assert_eq!(&src[close..=close], "}");
        assert_eq!(close, 22);
    }

    #[test]
    fn test_find_body_unbalanced_ends_at_source_len() {
        let src = "function f() {\n  g(\"café";
        let (open, close) = find_body(src, 0, false).unwrap();
        assert_eq!(open, 13);
        assert_eq!(close, src.len());
        assert!(src.is_char_boundary(close));
        assert_eq!(&src[open + 1..close], "\n  g(\"café");
    }

    #[test]
    fn test_unclosed_multibyte_body_in_every_pattern_extractor() {
        let cases: [(&dyn Extractor, &str, &str, &str); 4] = [
            (&ScriptExtractor, "broken.js", "javascript", "function f() {\n  g(\"café"),
            (&ScriptExtractor, "broken.ts", "typescript", "function f(a: string) {\n  g(\"naïve"),
            (
                &JavaExtractor,
                "Broken.java",
                "java",
                "public class Broken {\n    public void f() {\n        g(\"über",
            ),
            (&GoExtractor, "broken.go", "go", "package broken\n\nfunc f() {\n    g(\"日本"),
        ];
        for (extractor, path, language, src) in cases {
            let extraction = extractor.extract(&unit(path, language, src)).unwrap();
            let f = extraction
                .nodes
                .iter()
                .find(|n| n.name == "f")
                .unwrap_or_else(|| panic!("no function f in {path}"));
            assert!(f.calls.contains("g"), "{path}: {:?}", f.calls);
            assert_eq!(f.line_end, src.lines().count() as u32, "{path}");
        }
    }

    #[test]
    fn test_find_body_semicolon_means_no_body() {
        assert_eq!(find_body("f(a: string): void;\n{ }", 0, false), None);
        assert_eq!(find_body("=> a + 1\nfunction g() {}", 2, true), None);
    }

    #[test]
    fn test_parameter_names_by_language() {
        assert_eq!(
            parameter_names("name: string, age?: number, ...rest", "typescript"),
            vec!["name", "age", "rest"]
        );
        assert_eq!(parameter_names("a = 1, b", "javascript"), vec!["a", "b"]);
        assert_eq!(
            parameter_names("ctx context.Context, name string", "go"),
            vec!["ctx", "name"]
        );
        assert_eq!(
            parameter_names("final int count, @Valid String... names", "java"),
            vec!["count", "names"]
        );
        assert!(parameter_names("", "java").is_empty());
        assert!(parameter_names("{ a, b }", "javascript").is_empty());
    }

    #[test]
    fn test_scan_calls_skips_keywords_and_definitions() {
        let calls = scan_calls("if (x) { helper(a); this.save(b); function inner() {} return fmt.Println(c) }");
        let calls: Vec<&str> = calls.iter().map(String::as_str).collect();
        assert_eq!(calls, vec!["fmt.Println", "helper", "this.save"]);
    }

    #[test]
    fn test_base_names_drop_generics() {
        assert_eq!(
            base_names("Repository<User, Long>, Serializable"),
            vec!["Repository", "Serializable"]
        );
    }

    // -- JavaScript / TypeScript --------------------------------------------

    #[test]
    fn test_script_imports() {
        let src = "\
import React from 'react';
import { api } from \"./api\";
import './styles.css';
const fs = require('fs');
";
        let extraction = ScriptExtractor.extract(&unit("src/App.jsx", "javascript", src)).unwrap();
        assert_eq!(extraction.imports, vec!["react", "./api", "./styles.css", "fs"]);
    }

    #[test]
    fn test_script_functions_classes_and_methods() {
        let src = "\
export async function loadUser(id) {
  const user = await fetchUser(id);
  return normalize(user);
}

export const add = (a, b) => a + b;

const handler = async (event) => {
  return process(event);
};

class UserService extends BaseService {
  constructor(client) {
    super(client);
  }

  async getUser(id) {
    return this.client.find(id);
  }
}
";
        let extraction = ScriptExtractor.extract(&unit("src/users.js", "javascript", src)).unwrap();

        let load = node(&extraction, "users.loadUser");
        assert_eq!(load.kind, NodeKind::Function);
        assert_eq!(load.fidelity, Fidelity::Pattern);
        assert_eq!(load.line_start, 1);
        assert_eq!(load.line_end, 4);
        assert_eq!(load.parameters, vec!["id"]);
        assert!(load.calls.contains("fetchUser"));
        assert!(load.calls.contains("normalize"));

        let add = node(&extraction, "users.add");
        assert_eq!(add.loc, 1);
        assert_eq!(add.parameters, vec!["a", "b"]);

        let handler = node(&extraction, "users.handler");
        assert_eq!(handler.line_start, 8);
        assert_eq!(handler.line_end, 10);
        assert!(handler.calls.contains("process"));

        let class = node(&extraction, "users.UserService");
        assert_eq!(class.kind, NodeKind::Class);
        assert_eq!(class.inherits, vec!["BaseService"]);
        assert_eq!(class.line_start, 12);
        assert_eq!(class.line_end, 20);

        let method = node(&extraction, "users.UserService.getUser");
        assert_eq!(method.parent_class.as_deref(), Some("users.UserService"));
        assert!(method.calls.contains("client.find"));

        let ctor = node(&extraction, "users.UserService.constructor");
        assert!(ctor.calls.contains("super"));
    }

    #[test]
    fn test_script_api_calls_attributed_to_enclosing_function() {
        let src = "\
import axios from 'axios';

export async function saveOrder(order) {
  const res = await axios.post('/api/orders', order);
  return res.data;
}

fetch('/health');
";
        let extraction = ScriptExtractor.extract(&unit("src/orders.ts", "typescript", src)).unwrap();
        let save = node(&extraction, "orders.saveOrder");
        assert_eq!(save.api_calls, vec!["api_orders.saveOrder_axios.post_4"]);

        let api = node(&extraction, "api_orders.saveOrder_axios.post_4");
        assert_eq!(api.kind, NodeKind::ApiCall);
        assert_eq!(api.name, "axios.post");
        assert_eq!(api.parent.as_deref(), Some("orders.saveOrder"));
        assert_eq!(api.language, "typescript");

        let top_level = node(&extraction, "api_orders_fetch_8");
        assert_eq!(top_level.parent, None);
    }

    // -- Java ---------------------------------------------------------------

    #[test]
    fn test_java_classes_methods_and_imports() {
        let src = "\
package com.example.app;

import java.util.List;
import static java.util.Objects.requireNonNull;

public class OrderService extends BaseService implements Auditable, Serializable {
    private final OrderRepository repo;

    public OrderService(OrderRepository repo) {
        this.repo = requireNonNull(repo);
    }

    public List<Order> findAll(int limit) throws IOException {
        if (limit > 0) {
            return repo.findAll(limit);
        }
        return List.of();
    }
}
";
        let extraction = JavaExtractor.extract(&unit("src/OrderService.java", "java", src)).unwrap();
        assert_eq!(
            extraction.imports,
            vec!["java.util.List", "java.util.Objects.requireNonNull"]
        );

        let class = node(&extraction, "OrderService.OrderService");
        assert_eq!(class.kind, NodeKind::Class);
        assert_eq!(
            class.inherits,
            vec!["BaseService", "Auditable", "Serializable"]
        );
        assert_eq!(class.line_start, 6);
        assert_eq!(class.line_end, 19);

        let ctor = node(&extraction, "OrderService.OrderService.OrderService");
        assert_eq!(ctor.kind, NodeKind::Function);
        assert_eq!(ctor.parameters, vec!["repo"]);

        let find_all = node(&extraction, "OrderService.OrderService.findAll");
        assert_eq!(find_all.parent_class.as_deref(), Some("OrderService.OrderService"));
        assert_eq!(find_all.line_start, 13);
        assert_eq!(find_all.line_end, 18);
        assert!(find_all.calls.contains("repo.findAll"));
        assert!(find_all.calls.contains("List.of"));
        assert!(!find_all.calls.iter().any(|c| c == "if"));

        let functions = extraction
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Function)
            .count();
        assert_eq!(functions, 2);
    }

    #[test]
    fn test_java_api_calls() {
        let src = "\
public class Gateway {
    public String ping() {
        return restTemplate.getForObject(URL, String.class);
    }
}
";
        let extraction = JavaExtractor.extract(&unit("Gateway.java", "java", src)).unwrap();
        let api = node(&extraction, "api_Gateway.Gateway.ping_restTemplate.getForObject_3");
        assert_eq!(api.parent.as_deref(), Some("Gateway.Gateway.ping"));
    }

    // -- Go -----------------------------------------------------------------

    #[test]
    fn test_go_imports() {
        let src = "\
package main

import \"fmt\"
import log \"github.com/sirupsen/logrus\"

import (
    \"os\"
    str \"strings\"
)
";
        let extraction = GoExtractor.extract(&unit("main.go", "go", src)).unwrap();
        assert_eq!(
            extraction.imports,
            vec!["fmt", "github.com/sirupsen/logrus", "os", "strings"]
        );
    }

    #[test]
    fn test_go_types_functions_and_methods() {
        let src = "\
package server

type Server struct {
    addr string
}

func NewServer(addr string) *Server {
    return &Server{addr: addr}
}

func (s *Server) Start(ctx context.Context) error {
    resp, err := http.Get(s.addr)
    if err != nil {
        return err
    }
    return handle(resp)
}
";
        let extraction = GoExtractor.extract(&unit("pkg/server.go", "go", src)).unwrap();

        let server = node(&extraction, "server.Server");
        assert_eq!(server.kind, NodeKind::Class);
        assert_eq!(server.line_end, 5);

        let new_server = node(&extraction, "server.NewServer");
        assert_eq!(new_server.parameters, vec!["addr"]);
        assert_eq!(new_server.line_start, 7);
        assert_eq!(new_server.line_end, 9);

        let start = node(&extraction, "server.Server.Start");
        assert_eq!(start.parent_class.as_deref(), Some("server.Server"));
        assert_eq!(start.parameters, vec!["ctx"]);
        assert!(start.calls.contains("handle"));
        assert!(start.calls.contains("http.Get"));
        assert_eq!(start.api_calls, vec!["api_server.Server.Start_http.Get_12"]);

        let api = node(&extraction, "api_server.Server.Start_http.Get_12");
        assert_eq!(api.parent.as_deref(), Some("server.Server.Start"));
    }

    #[test]
    fn test_go_method_on_undeclared_receiver() {
        let src = "\
package util

func (c Cache) Get(key string) string {
    return c.items[key]
}
";
        let extraction = GoExtractor.extract(&unit("util.go", "go", src)).unwrap();
        let get = node(&extraction, "util.Cache.Get");
        assert_eq!(get.parent_class, None);
    }
}
