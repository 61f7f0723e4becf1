//! Unit extraction via tree-sitter
//!
//! [`UnitExtractor`] parses Python source and yields the testable units it
//! contains: top-level functions, classes, and class methods, in source
//! order. A syntax error aborts the whole file — no partial unit list is
//! ever returned, so downstream stages never work from corrupt analysis.

use crate::error::ExtractError;
use crate::hash::Fingerprint;
use crate::normalize::normalize_source;
use crate::unit::{Param, Signature, Unit, UnitId, UnitKind};
use tree_sitter::{Node, Parser};

/// Python builtins excluded from a unit's dependency set
const BUILTINS: &[&str] = &[
    "abs", "all", "any", "bool", "bytes", "callable", "chr", "dict", "dir",
    "divmod", "enumerate", "filter", "float", "format", "frozenset",
    "getattr", "hasattr", "hash", "hex", "id", "int", "isinstance",
    "issubclass", "iter", "len", "list", "map", "max", "min", "next",
    "object", "open", "ord", "pow", "print", "range", "repr", "reversed",
    "round", "set", "setattr", "sorted", "str", "sum", "super", "tuple",
    "type", "zip", "Exception", "ValueError", "TypeError", "KeyError",
    "IndexError", "RuntimeError", "StopIteration", "None", "True", "False",
];

/// Extracts testable units from Python source text
///
/// Side-effect-free; repeated calls on identical text return identical
/// units in identical order.
pub struct UnitExtractor {
    parser: Parser,
}

impl std::fmt::Debug for UnitExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitExtractor").finish_non_exhaustive()
    }
}

impl UnitExtractor {
    /// Create an extractor with the Python grammar loaded
    ///
    /// # Errors
    /// Returns error if the grammar version is incompatible with the
    /// linked tree-sitter runtime.
    pub fn new() -> Result<Self, ExtractError> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_python::LANGUAGE.into())?;
        Ok(Self { parser })
    }

    /// Extract all units from `source`, attributed to `path`
    ///
    /// # Errors
    /// Returns [`ExtractError::Parse`] if the source has syntax errors;
    /// no units are returned in that case.
    pub fn extract(&mut self, path: &str, source: &str) -> Result<Vec<Unit>, ExtractError> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| ExtractError::Parse {
                path: path.to_string(),
                message: "parser returned no tree".to_string(),
            })?;
        let root = tree.root_node();
        if root.has_error() {
            return Err(ExtractError::Parse {
                path: path.to_string(),
                message: "syntax error".to_string(),
            });
        }

        let mut units = Vec::new();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            let (node, def) = unwrap_decorated(child);
            match def.kind() {
                "function_definition" => {
                    if let Some(unit) =
                        build_function_unit(path, source, node, def, None)?
                    {
                        units.push(unit);
                    }
                }
                "class_definition" => {
                    extract_class(path, source, node, def, &mut units)?;
                }
                _ => {}
            }
        }
        tracing::debug!(path, count = units.len(), "extracted units");
        Ok(units)
    }
}

/// Decorated definitions wrap the real definition; the outer node keeps
/// the decorators in the unit's byte range.
fn unwrap_decorated(node: Node<'_>) -> (Node<'_>, Node<'_>) {
    if node.kind() == "decorated_definition" {
        if let Some(def) = node.child_by_field_name("definition") {
            return (node, def);
        }
    }
    (node, node)
}

fn extract_class(
    path: &str,
    source: &str,
    outer: Node<'_>,
    def: Node<'_>,
    units: &mut Vec<Unit>,
) -> Result<(), ExtractError> {
    let class_name = field_text(def, "name", source, path)?;
    let body = def.child_by_field_name("body");

    let class_source = node_text(outer, source, path)?;
    units.push(Unit {
        id: UnitId::new(path, class_name.clone()),
        kind: UnitKind::Class,
        signature: Signature::default(),
        docstring: body.and_then(|b| block_docstring(b, source)),
        byte_range: outer.start_byte()..outer.end_byte(),
        fingerprint: Fingerprint::compute(normalize_source(class_source).as_bytes()),
        dependencies: Vec::new(),
        source: class_source.to_string(),
    });

    if let Some(body) = body {
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            let (node, inner) = unwrap_decorated(child);
            if inner.kind() == "function_definition" {
                if let Some(unit) =
                    build_function_unit(path, source, node, inner, Some(&class_name))?
                {
                    units.push(unit);
                }
            }
        }
    }
    Ok(())
}

fn build_function_unit(
    path: &str,
    source: &str,
    outer: Node<'_>,
    def: Node<'_>,
    class_name: Option<&str>,
) -> Result<Option<Unit>, ExtractError> {
    let name = field_text(def, "name", source, path)?;
    let qualified = match class_name {
        Some(class) => format!("{class}.{name}"),
        None => name,
    };

    let signature = read_signature(def, source, path)?;
    let body = def.child_by_field_name("body");
    let docstring = body.and_then(|b| block_docstring(b, source));
    let dependencies = body
        .map(|b| collect_dependencies(b, source, &signature))
        .unwrap_or_default();

    let unit_source = node_text(outer, source, path)?;
    Ok(Some(Unit {
        id: UnitId::new(path, qualified),
        kind: if class_name.is_some() {
            UnitKind::Method
        } else {
            UnitKind::Function
        },
        signature,
        docstring,
        byte_range: outer.start_byte()..outer.end_byte(),
        fingerprint: Fingerprint::compute(normalize_source(unit_source).as_bytes()),
        dependencies,
        source: unit_source.to_string(),
    }))
}

fn read_signature(
    def: Node<'_>,
    source: &str,
    path: &str,
) -> Result<Signature, ExtractError> {
    let mut params = Vec::new();
    if let Some(parameters) = def.child_by_field_name("parameters") {
        let mut cursor = parameters.walk();
        for p in parameters.named_children(&mut cursor) {
            match p.kind() {
                "identifier" => {
                    let name = node_text(p, source, path)?;
                    if name != "self" && name != "cls" {
                        params.push(Param::new(name));
                    }
                }
                "typed_parameter" => {
                    let name = p
                        .named_child(0)
                        .map(|n| node_text(n, source, path))
                        .transpose()?
                        .unwrap_or_default();
                    let annotation = p
                        .child_by_field_name("type")
                        .map(|n| node_text(n, source, path))
                        .transpose()?;
                    if !name.is_empty() {
                        params.push(Param {
                            name: name.to_string(),
                            annotation: annotation.map(str::to_string),
                        });
                    }
                }
                "default_parameter" | "typed_default_parameter" => {
                    let name = p
                        .child_by_field_name("name")
                        .map(|n| node_text(n, source, path))
                        .transpose()?
                        .unwrap_or_default();
                    let annotation = p
                        .child_by_field_name("type")
                        .map(|n| node_text(n, source, path))
                        .transpose()?;
                    if !name.is_empty() && name != "self" && name != "cls" {
                        params.push(Param {
                            name: name.to_string(),
                            annotation: annotation.map(str::to_string),
                        });
                    }
                }
                "list_splat_pattern" | "dictionary_splat_pattern" => {
                    let text = node_text(p, source, path)?;
                    params.push(Param::new(text));
                }
                _ => {}
            }
        }
    }
    let returns = def
        .child_by_field_name("return_type")
        .map(|n| node_text(n, source, path))
        .transpose()?
        .map(str::to_string);
    Ok(Signature { params, returns })
}

/// Docstring = a string expression as the first statement of a block
fn block_docstring(block: Node<'_>, source: &str) -> Option<String> {
    let first = block.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let expr = first.named_child(0)?;
    if expr.kind() != "string" {
        return None;
    }
    let raw = expr.utf8_text(source.as_bytes()).ok()?;
    Some(strip_string_quotes(raw).to_string())
}

fn strip_string_quotes(raw: &str) -> &str {
    let raw = raw
        .trim_start_matches(|c| matches!(c, 'r' | 'b' | 'f' | 'u' | 'R' | 'B' | 'F' | 'U'));
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if raw.starts_with(quote) {
            return raw
                .strip_prefix(quote)
                .and_then(|s| s.strip_suffix(quote))
                .unwrap_or(raw)
                .trim();
        }
    }
    raw
}

/// Collect referenced names that are not builtins, parameters, or local
/// bindings, in first-reference order.
fn collect_dependencies(body: Node<'_>, source: &str, signature: &Signature) -> Vec<String> {
    let mut locals: Vec<String> = signature.params.iter().map(|p| p.name.clone()).collect();
    collect_bindings(body, source, &mut locals);

    let mut deps = Vec::new();
    collect_references(body, source, &locals, &mut deps);
    deps
}

fn collect_bindings(node: Node<'_>, source: &str, locals: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "assignment" | "augmented_assignment" => {
                if let Some(left) = child.child_by_field_name("left") {
                    bind_targets(left, source, locals);
                }
            }
            "for_statement" => {
                if let Some(left) = child.child_by_field_name("left") {
                    bind_targets(left, source, locals);
                }
            }
            "as_pattern_target" => bind_targets(child, source, locals),
            _ => {}
        }
        collect_bindings(child, source, locals);
    }
}

fn bind_targets(node: Node<'_>, source: &str, locals: &mut Vec<String>) {
    if node.kind() == "identifier" {
        if let Ok(name) = node.utf8_text(source.as_bytes()) {
            if !locals.iter().any(|l| l == name) {
                locals.push(name.to_string());
            }
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        bind_targets(child, source, locals);
    }
}

fn collect_references(
    node: Node<'_>,
    source: &str,
    locals: &[String],
    deps: &mut Vec<String>,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "identifier" {
            // Skip attribute names (`obj.attr`) and keyword argument names
            let skip = child
                .parent()
                .is_some_and(|p| match p.kind() {
                    "attribute" => p
                        .child_by_field_name("attribute")
                        .is_some_and(|a| a.id() == child.id()),
                    "keyword_argument" => p
                        .child_by_field_name("name")
                        .is_some_and(|a| a.id() == child.id()),
                    _ => false,
                });
            if !skip {
                if let Ok(name) = child.utf8_text(source.as_bytes()) {
                    let known = locals.iter().any(|l| l == name)
                        || BUILTINS.contains(&name)
                        || name == "self"
                        || name == "cls"
                        || deps.iter().any(|d| d == name);
                    if !known {
                        deps.push(name.to_string());
                    }
                }
            }
        }
        collect_references(child, source, locals, deps);
    }
}

fn node_text<'a>(node: Node<'_>, source: &'a str, path: &str) -> Result<&'a str, ExtractError> {
    node.utf8_text(source.as_bytes())
        .map_err(|_| ExtractError::InvalidUtf8 {
            path: path.to_string(),
        })
}

fn field_text(
    node: Node<'_>,
    field: &str,
    source: &str,
    path: &str,
) -> Result<String, ExtractError> {
    let child = node
        .child_by_field_name(field)
        .ok_or_else(|| ExtractError::Parse {
            path: path.to_string(),
            message: format!("missing {field} field on {}", node.kind()),
        })?;
    Ok(node_text(child, source, path)?.to_string())
}
