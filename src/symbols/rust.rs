//! Declaration and reference rules for Rust syntax trees.
//!
//! `impl Foo` blocks are containers: their functions become `Foo.method`
//! and link to `Foo` when it is declared in the same file. Visibility is any
//! `pub` modifier; trait items inherit the trait's.

use tree_sitter::Node;

use super::extractor::{
    field_text, is_declared_name, node_text, Declaration, Receiver, Reference, ScopeContext,
    SyntaxRules,
};
use super::{ImportBinding, SymbolKind};
use crate::parser::rust::{flatten_use, is_module_segment, segments};
use crate::parser::is_external_crate;

pub(crate) struct RustRules;

impl SyntaxRules for RustRules {
    fn declaration(&self, node: Node, source: &[u8], scope: &ScopeContext) -> Declaration {
        let kind = match node.kind() {
            "function_item" | "function_signature_item" => {
                let is_async = is_async_fn(node, source);
                match (scope.parent_is_class, is_async) {
                    (true, true) => SymbolKind::AsyncMethod,
                    (true, false) => SymbolKind::Method,
                    (false, true) => SymbolKind::AsyncFunction,
                    (false, false) => SymbolKind::Function,
                }
            }
            "struct_item" | "union_item" => SymbolKind::Struct,
            "enum_item" => SymbolKind::Enum,
            "trait_item" => SymbolKind::Trait,
            "type_item" => SymbolKind::TypeAlias,
            "const_item" | "static_item" => SymbolKind::Constant,
            "impl_item" => {
                return match impl_target(node, source) {
                    Some(name) => Declaration::Container {
                        name,
                        class_like: true,
                    },
                    None => Declaration::None,
                };
            }
            "mod_item" if node.child_by_field_name("body").is_some() => {
                return match field_text(node, "name", source) {
                    Some(name) => Declaration::Container {
                        name,
                        class_like: false,
                    },
                    None => Declaration::None,
                };
            }
            _ => return Declaration::None,
        };
        let Some(name) = field_text(node, "name", source) else {
            return Declaration::None;
        };
        let in_trait = node
            .parent()
            .and_then(|list| list.parent())
            .is_some_and(|p| p.kind() == "trait_item");
        let is_exported = is_public(node) || (in_trait && scope.parent_exported);
        Declaration::Symbol {
            name,
            kind,
            is_exported,
        }
    }

    fn references(&self, node: Node, source: &[u8], out: &mut Vec<Reference>) {
        match node.kind() {
            "call_expression" => {
                if let Some(function) = node.child_by_field_name("function") {
                    callee(function, source, out);
                }
            }
            "type_identifier" if !is_declared_name(node) && !in_impl_header(node) => {
                out.push(Reference::type_name(node_text(node, source)));
            }
            _ => {}
        }
    }

    fn import_bindings(&self, node: Node, source: &[u8], out: &mut Vec<ImportBinding>) {
        match node.kind() {
            "use_declaration" => {
                let Some(argument) = node.child_by_field_name("argument") else {
                    return;
                };
                let mut paths = Vec::new();
                flatten_use(argument, source, &[], &mut paths);
                for path in paths.into_iter().filter(|p| !p.glob) {
                    let mut segs: Vec<String> = path
                        .segments
                        .iter()
                        .map(|s| s.trim_start_matches("::").to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                    if segs.len() > 1 && segs.last().is_some_and(|s| s == "self") {
                        segs.pop();
                    }
                    let Some(first) = segs.first() else {
                        continue;
                    };
                    if is_external_crate(first) {
                        continue;
                    }
                    let Some(last) = segs.last().cloned() else {
                        continue;
                    };
                    let module: Vec<&str> = segs
                        .iter()
                        .map(String::as_str)
                        .take_while(|s| is_module_segment(s))
                        .collect();
                    if module.is_empty() {
                        continue;
                    }
                    out.push(ImportBinding {
                        local_name: path.alias.unwrap_or_else(|| last.clone()),
                        imported_name: Some(last),
                        module_specifier: module.join("::"),
                        is_type_only: false,
                    });
                }
            }
            "mod_item" if node.child_by_field_name("body").is_none() => {
                if let Some(name) = field_text(node, "name", source) {
                    out.push(ImportBinding {
                        local_name: name.clone(),
                        imported_name: None,
                        module_specifier: name,
                        is_type_only: false,
                    });
                }
            }
            _ => {}
        }
    }
}

fn callee(function: Node, source: &[u8], out: &mut Vec<Reference>) {
    match function.kind() {
        "identifier" => out.push(Reference::call(node_text(function, source), Receiver::None)),
        "scoped_identifier" => {
            let Some(name) = field_text(function, "name", source) else {
                return;
            };
            let path: Vec<String> = function
                .child_by_field_name("path")
                .map(|p| segments(p, source))
                .unwrap_or_default();
            let receiver = match path.first().map(String::as_str) {
                None => Receiver::None,
                Some("Self") if path.len() == 1 => Receiver::SelfRef,
                Some("crate" | "super" | "self") => Receiver::Module(path.join("::")),
                Some(_) => Receiver::Named(path.join("::")),
            };
            out.push(Reference::call(name, receiver));
        }
        "field_expression" => {
            let Some(field) = field_text(function, "field", source) else {
                return;
            };
            let receiver = match function.child_by_field_name("value") {
                Some(value) if value.kind() == "self" => Receiver::SelfRef,
                Some(value) if value.kind() == "identifier" => {
                    Receiver::Named(node_text(value, source))
                }
                _ => Receiver::Other,
            };
            out.push(Reference::call(field, receiver));
        }
        "generic_function" => {
            if let Some(inner) = function.child_by_field_name("function") {
                callee(inner, source, out);
            }
        }
        _ => {}
    }
}

/// Name of the implementing type, generics stripped.
fn impl_target(node: Node, source: &[u8]) -> Option<String> {
    let target = node.child_by_field_name("type")?;
    let base = match target.kind() {
        "generic_type" => target.child_by_field_name("type")?,
        _ => target,
    };
    let text = node_text(base, source);
    let name = text.rsplit("::").next().unwrap_or(&text).to_string();
    (!name.is_empty()).then_some(name)
}

/// `impl Trait for Type` names are not uses by the methods inside.
fn in_impl_header(node: Node) -> bool {
    let mut current = node;
    while let Some(parent) = current.parent() {
        match parent.kind() {
            "impl_item" => {
                return parent
                    .child_by_field_name("body")
                    .map_or(true, |body| body.id() != current.id());
            }
            "declaration_list" | "source_file" | "block" => return false,
            _ => current = parent,
        }
    }
    false
}

fn is_public(node: Node) -> bool {
    let mut cursor = node.walk();
    let public = node
        .children(&mut cursor)
        .any(|c| c.kind() == "visibility_modifier");
    public
}

fn is_async_fn(node: Node, source: &[u8]) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| {
        c.kind() == "function_modifiers" && node_text(c, source).split_whitespace().any(|m| m == "async")
    });
    found
}
