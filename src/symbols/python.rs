//! Declaration and reference rules for Python syntax trees.
//!
//! Visibility follows the naming convention: a leading underscore hides a
//! name unless it is a dunder.

use tree_sitter::Node;

use super::extractor::{
    field_text, has_token, node_text, unquote, Declaration, Receiver, Reference, ScopeContext,
    SyntaxRules,
};
use super::{ImportBinding, SymbolKind};
use crate::parser::{walk_tree, Step};

pub(crate) struct PythonRules;

impl SyntaxRules for PythonRules {
    fn declaration(&self, node: Node, source: &[u8], scope: &ScopeContext) -> Declaration {
        match node.kind() {
            "function_definition" => {
                let Some(name) = field_text(node, "name", source) else {
                    return Declaration::None;
                };
                let is_async = has_token(node, "async");
                let kind = match (scope.parent_is_class, is_async) {
                    (true, true) => SymbolKind::AsyncMethod,
                    (true, false) => SymbolKind::Method,
                    (false, true) => SymbolKind::AsyncFunction,
                    (false, false) => SymbolKind::Function,
                };
                let is_exported = is_public(&name);
                Declaration::Symbol {
                    name,
                    kind,
                    is_exported,
                }
            }
            "class_definition" => {
                let Some(name) = field_text(node, "name", source) else {
                    return Declaration::None;
                };
                let is_exported = is_public(&name);
                Declaration::Symbol {
                    name,
                    kind: SymbolKind::Class,
                    is_exported,
                }
            }
            "assignment" if !scope.in_function => {
                let Some(left) = node.child_by_field_name("left") else {
                    return Declaration::None;
                };
                if left.kind() != "identifier" {
                    return Declaration::None;
                }
                let name = node_text(left, source);
                let kind = if is_constant_name(&name) {
                    SymbolKind::Constant
                } else {
                    SymbolKind::Variable
                };
                let is_exported = is_public(&name);
                Declaration::Symbol {
                    name,
                    kind,
                    is_exported,
                }
            }
            _ => Declaration::None,
        }
    }

    fn references(&self, node: Node, source: &[u8], out: &mut Vec<Reference>) {
        match node.kind() {
            "call" => {
                let Some(function) = node.child_by_field_name("function") else {
                    return;
                };
                match function.kind() {
                    "identifier" => {
                        out.push(Reference::call(node_text(function, source), Receiver::None))
                    }
                    "attribute" => {
                        let Some(attribute) = field_text(function, "attribute", source) else {
                            return;
                        };
                        let receiver = match function.child_by_field_name("object") {
                            Some(object) if object.kind() == "identifier" => {
                                match node_text(object, source).as_str() {
                                    "self" | "cls" => Receiver::SelfRef,
                                    other => Receiver::Named(other.to_string()),
                                }
                            }
                            _ => Receiver::Other,
                        };
                        out.push(Reference::call(attribute, receiver));
                    }
                    _ => {}
                }
            }
            "decorator" => {
                let mut cursor = node.walk();
                let target = node.named_children(&mut cursor).next();
                if let Some(target) = target.filter(|t| t.kind() == "identifier") {
                    out.push(Reference::call(node_text(target, source), Receiver::None));
                }
            }
            "type" => {
                let mut names = Vec::new();
                type_identifiers(node, source, &mut names);
                out.extend(names.into_iter().map(Reference::type_name));
            }
            _ => {}
        }
    }

    fn import_bindings(&self, node: Node, source: &[u8], out: &mut Vec<ImportBinding>) {
        match node.kind() {
            "import_statement" => {
                let mut cursor = node.walk();
                let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
                for name in names {
                    let (module, alias) = match name.kind() {
                        "aliased_import" => (
                            field_text(name, "name", source),
                            field_text(name, "alias", source),
                        ),
                        "dotted_name" => (Some(node_text(name, source)), None),
                        _ => continue,
                    };
                    let Some(module) = module else {
                        continue;
                    };
                    let local = alias.unwrap_or_else(|| {
                        module.split('.').next().unwrap_or(&module).to_string()
                    });
                    out.push(ImportBinding {
                        local_name: local,
                        imported_name: None,
                        module_specifier: module,
                        is_type_only: false,
                    });
                }
            }
            "import_from_statement" => from_import(node, source, out),
            "call" => dynamic_binding(node, source, out),
            _ => {}
        }
    }
}

fn from_import(node: Node, source: &[u8], out: &mut Vec<ImportBinding>) {
    let Some(module) = field_text(node, "module_name", source) else {
        return;
    };
    let package_relative = module.chars().all(|c| c == '.');
    let mut cursor = node.walk();
    let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
    for name in names {
        let (imported, alias) = match name.kind() {
            "aliased_import" => (
                field_text(name, "name", source),
                field_text(name, "alias", source),
            ),
            "dotted_name" => (Some(node_text(name, source)), None),
            _ => continue,
        };
        let Some(imported) = imported else {
            continue;
        };
        let local = alias.unwrap_or_else(|| imported.clone());
        // `from . import helpers` binds the submodule itself.
        let binding = if package_relative {
            ImportBinding {
                local_name: local,
                imported_name: None,
                module_specifier: format!("{}{}", module, imported),
                is_type_only: false,
            }
        } else {
            ImportBinding {
                local_name: local,
                imported_name: Some(imported),
                module_specifier: module.clone(),
                is_type_only: false,
            }
        };
        out.push(binding);
    }
}

/// `mod = importlib.import_module("pkg.mod")` binds `mod` to the module.
fn dynamic_binding(node: Node, source: &[u8], out: &mut Vec<ImportBinding>) {
    let Some(callee) = field_text(node, "function", source) else {
        return;
    };
    if callee != "importlib.import_module" && callee != "__import__" {
        return;
    }
    let Some(assignment) = node.parent().filter(|p| p.kind() == "assignment") else {
        return;
    };
    let Some(target) = assignment
        .child_by_field_name("left")
        .filter(|l| l.kind() == "identifier")
    else {
        return;
    };
    let Some(arguments) = node.child_by_field_name("arguments") else {
        return;
    };
    let mut cursor = arguments.walk();
    let first = arguments.named_children(&mut cursor).next();
    if let Some(first) = first.filter(|f| f.kind() == "string") {
        out.push(ImportBinding {
            local_name: node_text(target, source),
            imported_name: None,
            module_specifier: unquote(&node_text(first, source)),
            is_type_only: false,
        });
    }
}

fn type_identifiers(node: Node, source: &[u8], out: &mut Vec<String>) {
    walk_tree(node, |node, step| {
        if step == Step::Leave {
            return false;
        }
        match node.kind() {
            "identifier" => {
                out.push(node_text(node, source));
                false
            }
            // `typing.Optional` names a module member, not a local symbol.
            "attribute" => false,
            _ => true,
        }
    });
}

fn is_public(name: &str) -> bool {
    !name.starts_with('_') || (name.starts_with("__") && name.ends_with("__"))
}

fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
