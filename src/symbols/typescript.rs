//! Declaration and reference rules for TS/JS syntax trees.
//!
//! Exported means a top-level declaration wrapped in `export`, or a public
//! method of an exported class. Only module- and class-level variables are
//! symbols; locals inside function bodies are not.

use tree_sitter::Node;

use super::extractor::{
    field_text, has_token, is_declared_name, node_text, unquote, Declaration, Receiver,
    Reference, ScopeContext, SyntaxRules,
};
use super::{ImportBinding, SymbolKind};

pub(crate) struct TsRules;

impl SyntaxRules for TsRules {
    fn declaration(&self, node: Node, source: &[u8], scope: &ScopeContext) -> Declaration {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" => {
                let Some(name) = field_text(node, "name", source) else {
                    return Declaration::None;
                };
                let kind = if has_token(node, "async") {
                    SymbolKind::AsyncFunction
                } else {
                    SymbolKind::Function
                };
                Declaration::Symbol {
                    name,
                    kind,
                    is_exported: is_exported(node),
                }
            }
            "class_declaration" | "abstract_class_declaration" | "class" => {
                let Some(name) = field_text(node, "name", source) else {
                    return Declaration::None;
                };
                Declaration::Symbol {
                    name,
                    kind: SymbolKind::Class,
                    is_exported: is_exported(node),
                }
            }
            "interface_declaration" => simple(node, source, SymbolKind::Interface),
            "type_alias_declaration" => simple(node, source, SymbolKind::TypeAlias),
            "enum_declaration" => simple(node, source, SymbolKind::Enum),
            "method_definition" => {
                let Some(name) = field_text(node, "name", source) else {
                    return Declaration::None;
                };
                let kind = if has_token(node, "async") {
                    SymbolKind::AsyncMethod
                } else {
                    SymbolKind::Method
                };
                let private = name.starts_with('#') || is_private_member(node, source);
                Declaration::Symbol {
                    name,
                    kind,
                    is_exported: scope.parent_exported && !private,
                }
            }
            "variable_declarator" if !scope.in_function && !scope.parent_is_class => {
                variable(node, source)
            }
            _ => Declaration::None,
        }
    }

    fn references(&self, node: Node, source: &[u8], out: &mut Vec<Reference>) {
        match node.kind() {
            "call_expression" => {
                let Some(function) = node.child_by_field_name("function") else {
                    return;
                };
                match function.kind() {
                    "identifier" => out.push(Reference::call(node_text(function, source), Receiver::None)),
                    "member_expression" => {
                        let Some(property) = field_text(function, "property", source) else {
                            return;
                        };
                        let receiver = match function.child_by_field_name("object") {
                            Some(object) if object.kind() == "this" => Receiver::SelfRef,
                            Some(object) if object.kind() == "identifier" => {
                                Receiver::Named(node_text(object, source))
                            }
                            // `new Service().load()`
                            Some(object) if object.kind() == "new_expression" => object
                                .child_by_field_name("constructor")
                                .filter(|c| c.kind() == "identifier")
                                .map_or(Receiver::Other, |c| Receiver::Named(node_text(c, source))),
                            _ => Receiver::Other,
                        };
                        out.push(Reference::call(property.trim_start_matches('#'), receiver));
                    }
                    _ => {}
                }
            }
            "new_expression" => {
                if let Some(constructor) = node.child_by_field_name("constructor") {
                    if constructor.kind() == "identifier" {
                        out.push(Reference::call(node_text(constructor, source), Receiver::None));
                    }
                }
            }
            "jsx_opening_element" | "jsx_self_closing_element" => {
                if let Some(name) = field_text(node, "name", source) {
                    if name.starts_with(|c: char| c.is_ascii_uppercase()) && !name.contains('.') {
                        out.push(Reference::call(name, Receiver::None));
                    }
                }
            }
            "type_identifier" if !is_declared_name(node) => {
                out.push(Reference::type_name(node_text(node, source)));
            }
            _ => {}
        }
    }

    fn import_bindings(&self, node: Node, source: &[u8], out: &mut Vec<ImportBinding>) {
        match node.kind() {
            "import_statement" => import_statement(node, source, out),
            "variable_declarator" => require_binding(node, source, out),
            _ => {}
        }
    }
}

fn simple(node: Node, source: &[u8], kind: SymbolKind) -> Declaration {
    match field_text(node, "name", source) {
        Some(name) => Declaration::Symbol {
            name,
            kind,
            is_exported: is_exported(node),
        },
        None => Declaration::None,
    }
}

/// `const f = () => {}` is a function; other declarators are variables.
fn variable(node: Node, source: &[u8]) -> Declaration {
    let Some(name_node) = node.child_by_field_name("name") else {
        return Declaration::None;
    };
    if name_node.kind() != "identifier" {
        return Declaration::None;
    }
    let name = node_text(name_node, source);
    let declaration = node.parent();
    let is_const = declaration.is_some_and(|d| has_token(d, "const"));
    let kind = match node.child_by_field_name("value") {
        Some(value)
            if matches!(
                value.kind(),
                "arrow_function" | "function_expression" | "function" | "generator_function"
            ) =>
        {
            if has_token(value, "async") {
                SymbolKind::AsyncFunction
            } else {
                SymbolKind::Function
            }
        }
        _ if is_const => SymbolKind::Constant,
        _ => SymbolKind::Variable,
    };
    Declaration::Symbol {
        name,
        kind,
        is_exported: declaration.is_some_and(is_exported),
    }
}

fn is_exported(node: Node) -> bool {
    node.parent().is_some_and(|p| p.kind() == "export_statement")
}

fn is_private_member(node: Node, source: &[u8]) -> bool {
    let mut cursor = node.walk();
    let private = node.children(&mut cursor).any(|c| {
        c.kind() == "accessibility_modifier" && matches!(node_text(c, source).as_str(), "private" | "protected")
    });
    private
}

fn import_statement(node: Node, source: &[u8], out: &mut Vec<ImportBinding>) {
    let Some(specifier) = node
        .child_by_field_name("source")
        .map(|s| unquote(&node_text(s, source)))
    else {
        return;
    };
    let type_only = has_token(node, "type");
    let mut cursor = node.walk();
    let clauses: Vec<Node> = node
        .named_children(&mut cursor)
        .filter(|c| c.kind() == "import_clause")
        .collect();

    for clause in clauses {
        let mut cursor = clause.walk();
        let parts: Vec<Node> = clause.named_children(&mut cursor).collect();
        for part in parts {
            match part.kind() {
                "identifier" => out.push(ImportBinding {
                    local_name: node_text(part, source),
                    imported_name: Some("default".to_string()),
                    module_specifier: specifier.clone(),
                    is_type_only: type_only,
                }),
                "namespace_import" => {
                    let mut cursor = part.walk();
                    let local = part
                        .named_children(&mut cursor)
                        .find(|c| c.kind() == "identifier")
                        .map(|c| node_text(c, source));
                    if let Some(local) = local {
                        out.push(ImportBinding {
                            local_name: local,
                            imported_name: None,
                            module_specifier: specifier.clone(),
                            is_type_only: type_only,
                        });
                    }
                }
                "named_imports" => {
                    let mut cursor = part.walk();
                    let specs: Vec<Node> = part
                        .named_children(&mut cursor)
                        .filter(|c| c.kind() == "import_specifier")
                        .collect();
                    for spec in specs {
                        let Some(imported) = field_text(spec, "name", source) else {
                            continue;
                        };
                        let local = field_text(spec, "alias", source).unwrap_or_else(|| imported.clone());
                        out.push(ImportBinding {
                            local_name: local,
                            imported_name: Some(imported),
                            module_specifier: specifier.clone(),
                            is_type_only: type_only || has_token(spec, "type"),
                        });
                    }
                }
                _ => {}
            }
        }
    }
}

/// `const x = require('m')` and `const { a, b } = require('m')`.
fn require_binding(node: Node, source: &[u8], out: &mut Vec<ImportBinding>) {
    let (Some(name), Some(value)) = (
        node.child_by_field_name("name"),
        node.child_by_field_name("value"),
    ) else {
        return;
    };
    if value.kind() != "call_expression"
        || value
            .child_by_field_name("function")
            .map(|f| node_text(f, source))
            .as_deref()
            != Some("require")
    {
        return;
    }
    let Some(arguments) = value.child_by_field_name("arguments") else {
        return;
    };
    let mut cursor = arguments.walk();
    let Some(first) = arguments.named_children(&mut cursor).next() else {
        return;
    };
    if first.kind() != "string" {
        return;
    }
    let specifier = unquote(&node_text(first, source));

    match name.kind() {
        "identifier" => out.push(ImportBinding {
            local_name: node_text(name, source),
            imported_name: None,
            module_specifier: specifier,
            is_type_only: false,
        }),
        "object_pattern" => {
            let mut cursor = name.walk();
            let fields: Vec<Node> = name.named_children(&mut cursor).collect();
            for field in fields {
                if field.kind() == "shorthand_property_identifier_pattern" {
                    let local = node_text(field, source);
                    out.push(ImportBinding {
                        local_name: local.clone(),
                        imported_name: Some(local),
                        module_specifier: specifier.clone(),
                        is_type_only: false,
                    });
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::EngineHandle;
    use crate::parser::SupportedLanguage;
    use crate::symbols::{analyze_file_content, FileAnalysis, SymbolKind};
    use std::path::Path;

    fn analyze(language: SupportedLanguage, src: &str) -> FileAnalysis {
        let grammar = match language {
            SupportedLanguage::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            SupportedLanguage::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            _ => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        };
        let engine = EngineHandle::new(language.engine_name(), grammar, None);
        analyze_file_content(&engine, language, Path::new("/proj/src/app.ts"), src)
    }

    fn edges(analysis: &FileAnalysis) -> Vec<(String, String, bool)> {
        analysis
            .dependencies
            .iter()
            .map(|d| {
                let short = |id: &str| id.rsplit_once(':').map(|(_, q)| q.to_string()).unwrap_or_default();
                (short(&d.source_symbol_id), short(&d.target_symbol_id), d.is_type_only)
            })
            .collect()
    }

    #[test]
    fn test_declarations_and_exports() {
        let src = r#"import { helper } from './helper';
export interface Options { depth: number }
export type Id = string;
export const LIMIT = 10;
let counter = 0;
export class Service {
  async load(opts: Options): Promise<Id> { return this.parse(); }
  private parse(): Id { return format(); }
}
function format(): Id { return helper(); }
export const run = async () => new Service().load({ depth: LIMIT });
"#;
        let analysis = analyze(SupportedLanguage::TypeScript, src);
        let summary: Vec<(&str, SymbolKind, bool)> = analysis
            .symbols
            .iter()
            .map(|s| (s.qualified_name(), s.kind, s.is_exported))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Options", SymbolKind::Interface, true),
                ("Id", SymbolKind::TypeAlias, true),
                ("LIMIT", SymbolKind::Constant, true),
                ("counter", SymbolKind::Variable, false),
                ("Service", SymbolKind::Class, true),
                ("Service.load", SymbolKind::AsyncMethod, true),
                ("Service.parse", SymbolKind::Method, false),
                ("format", SymbolKind::Function, false),
                ("run", SymbolKind::AsyncFunction, true),
            ]
        );
        let method = analysis.symbols.iter().find(|s| s.name == "load").unwrap();
        assert_eq!(method.parent_symbol_id.as_deref(), Some("/proj/src/app.ts:Service"));
        assert_eq!(method.line, 7);
    }

    #[test]
    fn test_call_and_type_edges() {
        let src = r#"import { helper } from './helper';
import * as utils from './utils';
interface Options { depth: number }
class Service {
  load(opts: Options) { return this.parse(); }
  parse() { return format(); }
}
function format() { utils.pad(); console.log('x'); return helper(); }
const run = () => new Service().load({ depth: 1 });
"#;
        let analysis = analyze(SupportedLanguage::TypeScript, src);
        let found = edges(&analysis);
        assert!(found.contains(&("Service.load".into(), "Options".into(), true)));
        assert!(found.contains(&("Service.load".into(), "Service.parse".into(), false)));
        assert!(found.contains(&("Service.parse".into(), "format".into(), false)));
        assert!(found.contains(&("run".into(), "Service".into(), false)));
        assert!(found.contains(&("run".into(), "Service.load".into(), false)));
        assert!(!found.iter().any(|(_, target, _)| target == "log"));

        let external: Vec<(&str, &str)> = analysis
            .external_calls
            .iter()
            .map(|c| (c.module_specifier.as_str(), c.symbol_name.as_str()))
            .collect();
        assert_eq!(external, vec![("./utils", "pad"), ("./helper", "helper")]);
    }

    #[test]
    fn test_self_recursion_single_edge() {
        let src = "export function factorial(n) {\n  return n <= 1 ? 1 : n * factorial(n - 1) + factorial(0) * 0;\n}\n";
        let analysis = analyze(SupportedLanguage::JavaScript, src);
        assert_eq!(analysis.dependencies.len(), 1);
        let dep = &analysis.dependencies[0];
        assert!(dep.is_self_recursive());
        assert_eq!(dep.target_symbol_id, "/proj/src/app.ts:factorial");
    }

    #[test]
    fn test_require_bindings() {
        let src = "const fs = require('fs');\nconst { join, resolve } = require('./paths');\n";
        let analysis = analyze(SupportedLanguage::JavaScript, src);
        let locals: Vec<(&str, Option<&str>)> = analysis
            .import_bindings
            .iter()
            .map(|b| (b.local_name.as_str(), b.imported_name.as_deref()))
            .collect();
        assert_eq!(
            locals,
            vec![("fs", None), ("join", Some("join")), ("resolve", Some("resolve"))]
        );
    }

    #[test]
    fn test_vue_script_block_lines() {
        let src = "<template><div/></template>\n<script lang=\"ts\">\nexport function setup() { return 1; }\n</script>\n";
        let analysis = analyze(SupportedLanguage::Vue, src);
        assert_eq!(analysis.symbols.len(), 1);
        assert_eq!(analysis.symbols[0].line, 3);
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let src = "class A { m() { return this.n(); } n() { return 1; } }\nfunction f() { return new A().m(); }\n";
        let first = analyze(SupportedLanguage::TypeScript, src);
        let second = analyze(SupportedLanguage::TypeScript, src);
        assert_eq!(first, second);
    }

    #[test]
    fn test_deeply_nested_literal() {
        let depth = 20_000;
        let src = format!(
            "const table = {}1{};\nexport function lookup() {{ return format(); }}\nfunction format() {{ return 1; }}\n",
            "[".repeat(depth),
            "]".repeat(depth)
        );
        let analysis = analyze(SupportedLanguage::TypeScript, &src);
        let names: Vec<&str> = analysis.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["table", "lookup", "format"]);
        assert_eq!(edges(&analysis), vec![("lookup".into(), "format".into(), false)]);
    }

    #[test]
    fn test_unknown_receiver_does_not_guess() {
        let src = r#"class Writer { write() { return 1; } }
function flush(stream) { stream.write(); getSink().write(); }
function direct() { return Writer.write(); }
"#;
        let analysis = analyze(SupportedLanguage::TypeScript, src);
        let found = edges(&analysis);
        assert!(!found.iter().any(|(source, _, _)| source == "flush"));
        assert!(found.contains(&("direct".into(), "Writer.write".into(), false)));
    }
}
