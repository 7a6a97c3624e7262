//! Python import parser over the tree-sitter syntax tree.
//!
//! Comments and strings never produce references because only statement
//! nodes are inspected. Imports nested in `try`/`if` blocks count.

use std::sync::Arc;
use tree_sitter::Node;

use super::{walk_tree, ParseReport, ReferenceCollector, ReferenceKind, Step};
use crate::engine::EngineHandle;

pub struct PythonImportParser {
    engine: Arc<EngineHandle>,
}

impl PythonImportParser {
    pub fn new(engine: Arc<EngineHandle>) -> Self {
        Self { engine }
    }

    pub fn parse(&self, content: &str) -> ParseReport {
        let Some(tree) = self.engine.parse(content) else {
            return ParseReport {
                references: Vec::new(),
                degraded: !content.trim().is_empty(),
            };
        };
        let root = tree.root_node();
        let mut collector = ReferenceCollector::default();
        collect(root, content.as_bytes(), &mut collector);
        ParseReport {
            references: collector.finish(),
            degraded: root.has_error(),
        }
    }
}

fn collect(root: Node, source: &[u8], out: &mut ReferenceCollector) {
    walk_tree(root, |node, step| step == Step::Enter && visit(node, source, out));
}

/// Record the references made by `node`; false when its children hold none.
fn visit(node: Node, source: &[u8], out: &mut ReferenceCollector) -> bool {
    let line = node.start_position().row + 1;
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                if let Some(module) = imported_module(name, source) {
                    out.push(&module, ReferenceKind::Import, line);
                }
            }
            false
        }
        "import_from_statement" => {
            collect_from_import(node, source, line, out);
            false
        }
        "future_import_statement" => false,
        "call" => {
            if let Some(module) = dynamic_import(node, source) {
                out.push(&module, ReferenceKind::Dynamic, line);
            }
            true
        }
        _ => true,
    }
}

fn collect_from_import(node: Node, source: &[u8], line: usize, out: &mut ReferenceCollector) {
    let Some(module) = node.child_by_field_name("module_name") else {
        return;
    };
    let module_text = text(module, source);

    // `from . import helpers` names submodules of the current package.
    if module.kind() == "relative_import" && module_text.chars().all(|c| c == '.') {
        let mut cursor = node.walk();
        let names: Vec<String> = node
            .children_by_field_name("name", &mut cursor)
            .filter_map(|name| imported_module(name, source))
            .collect();
        if names.is_empty() {
            out.push(&module_text, ReferenceKind::Import, line);
        }
        for name in names {
            out.push(&format!("{}{}", module_text, name), ReferenceKind::Import, line);
        }
        return;
    }

    if !module_text.is_empty() {
        out.push(&module_text, ReferenceKind::Import, line);
    }
}

fn imported_module(name: Node, source: &[u8]) -> Option<String> {
    let target = match name.kind() {
        "aliased_import" => name.child_by_field_name("name")?,
        "dotted_name" => name,
        _ => return None,
    };
    let module = text(target, source);
    (!module.is_empty()).then_some(module)
}

/// `__import__("x")` and `importlib.import_module("x")`.
fn dynamic_import(node: Node, source: &[u8]) -> Option<String> {
    let function = node.child_by_field_name("function")?;
    let callee = text(function, source);
    if callee != "__import__" && callee != "importlib.import_module" && callee != "import_module" {
        return None;
    }
    let arguments = node.child_by_field_name("arguments")?;
    let mut cursor = arguments.walk();
    let first = arguments.named_children(&mut cursor).next()?;
    if first.kind() != "string" {
        return None;
    }
    let value = string_value(&text(first, source));
    (!value.is_empty()).then_some(value)
}

fn string_value(literal: &str) -> String {
    literal
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string()
}

fn text(node: Node, source: &[u8]) -> String {
    node.utf8_text(source).unwrap_or_default().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::DependencyReference;

    fn parser() -> PythonImportParser {
        PythonImportParser::new(Arc::new(EngineHandle::new(
            "python",
            tree_sitter_python::LANGUAGE.into(),
            None,
        )))
    }

    fn specs(refs: &[DependencyReference]) -> Vec<(&str, usize)> {
        refs.iter().map(|r| (r.module_path.as_str(), r.line)).collect()
    }

    #[test]
    fn test_import_forms() {
        let src = r#"import os
import a.b as ab, c
from utils.database import connect_db, query_data
from . import helpers
from .main import main
from ..utils.helpers import calculate
from __future__ import annotations
"#;
        let report = parser().parse(src);
        assert_eq!(
            specs(&report.references),
            vec![
                ("os", 1),
                ("a.b", 2),
                ("c", 2),
                ("utils.database", 3),
                (".helpers", 4),
                (".main", 5),
                ("..utils.helpers", 6),
            ]
        );
        assert!(!report.degraded);
    }

    #[test]
    fn test_comments_strings_ignored_nested_counted() {
        let src = r#"# import commented
DOC = """
import in_docstring
"""
try:
    import fast_json as json
except ImportError:
    import json
def load():
    mod = importlib.import_module("plugins.loader")
"#;
        let report = parser().parse(src);
        assert_eq!(
            specs(&report.references),
            vec![("fast_json", 6), ("json", 8), ("plugins.loader", 10)]
        );
        assert_eq!(report.references[2].kind, ReferenceKind::Dynamic);
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let src = "import os\nif True:\n    import os\n";
        let report = parser().parse(src);
        assert_eq!(specs(&report.references), vec![("os", 1)]);
    }

    #[test]
    fn test_malformed_degrades() {
        let src = "import valid\ndef broken(:\n    pass\nfrom . import\n";
        let report = parser().parse(src);
        assert!(report.references.iter().any(|r| r.module_path == "valid"));
        assert!(report.degraded);
    }

    #[test]
    fn test_deep_nesting_keeps_later_imports() {
        let depth = 20_000;
        let src = format!(
            "import os\nvalue = {}1{}\nimport sys\n",
            "(".repeat(depth),
            ")".repeat(depth)
        );
        let report = parser().parse(&src);
        assert_eq!(specs(&report.references), vec![("os", 1), ("sys", 3)]);
    }
}
