//! Rust `use` / `mod` parser.
//!
//! Use paths are flattened into module paths: a segment starting with an
//! uppercase letter names a type or trait, so it and everything after it are
//! cut off. Paths rooted in a known external crate are dropped here, before
//! any resolver sees them.

use std::sync::Arc;
use tree_sitter::Node;

use super::{walk_tree, ParseReport, ReferenceCollector, ReferenceKind, Step};
use crate::engine::EngineHandle;

/// Crate roots that never map to a project file.
const EXTERNAL_CRATES: &[&str] = &[
    "std",
    "core",
    "alloc",
    "proc_macro",
    "test",
    "serde",
    "serde_json",
    "tokio",
    "futures",
    "async_trait",
    "anyhow",
    "thiserror",
    "log",
    "tracing",
    "tracing_subscriber",
    "regex",
    "rand",
    "clap",
    "reqwest",
    "hyper",
    "axum",
    "chrono",
    "uuid",
    "once_cell",
    "lazy_static",
    "itertools",
    "rayon",
    "dashmap",
    "parking_lot",
    "crossbeam",
    "bytes",
    "petgraph",
    "tree_sitter",
    "bincode",
    "toml",
    "tempfile",
    "walkdir",
    "ignore",
    "syn",
    "quote",
    "proc_macro2",
];

/// True when `root` is the first segment of a path into an external crate.
pub fn is_external_crate(root: &str) -> bool {
    let root = root.trim_start_matches("::");
    EXTERNAL_CRATES.contains(&root)
}

pub struct RustImportParser {
    engine: Arc<EngineHandle>,
}

impl RustImportParser {
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
        "use_declaration" => {
            let kind = if has_visibility(node) {
                ReferenceKind::Export
            } else {
                ReferenceKind::Import
            };
            if let Some(argument) = node.child_by_field_name("argument") {
                let mut paths = Vec::new();
                flatten_use(argument, source, &[], &mut paths);
                for path in paths {
                    if let Some(module) = module_path(path.segments) {
                        out.push(&module, kind, line);
                    }
                }
            }
            false
        }
        "mod_item" if node.child_by_field_name("body").is_none() => {
            if let Some(name) = node.child_by_field_name("name") {
                let name = text(name, source);
                if !name.is_empty() {
                    out.push(&name, ReferenceKind::Import, line);
                }
            }
            false
        }
        "extern_crate_declaration" => false,
        _ => true,
    }
}

fn has_visibility(node: Node) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|child| child.kind() == "visibility_modifier");
    found
}

/// One path named by a use tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UsePath {
    pub segments: Vec<String>,
    /// Local name from `as alias`.
    pub alias: Option<String>,
    /// The path ended in `::*`.
    pub glob: bool,
}

impl UsePath {
    fn plain(segments: Vec<String>) -> Self {
        Self {
            segments,
            alias: None,
            glob: false,
        }
    }
}

/// Expand a use tree into one entry per imported path, in source order.
pub(crate) fn flatten_use(node: Node, source: &[u8], prefix: &[String], out: &mut Vec<UsePath>) {
    let mut pending = vec![(node, prefix.to_vec())];
    while let Some((node, prefix)) = pending.pop() {
        match node.kind() {
            "use_as_clause" => {
                if let Some(path) = node.child_by_field_name("path") {
                    out.push(UsePath {
                        segments: joined(&prefix, segments(path, source)),
                        alias: node.child_by_field_name("alias").map(|a| text(a, source)),
                        glob: false,
                    });
                }
            }
            "scoped_use_list" => {
                let base = match node.child_by_field_name("path") {
                    Some(path) => joined(&prefix, segments(path, source)),
                    None => prefix,
                };
                if let Some(list) = node.child_by_field_name("list") {
                    pending.push((list, base));
                }
            }
            "use_list" => {
                let mut cursor = node.walk();
                let items: Vec<Node> = node.named_children(&mut cursor).collect();
                pending.extend(items.into_iter().rev().map(|item| (item, prefix.clone())));
            }
            "use_wildcard" => {
                let mut cursor = node.walk();
                let path = node.named_children(&mut cursor).next();
                let full = match path {
                    Some(path) => joined(&prefix, segments(path, source)),
                    None => prefix,
                };
                out.push(UsePath {
                    segments: full,
                    alias: None,
                    glob: true,
                });
            }
            _ => out.push(UsePath::plain(joined(&prefix, segments(node, source)))),
        }
    }
}

pub(crate) fn segments(node: Node, source: &[u8]) -> Vec<String> {
    // Scoped identifiers nest leftwards: `a::b::c` is ((a::b)::c).
    let mut reversed = Vec::new();
    let mut current = Some(node);
    while let Some(node) = current {
        if node.kind() != "scoped_identifier" {
            reversed.push(text(node, source));
            break;
        }
        if let Some(name) = node.child_by_field_name("name") {
            reversed.push(text(name, source));
        }
        current = node.child_by_field_name("path");
    }
    reversed.reverse();
    reversed
}

fn joined(prefix: &[String], tail: Vec<String>) -> Vec<String> {
    let mut all = prefix.to_vec();
    all.extend(tail);
    all
}

/// Reduce a flattened use path to its module part, or `None` when nothing
/// project-local remains.
pub(crate) fn module_path(segments: Vec<String>) -> Option<String> {
    let mut kept: Vec<String> = segments
        .into_iter()
        .map(|s| s.trim_start_matches("::").to_string())
        .filter(|s| !s.is_empty())
        .take_while(|s| is_module_segment(s))
        .collect();
    // `use foo::{self}` names `foo` itself.
    if kept.len() > 1 && kept.last().is_some_and(|s| s == "self") {
        kept.pop();
    }
    let root = kept.first()?;
    if is_external_crate(root) {
        return None;
    }
    if kept.len() == 1 && root == "self" {
        return None;
    }
    Some(kept.join("::"))
}

pub(crate) fn is_module_segment(segment: &str) -> bool {
    segment
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
}

fn text(node: Node, source: &[u8]) -> String {
    node.utf8_text(source).unwrap_or_default().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> RustImportParser {
        RustImportParser::new(Arc::new(EngineHandle::new(
            "rust",
            tree_sitter_rust::LANGUAGE.into(),
            None,
        )))
    }

    fn specs(report: &ParseReport) -> Vec<(&str, ReferenceKind, usize)> {
        report
            .references
            .iter()
            .map(|r| (r.module_path.as_str(), r.kind, r.line))
            .collect()
    }

    #[test]
    fn test_use_and_mod_forms() {
        let src = r#"mod helper;
mod unused;
mod inline { fn x() {} }
use crate::graph::DependencyGraph;
use super::parser::{self, rust::RustImportParser, ParseReport};
pub use self::helper::format_data;
use std::collections::HashMap;
use serde::{Deserialize, Serialize};
extern crate alloc;
"#;
        let report = parser().parse(src);
        assert_eq!(
            specs(&report),
            vec![
                ("helper", ReferenceKind::Import, 1),
                ("unused", ReferenceKind::Import, 2),
                ("crate::graph", ReferenceKind::Import, 4),
                ("super::parser", ReferenceKind::Import, 5),
                ("super::parser::rust", ReferenceKind::Import, 5),
                ("self::helper::format_data", ReferenceKind::Export, 6),
            ]
        );
        assert!(!report.degraded);
    }

    #[test]
    fn test_wildcard_alias_and_comments() {
        let src = r#"// use crate::commented::thing;
use crate::prelude::*;
use crate::io::reader as r;
const S: &str = "use crate::in_string;";
"#;
        let report = parser().parse(src);
        assert_eq!(
            specs(&report),
            vec![
                ("crate::prelude", ReferenceKind::Import, 2),
                ("crate::io::reader", ReferenceKind::Import, 3),
            ]
        );
    }

    #[test]
    fn test_uppercase_segments_never_emitted() {
        let heads = ["A", "Config", "HTTPClient", "X9", "Zeta_value"];
        for head in heads {
            let src = format!(
                "use crate::module_a::{head};\nuse crate::{{{head}, lower_mod}};\nuse {head}::inner;\n"
            );
            let report = parser().parse(&src);
            for reference in &report.references {
                assert!(
                    reference
                        .module_path
                        .split("::")
                        .all(|seg| !seg.starts_with(|c: char| c.is_ascii_uppercase())),
                    "{} leaked a type segment",
                    reference.module_path
                );
            }
            let paths: Vec<&str> = report.references.iter().map(|r| r.module_path.as_str()).collect();
            assert!(paths.contains(&"crate::module_a"));
            assert!(paths.contains(&"crate::lower_mod"));
        }
    }

    #[test]
    fn test_external_crates_filtered() {
        for root in EXTERNAL_CRATES {
            let src = format!("use {root}::some_mod::Item;\nuse ::{root}::other;\n");
            let report = parser().parse(&src);
            assert!(report.references.is_empty(), "{root} was not filtered");
        }
        assert!(is_external_crate("::std"));
        assert!(!is_external_crate("crate"));
    }

    #[test]
    fn test_malformed_input_is_partial() {
        let report = parser().parse("use crate::ok;\nfn broken( {\nuse crate::");
        assert!(report.references.iter().any(|r| r.module_path == "crate::ok"));
        assert!(report.degraded);
    }
}
