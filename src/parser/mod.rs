//! Per-language import parsers.
//!
//! A parser turns raw file text into the list of module specifiers the file
//! depends on. Parsers never fail: malformed statements are skipped and
//! whatever could be extracted is returned.

pub mod language;
pub mod python;
pub mod rust;
pub mod source;
pub mod typescript;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tree_sitter::Node;

pub use language::{LanguageFamily, SupportedLanguage};
pub use python::PythonImportParser;
pub use rust::{is_external_crate, RustImportParser};
pub use typescript::TsImportParser;

/// The statement form that introduced a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Import,
    Export,
    Require,
    Dynamic,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Import => write!(f, "import"),
            ReferenceKind::Export => write!(f, "export"),
            ReferenceKind::Require => write!(f, "require"),
            ReferenceKind::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// A module specifier declared by one file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyReference {
    pub module_path: String,
    pub kind: ReferenceKind,
    /// 1-indexed line of the statement that introduced the reference.
    pub line: usize,
}

/// Output of one parse call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseReport {
    /// Unique per `module_path`; the first occurrence wins.
    pub references: Vec<DependencyReference>,
    /// Extraction was partial: the syntax engine reported errors, or the
    /// text mentions import keywords but nothing could be extracted.
    pub degraded: bool,
}

/// Collects references and applies first-occurrence de-duplication.
#[derive(Debug, Default)]
pub(crate) struct ReferenceCollector {
    found: Vec<(usize, DependencyReference)>,
}

impl ReferenceCollector {
    /// Record a reference ordered by its line.
    pub fn push(&mut self, module_path: &str, kind: ReferenceKind, line: usize) {
        self.push_at(module_path, kind, line, 0);
    }

    /// Record a reference ordered by line, then byte offset.
    pub fn push_at(&mut self, module_path: &str, kind: ReferenceKind, line: usize, offset: usize) {
        self.found.push((
            offset,
            DependencyReference {
                module_path: module_path.to_string(),
                kind,
                line: line.max(1),
            },
        ));
    }

    pub fn finish(mut self) -> Vec<DependencyReference> {
        // Stable: equal keys keep discovery order.
        self.found.sort_by_key(|(offset, r)| (r.line, *offset));
        let mut seen = HashSet::new();
        self.found
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| seen.insert(r.module_path.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Enter,
    Leave,
}

/// Pre-order walk over the named nodes under `root` (inclusive), driven by a
/// cursor so nesting depth never grows the call stack.
///
/// `visit` sees every named node with [`Step::Enter`] and, once its subtree
/// is done, with [`Step::Leave`]. Returning false on enter skips the
/// node's children; the return value on leave is ignored.
pub(crate) fn walk_tree<'t>(root: Node<'t>, mut visit: impl FnMut(Node<'t>, Step) -> bool) {
    let mut cursor = root.walk();
    let mut descend = visit(root, Step::Enter);
    loop {
        if !(descend && cursor.goto_first_child()) {
            loop {
                let done = cursor.node();
                if done.is_named() {
                    visit(done, Step::Leave);
                }
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return;
                }
            }
        }
        let node = cursor.node();
        descend = node.is_named() && visit(node, Step::Enter);
    }
}
