//! Symbol extraction.
//!
//! A file's syntax tree is walked twice. The first pass records declarations
//! (functions, methods, classes, variables) with their nesting. The second
//! pass tracks the enclosing symbol and turns every call or type reference
//! whose target is declared in the same file into a [`SymbolDependency`].
//! References to imported names are kept as [`ExternalCall`]s so a caller
//! with a resolver can finish them across files.

mod extractor;
mod python;
mod rust;
mod typescript;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::engine::EngineHandle;
use crate::parser::SupportedLanguage;
use crate::path::normalize_path;

pub use extractor::SymbolExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    AsyncFunction,
    Class,
    Method,
    AsyncMethod,
    Variable,
    Constant,
    Interface,
    TypeAlias,
    Enum,
    Struct,
    Trait,
}

impl SymbolKind {
    pub fn category(&self) -> SymbolCategory {
        match self {
            SymbolKind::Function
            | SymbolKind::AsyncFunction
            | SymbolKind::Method
            | SymbolKind::AsyncMethod => SymbolCategory::Function,
            SymbolKind::Class
            | SymbolKind::Interface
            | SymbolKind::Enum
            | SymbolKind::Struct
            | SymbolKind::Trait => SymbolCategory::Class,
            SymbolKind::Variable | SymbolKind::Constant => SymbolCategory::Variable,
            SymbolKind::TypeAlias => SymbolCategory::Type,
        }
    }

    /// Declarations whose members are qualified by this symbol's name.
    pub fn is_class_like(&self) -> bool {
        self.category() == SymbolCategory::Class
    }

    pub fn is_function_like(&self) -> bool {
        self.category() == SymbolCategory::Function
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SymbolKind::Function => "function",
            SymbolKind::AsyncFunction => "async-function",
            SymbolKind::Class => "class",
            SymbolKind::Method => "method",
            SymbolKind::AsyncMethod => "async-method",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Interface => "interface",
            SymbolKind::TypeAlias => "type-alias",
            SymbolKind::Enum => "enum",
            SymbolKind::Struct => "struct",
            SymbolKind::Trait => "trait",
        };
        write!(f, "{}", name)
    }
}

/// Coarse grouping used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolCategory {
    Function,
    Class,
    Variable,
    Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// `<normalized file>:<qualified name>`.
    pub id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub category: SymbolCategory,
    /// 1-indexed.
    pub line: usize,
    pub is_exported: bool,
    pub parent_symbol_id: Option<String>,
}

impl SymbolInfo {
    /// Name qualified by its enclosing declarations, e.g. `Dog.speak`.
    pub fn qualified_name(&self) -> &str {
        self.id.rsplit_once(':').map(|(_, q)| q).unwrap_or(&self.id)
    }
}

/// "source symbol uses target symbol".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolDependency {
    pub source_symbol_id: String,
    pub target_symbol_id: String,
    pub target_file_path: String,
    pub is_type_only: bool,
}

impl SymbolDependency {
    pub fn is_self_recursive(&self) -> bool {
        self.source_symbol_id == self.target_symbol_id
    }

    /// Normalized file part of the source symbol id.
    pub fn source_file(&self) -> &str {
        self.source_symbol_id
            .rsplit_once(':')
            .map(|(file, _)| file)
            .unwrap_or(&self.source_symbol_id)
    }
}

/// A name brought into scope by an import statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportBinding {
    pub local_name: String,
    /// `None` binds the whole module (namespace import).
    pub imported_name: Option<String>,
    pub module_specifier: String,
    pub is_type_only: bool,
}

/// A reference to a symbol of another file, not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalCall {
    pub source_symbol_id: String,
    pub module_specifier: String,
    /// Qualified (`Class.method`) or plain name in the target module.
    pub symbol_name: String,
    pub is_type_only: bool,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub symbols: Vec<SymbolInfo>,
    /// Same-file dependencies, unique per (source, target, type-only).
    pub dependencies: Vec<SymbolDependency>,
    pub import_bindings: Vec<ImportBinding>,
    pub external_calls: Vec<ExternalCall>,
}

impl FileAnalysis {
    pub fn symbol(&self, id: &str) -> Option<&SymbolInfo> {
        self.symbols.iter().find(|s| s.id == id)
    }

    /// Top-level symbol by qualified name, falling back to the last segment.
    pub fn find_by_name(&self, name: &str) -> Option<&SymbolInfo> {
        self.symbols
            .iter()
            .find(|s| s.qualified_name() == name)
            .or_else(|| {
                let simple = name.rsplit('.').next().unwrap_or(name);
                self.symbols
                    .iter()
                    .find(|s| s.parent_symbol_id.is_none() && s.name == simple)
            })
    }
}

/// Deterministic id of a symbol.
pub fn symbol_id(file: &Path, qualified_name: &str) -> String {
    format!("{}:{}", normalize_path(file), qualified_name)
}

/// Extract symbols and dependencies from one file's content.
pub fn analyze_file_content(
    engine: &EngineHandle,
    language: SupportedLanguage,
    file_path: &Path,
    content: &str,
) -> FileAnalysis {
    SymbolExtractor::new(language).analyze(engine, file_path, content)
}
