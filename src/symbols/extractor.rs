use std::collections::{HashMap, HashSet};
use std::path::Path;
use tree_sitter::Node;

use super::python::PythonRules;
use super::rust::RustRules;
use super::typescript::TsRules;
use super::{
    symbol_id, ExternalCall, FileAnalysis, ImportBinding, SymbolDependency, SymbolInfo, SymbolKind,
};
use crate::engine::EngineHandle;
use crate::parser::source::extract_script_blocks;
use crate::parser::{walk_tree, LanguageFamily, SupportedLanguage, Step};
use crate::path::normalize_path;

/// What the rules know about the position of a node.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScopeContext {
    /// Directly inside a class-like declaration (or an `impl` block).
    pub parent_is_class: bool,
    /// Somewhere inside a function body.
    pub in_function: bool,
    pub parent_exported: bool,
}

pub(crate) enum Declaration {
    Symbol {
        name: String,
        kind: SymbolKind,
        is_exported: bool,
    },
    /// Qualifies nested declarations without being a symbol (Rust `impl`, inline `mod`).
    Container { name: String, class_like: bool },
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Receiver {
    None,
    /// `this.x()`, `self.x()`, `Self::x()`.
    SelfRef,
    /// `obj.x()`, `Type::x()`, `module::x()`.
    Named(String),
    /// A path that names another module outright (`crate::a::x()`).
    Module(String),
    Other,
}

#[derive(Debug, Clone)]
pub(crate) struct Reference {
    pub name: String,
    pub receiver: Receiver,
    pub is_type_only: bool,
}

impl Reference {
    pub fn call(name: impl Into<String>, receiver: Receiver) -> Self {
        Self {
            name: name.into(),
            receiver,
            is_type_only: false,
        }
    }

    pub fn type_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            receiver: Receiver::None,
            is_type_only: true,
        }
    }
}

/// Per-language syntax knowledge plugged into the shared walker.
pub(crate) trait SyntaxRules {
    fn declaration(&self, node: Node, source: &[u8], scope: &ScopeContext) -> Declaration;

    /// Calls and type references made directly by `node`.
    fn references(&self, node: Node, source: &[u8], out: &mut Vec<Reference>);

    fn import_bindings(&self, node: Node, source: &[u8], out: &mut Vec<ImportBinding>);
}

#[derive(Debug, Clone)]
struct Frame {
    qualified: String,
    symbol: Option<usize>,
    class_like: bool,
    function_like: bool,
    exported: bool,
}

/// Two-pass symbol extractor for one language.
#[derive(Debug, Clone, Copy)]
pub struct SymbolExtractor {
    language: SupportedLanguage,
}

impl SymbolExtractor {
    pub fn new(language: SupportedLanguage) -> Self {
        Self { language }
    }

    pub fn analyze(&self, engine: &EngineHandle, file_path: &Path, content: &str) -> FileAnalysis {
        let script;
        let content = if self.language.is_container() {
            script = extract_script_blocks(content);
            script.as_str()
        } else {
            content
        };
        let Some(tree) = engine.parse(content) else {
            return FileAnalysis::default();
        };
        let rules: &dyn SyntaxRules = match self.language.family() {
            LanguageFamily::TsLike => &TsRules,
            LanguageFamily::Python => &PythonRules,
            LanguageFamily::Rust => &RustRules,
        };

        let mut walk = Walk {
            rules,
            source: content.as_bytes(),
            file: normalize_path(file_path),
            file_path,
            symbols: Vec::new(),
            qualified: Vec::new(),
            parents: Vec::new(),
            by_qualified: HashMap::new(),
            by_name: HashMap::new(),
            scopes: HashMap::new(),
            bindings: Vec::new(),
        };
        let root = tree.root_node();
        walk.declare(root);
        walk.link_parents();
        let links = walk.link(root);

        FileAnalysis {
            symbols: walk.symbols,
            dependencies: links.dependencies,
            import_bindings: walk.bindings,
            external_calls: links.external,
        }
    }
}

struct Walk<'a> {
    rules: &'a dyn SyntaxRules,
    source: &'a [u8],
    file: String,
    file_path: &'a Path,
    symbols: Vec<SymbolInfo>,
    qualified: Vec<String>,
    /// Qualified name of each symbol's enclosing scope.
    parents: Vec<Option<String>>,
    by_qualified: HashMap<String, usize>,
    by_name: HashMap<String, Vec<usize>>,
    /// Scope frames opened at a node, keyed by node id.
    scopes: HashMap<usize, Frame>,
    bindings: Vec<ImportBinding>,
}

#[derive(Default)]
struct Links {
    dependencies: Vec<SymbolDependency>,
    seen: HashSet<(usize, usize, bool)>,
    external: Vec<ExternalCall>,
    seen_external: HashSet<(usize, String, String, bool)>,
}

enum Target {
    Local(usize),
    External { specifier: String, name: String },
}

impl Walk<'_> {
    /// Pass 1: declarations and import bindings.
    fn declare(&mut self, root: Node) {
        let mut frames = Vec::new();
        walk_tree(root, |node, step| {
            match step {
                Step::Enter => self.declare_node(node, &mut frames),
                Step::Leave if self.scopes.contains_key(&node.id()) => {
                    frames.pop();
                }
                Step::Leave => {}
            }
            true
        });
    }

    fn declare_node(&mut self, node: Node, frames: &mut Vec<Frame>) {
        self.rules.import_bindings(node, self.source, &mut self.bindings);

        let context = ScopeContext {
            parent_is_class: frames.last().is_some_and(|f| f.class_like),
            in_function: frames.iter().any(|f| f.function_like),
            parent_exported: frames.last().map_or(true, |f| f.exported),
        };
        let frame = match self.rules.declaration(node, self.source, &context) {
            Declaration::Symbol {
                name,
                kind,
                is_exported,
            } => {
                let qualified = qualify(frames, &name);
                let index = match self.by_qualified.get(&qualified) {
                    Some(&existing) => existing,
                    None => self.add_symbol(node, &name, &qualified, kind, is_exported, frames),
                };
                Some(Frame {
                    qualified,
                    symbol: Some(index),
                    class_like: kind.is_class_like(),
                    function_like: kind.is_function_like(),
                    exported: is_exported,
                })
            }
            Declaration::Container { name, class_like } => Some(Frame {
                qualified: qualify(frames, &name),
                symbol: None,
                class_like,
                function_like: false,
                exported: context.parent_exported,
            }),
            Declaration::None => None,
        };

        if let Some(frame) = frame {
            self.scopes.insert(node.id(), frame.clone());
            frames.push(frame);
        }
    }

    fn add_symbol(
        &mut self,
        node: Node,
        name: &str,
        qualified: &str,
        kind: SymbolKind,
        is_exported: bool,
        frames: &[Frame],
    ) -> usize {
        let index = self.symbols.len();
        self.symbols.push(SymbolInfo {
            id: symbol_id(self.file_path, qualified),
            name: name.to_string(),
            kind,
            category: kind.category(),
            line: node.start_position().row + 1,
            is_exported,
            parent_symbol_id: None,
        });
        self.qualified.push(qualified.to_string());
        self.parents.push(frames.last().map(|f| f.qualified.clone()));
        self.by_qualified.insert(qualified.to_string(), index);
        self.by_name.entry(name.to_string()).or_default().push(index);
        index
    }

    /// Parents are known by qualified name; an `impl Foo` block links its
    /// methods to `Foo` only when `Foo` is declared in this file.
    fn link_parents(&mut self) {
        for index in 0..self.symbols.len() {
            let parent = self.parents[index]
                .as_ref()
                .and_then(|q| self.by_qualified.get(q))
                .map(|&p| self.symbols[p].id.clone());
            self.symbols[index].parent_symbol_id = parent;
        }
    }

    /// Pass 2: references from the enclosing symbol.
    fn link(&self, root: Node) -> Links {
        let mut frames = Vec::new();
        let mut links = Links::default();
        walk_tree(root, |node, step| {
            let scope = self.scopes.get(&node.id());
            match step {
                Step::Enter => {
                    if let Some(frame) = scope {
                        frames.push(frame.clone());
                    }
                    self.link_node(node, &frames, &mut links);
                }
                Step::Leave => {
                    if scope.is_some() {
                        frames.pop();
                    }
                }
            }
            true
        });
        links
    }

    fn link_node(&self, node: Node, frames: &[Frame], links: &mut Links) {
        if let Some(source) = frames.iter().rev().find_map(|f| f.symbol) {
            let mut references = Vec::new();
            self.rules.references(node, self.source, &mut references);
            let line = node.start_position().row + 1;
            for reference in references {
                match self.resolve(&reference, frames) {
                    Some(Target::Local(target)) => {
                        if links.seen.insert((source, target, reference.is_type_only)) {
                            links.dependencies.push(SymbolDependency {
                                source_symbol_id: self.symbols[source].id.clone(),
                                target_symbol_id: self.symbols[target].id.clone(),
                                target_file_path: self.file.clone(),
                                is_type_only: reference.is_type_only,
                            });
                        }
                    }
                    Some(Target::External { specifier, name }) => {
                        let key = (source, specifier.clone(), name.clone(), reference.is_type_only);
                        if links.seen_external.insert(key) {
                            links.external.push(ExternalCall {
                                source_symbol_id: self.symbols[source].id.clone(),
                                module_specifier: specifier,
                                symbol_name: name,
                                is_type_only: reference.is_type_only,
                                line,
                            });
                        }
                    }
                    None => {}
                }
            }
        }
    }

    fn resolve(&self, reference: &Reference, frames: &[Frame]) -> Option<Target> {
        let name = reference.name.as_str();
        let class = frames.iter().rev().find(|f| f.class_like);
        let in_class = |class: &Frame| self.by_qualified.get(&format!("{}.{}", class.qualified, name));

        match &reference.receiver {
            Receiver::SelfRef => class.and_then(in_class).map(|&i| Target::Local(i)),
            Receiver::None => {
                let local = self
                    .by_qualified
                    .get(name)
                    .or_else(|| class.and_then(in_class))
                    .or_else(|| self.by_name.get(name).and_then(|all| all.first()));
                if let Some(&index) = local {
                    return Some(Target::Local(index));
                }
                let binding = self.binding(name)?;
                let imported = binding.imported_name.as_deref()?;
                let symbol = if imported == "default" { name } else { imported };
                Some(Target::External {
                    specifier: binding.module_specifier.clone(),
                    name: symbol.to_string(),
                })
            }
            Receiver::Named(qualifier) => {
                let last = qualifier
                    .rsplit(|c: char| c == '.' || c == ':')
                    .next()
                    .unwrap_or(qualifier);
                if let Some(&index) = self.by_qualified.get(&format!("{}.{}", last, name)) {
                    return Some(Target::Local(index));
                }
                let first = qualifier
                    .split(|c: char| c == '.' || c == ':')
                    .next()
                    .unwrap_or(qualifier);
                if let Some(binding) = self.binding(first) {
                    let symbol = match &binding.imported_name {
                        None => name.to_string(),
                        Some(imported) => format!("{}.{}", imported, name),
                    };
                    return Some(Target::External {
                        specifier: binding.module_specifier.clone(),
                        name: symbol,
                    });
                }
                self.member_of_class(last, name)
            }
            Receiver::Module(specifier) => Some(Target::External {
                specifier: specifier.clone(),
                name: name.to_string(),
            }),
            // Receiver of unknown type: any same-named member would be a guess.
            Receiver::Other => None,
        }
    }

    /// `name` declared directly inside a local class-like symbol called `class`.
    fn member_of_class(&self, class: &str, name: &str) -> Option<Target> {
        self.by_name
            .get(class)?
            .iter()
            .filter(|&&i| self.symbols[i].kind.is_class_like())
            .find_map(|&i| self.by_qualified.get(&format!("{}.{}", self.qualified[i], name)))
            .map(|&i| Target::Local(i))
    }

    fn binding(&self, local: &str) -> Option<&ImportBinding> {
        self.bindings.iter().find(|b| b.local_name == local)
    }
}

fn qualify(frames: &[Frame], name: &str) -> String {
    match frames.last() {
        Some(parent) => format!("{}.{}", parent.qualified, name),
        None => name.to_string(),
    }
}

/// Text of a node, trimmed.
pub(crate) fn node_text(node: Node, source: &[u8]) -> String {
    node.utf8_text(source).unwrap_or_default().trim().to_string()
}

/// Text of a field child.
pub(crate) fn field_text(node: Node, field: &str, source: &[u8]) -> Option<String> {
    let child = node.child_by_field_name(field)?;
    let text = node_text(child, source);
    (!text.is_empty()).then_some(text)
}

/// True when one of the unnamed children is the keyword `token`.
pub(crate) fn has_token(node: Node, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == token);
    found
}

/// True when `node` is the `name` field of its parent.
pub(crate) fn is_declared_name(node: Node) -> bool {
    node.parent()
        .and_then(|p| p.child_by_field_name("name"))
        .is_some_and(|n| n.id() == node.id())
}

/// Strip quotes and a string prefix from a literal.
pub(crate) fn unquote(literal: &str) -> String {
    literal
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}
