//! Per-language analyzers and the service that binds them by extension.
//!
//! The language set is closed: an analyzer is one of three tagged variants,
//! each pairing an import parser with a module resolver, and every variant
//! can extract symbols. Analyzers are created on first use of a language and
//! shared afterwards.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::ProjectConfig;
use crate::engine::{EngineHandle, ParserEngineFactory};
use crate::error::{GraphError, Result};
use crate::parser::{
    LanguageFamily, ParseReport, PythonImportParser, RustImportParser, SupportedLanguage,
    TsImportParser,
};
use crate::resolver::{PythonResolver, RustResolver, TsResolver};
use crate::symbols::{FileAnalysis, SymbolExtractor};

/// Import parser + module resolver + symbol extractor for one language.
pub enum LanguageAnalyzer {
    TsLike {
        language: SupportedLanguage,
        engine: Arc<EngineHandle>,
        parser: TsImportParser,
        resolver: Arc<TsResolver>,
    },
    Python {
        engine: Arc<EngineHandle>,
        parser: PythonImportParser,
        resolver: Arc<PythonResolver>,
    },
    Rust {
        engine: Arc<EngineHandle>,
        parser: RustImportParser,
        resolver: Arc<RustResolver>,
    },
}

impl LanguageAnalyzer {
    pub fn language(&self) -> SupportedLanguage {
        match self {
            LanguageAnalyzer::TsLike { language, .. } => *language,
            LanguageAnalyzer::Python { .. } => SupportedLanguage::Python,
            LanguageAnalyzer::Rust { .. } => SupportedLanguage::Rust,
        }
    }

    pub fn family(&self) -> LanguageFamily {
        self.language().family()
    }

    /// Dependency references declared by `content`. Never fails.
    pub fn parse_imports(&self, content: &str) -> ParseReport {
        match self {
            LanguageAnalyzer::TsLike { parser, .. } => parser.parse(content),
            LanguageAnalyzer::Python { parser, .. } => parser.parse(content),
            LanguageAnalyzer::Rust { parser, .. } => parser.parse(content),
        }
    }

    /// Map a specifier used in `from_file` to a file on disk. `None` means
    /// external or unresolvable.
    pub async fn resolve_path(&self, from_file: &Path, specifier: &str) -> Option<PathBuf> {
        match self {
            LanguageAnalyzer::TsLike { resolver, .. } => resolver.resolve(from_file, specifier).await,
            LanguageAnalyzer::Python { resolver, .. } => {
                resolver.resolve(from_file, specifier).await
            }
            LanguageAnalyzer::Rust { resolver, .. } => resolver.resolve(from_file, specifier).await,
        }
    }

    /// Symbols and same-file dependencies of `content`.
    pub fn analyze_symbols(&self, file_path: &Path, content: &str) -> FileAnalysis {
        SymbolExtractor::new(self.language()).analyze(self.engine(), file_path, content)
    }

    fn engine(&self) -> &EngineHandle {
        match self {
            LanguageAnalyzer::TsLike { engine, .. }
            | LanguageAnalyzer::Python { engine, .. }
            | LanguageAnalyzer::Rust { engine, .. } => engine,
        }
    }
}

type AnalyzerSlot = Arc<OnceCell<Arc<LanguageAnalyzer>>>;

/// Binds analyzers to file extensions, lazily.
///
/// A failure to bind one language (missing engine asset, unknown
/// extension) is returned to that request only; languages already bound
/// keep working.
pub struct LanguageService {
    config: Arc<ProjectConfig>,
    factory: Arc<ParserEngineFactory>,
    analyzers: DashMap<SupportedLanguage, AnalyzerSlot>,
    ts_resolver: Arc<TsResolver>,
    python_resolver: Arc<PythonResolver>,
    rust_resolver: Arc<RustResolver>,
}

impl LanguageService {
    pub fn new(config: Arc<ProjectConfig>, factory: Arc<ParserEngineFactory>) -> Self {
        let config = config.anchored();
        let root = config.project_root.clone();
        Self {
            ts_resolver: Arc::new(TsResolver::new(root.clone(), config.exclude_node_modules)),
            python_resolver: Arc::new(PythonResolver::new(root.clone())),
            rust_resolver: Arc::new(RustResolver::new(root)),
            config,
            factory,
            analyzers: DashMap::new(),
        }
    }

    /// Analyzer for the file's extension.
    pub async fn analyzer_for(&self, path: &Path) -> Result<Arc<LanguageAnalyzer>> {
        let language = SupportedLanguage::from_path(path).ok_or_else(|| {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            GraphError::UnsupportedLanguage(ext)
        })?;
        self.analyzer(language).await
    }

    pub async fn analyzer(&self, language: SupportedLanguage) -> Result<Arc<LanguageAnalyzer>> {
        let slot: AnalyzerSlot = Arc::clone(
            self.analyzers
                .entry(language)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );
        let analyzer = slot
            .get_or_try_init(|| async { self.bind(language).await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(analyzer))
    }

    /// Languages with a bound analyzer.
    pub fn bound_languages(&self) -> Vec<SupportedLanguage> {
        let mut bound: Vec<SupportedLanguage> = self
            .analyzers
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| *entry.key())
            .collect();
        bound.sort_by_key(|l| l.name());
        bound
    }

    async fn bind(&self, language: SupportedLanguage) -> Result<LanguageAnalyzer> {
        self.factory
            .init(self.config.engine_core_path.as_deref())
            .await?;
        let engine_name = language.engine_name();
        let asset = self.config.engine_asset(engine_name);
        let engine = self.factory.get_parser(engine_name, asset.as_deref()).await?;
        debug!(language = %language, engine = engine_name, "bound language analyzer");

        Ok(match language.family() {
            LanguageFamily::TsLike => LanguageAnalyzer::TsLike {
                language,
                engine,
                parser: if language.is_container() {
                    TsImportParser::for_container()
                } else {
                    TsImportParser::new()
                },
                resolver: Arc::clone(&self.ts_resolver),
            },
            LanguageFamily::Python => LanguageAnalyzer::Python {
                parser: PythonImportParser::new(Arc::clone(&engine)),
                engine,
                resolver: Arc::clone(&self.python_resolver),
            },
            LanguageFamily::Rust => LanguageAnalyzer::Rust {
                parser: RustImportParser::new(Arc::clone(&engine)),
                engine,
                resolver: Arc::clone(&self.rust_resolver),
            },
        })
    }
}
