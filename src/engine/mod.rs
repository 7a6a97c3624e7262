//! Parser-engine factory.
//!
//! Lazily brings up the syntax-engine runtime and one engine handle per
//! language. Concurrent first requests for the same language share a single
//! load; every caller receives the same `Arc<EngineHandle>`.

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use tree_sitter::{Language, Parser, Tree};

use crate::error::{GraphError, Result};

/// A loaded syntax engine for one language.
pub struct EngineHandle {
    name: String,
    language: Language,
    asset: Option<PathBuf>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("name", &self.name)
            .field("asset", &self.asset)
            .finish()
    }
}

impl EngineHandle {
    pub fn new(name: impl Into<String>, language: Language, asset: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            language,
            asset,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    pub fn asset(&self) -> Option<&Path> {
        self.asset.as_deref()
    }

    /// Parse `source` into a syntax tree. Parsers are cheap and not `Sync`,
    /// so one is created per call.
    pub fn parse(&self, source: &str) -> Option<Tree> {
        let mut parser = Parser::new();
        parser.set_language(&self.language).ok()?;
        parser.parse(source, None)
    }
}

/// Brings up the engine runtime and individual language engines.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn init_runtime(&self, core_path: Option<&Path>) -> Result<()>;

    async fn load_language(&self, name: &str, asset: Option<&Path>) -> Result<Language>;
}

/// Loader for the grammars compiled into this crate.
///
/// Asset paths are optional; when given they must exist.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinGrammars;

#[async_trait]
impl EngineLoader for BuiltinGrammars {
    async fn init_runtime(&self, core_path: Option<&Path>) -> Result<()> {
        if let Some(path) = core_path {
            ensure_asset("core", path).await?;
        }
        Ok(())
    }

    async fn load_language(&self, name: &str, asset: Option<&Path>) -> Result<Language> {
        if let Some(path) = asset {
            ensure_asset(name, path).await?;
        }
        let language: Language = match name {
            "rust" => tree_sitter_rust::LANGUAGE.into(),
            "python" => tree_sitter_python::LANGUAGE.into(),
            "javascript" => tree_sitter_javascript::LANGUAGE.into(),
            "typescript" => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            "tsx" => tree_sitter_typescript::LANGUAGE_TSX.into(),
            other => {
                return Err(GraphError::EngineInit {
                    language: other.to_string(),
                    reason: "no grammar available".to_string(),
                })
            }
        };
        Ok(language)
    }
}

async fn ensure_asset(language: &str, path: &Path) -> Result<()> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(GraphError::EngineInit {
            language: language.to_string(),
            reason: format!("asset not found: {}", path.display()),
        }),
        Err(e) => Err(GraphError::EngineInit {
            language: language.to_string(),
            reason: e.to_string(),
        }),
    }
}

type EngineSlot = Arc<OnceCell<Arc<EngineHandle>>>;

/// Caches the engine runtime and one handle per language.
pub struct ParserEngineFactory {
    loader: Arc<dyn EngineLoader>,
    runtime: OnceCell<()>,
    engines: DashMap<String, EngineSlot>,
}

impl ParserEngineFactory {
    pub fn new(loader: Arc<dyn EngineLoader>) -> Self {
        Self {
            loader,
            runtime: OnceCell::new(),
            engines: DashMap::new(),
        }
    }

    /// Factory over the compiled-in grammars.
    pub fn builtin() -> Self {
        Self::new(Arc::new(BuiltinGrammars))
    }

    /// Initialize the engine runtime. Concurrent callers share one
    /// initialization; a failed attempt may be retried.
    pub async fn init(&self, core_path: Option<&Path>) -> Result<()> {
        self.runtime
            .get_or_try_init(|| async {
                info!(core = ?core_path, "initializing engine runtime");
                self.loader.init_runtime(core_path).await
            })
            .await?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.runtime.initialized()
    }

    /// Get the engine for `language`, loading it on first use.
    pub async fn get_parser(
        &self,
        language: &str,
        asset: Option<&Path>,
    ) -> Result<Arc<EngineHandle>> {
        if !self.runtime.initialized() {
            return Err(GraphError::EngineInit {
                language: language.to_string(),
                reason: "engine runtime not initialized".to_string(),
            });
        }

        let slot: EngineSlot = Arc::clone(
            self.engines
                .entry(language.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );

        let handle = slot
            .get_or_try_init(|| async {
                debug!(language, "loading language engine");
                let grammar = self.loader.load_language(language, asset).await?;
                Ok::<_, GraphError>(Arc::new(EngineHandle::new(
                    language,
                    grammar,
                    asset.map(Path::to_path_buf),
                )))
            })
            .await?;
        Ok(Arc::clone(handle))
    }

    /// Languages with a loaded engine.
    pub fn cached_languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .engines
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Drop every cached handle and the runtime state. Test isolation only.
    pub fn reset(&mut self) {
        self.runtime = OnceCell::new();
        self.engines.clear();
    }
}

impl Default for ParserEngineFactory {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingLoader {
        inits: AtomicUsize,
        loads: AtomicUsize,
        fail_first_init: bool,
    }

    #[async_trait]
    impl EngineLoader for CountingLoader {
        async fn init_runtime(&self, _core_path: Option<&Path>) -> Result<()> {
            let n = self.inits.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_first_init && n == 0 {
                return Err(GraphError::EngineInit {
                    language: "core".to_string(),
                    reason: "flaky".to_string(),
                });
            }
            Ok(())
        }

        async fn load_language(&self, name: &str, asset: Option<&Path>) -> Result<Language> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            BuiltinGrammars.load_language(name, asset).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_init_runs_once() {
        let loader = Arc::new(CountingLoader::default());
        let factory = Arc::new(ParserEngineFactory::new(loader.clone()));

        let mut tasks = Vec::new();
        for _ in 0..12 {
            let factory = Arc::clone(&factory);
            tasks.push(tokio::spawn(async move { factory.init(None).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(loader.inits.load(Ordering::SeqCst), 1);
        assert!(factory.is_initialized());
    }

    #[tokio::test]
    async fn test_concurrent_get_parser_shares_one_handle() {
        for callers in [2usize, 7, 20] {
            let loader = Arc::new(CountingLoader::default());
            let factory = Arc::new(ParserEngineFactory::new(loader.clone()));
            factory.init(None).await.unwrap();

            let mut tasks = Vec::new();
            for _ in 0..callers {
                let factory = Arc::clone(&factory);
                tasks.push(tokio::spawn(async move {
                    factory.get_parser("python", None).await
                }));
            }
            let mut handles = Vec::new();
            for task in tasks {
                handles.push(task.await.unwrap().unwrap());
            }

            assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
            assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
        }
    }

    #[tokio::test]
    async fn test_get_parser_requires_init() {
        let factory = ParserEngineFactory::builtin();
        let err = factory.get_parser("rust", None).await.unwrap_err();
        assert!(matches!(err, GraphError::EngineInit { .. }));
    }

    #[tokio::test]
    async fn test_failed_init_can_be_retried() {
        let loader = Arc::new(CountingLoader {
            fail_first_init: true,
            ..Default::default()
        });
        let factory = ParserEngineFactory::new(loader.clone());
        assert!(factory.init(None).await.is_err());
        assert!(!factory.is_initialized());
        factory.init(None).await.unwrap();
        assert_eq!(loader.inits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_language_and_missing_asset() {
        let factory = ParserEngineFactory::builtin();
        factory.init(None).await.unwrap();
        assert!(factory.get_parser("cobol", None).await.is_err());
        let missing = Path::new("/no/such/tree-sitter-rust.wasm");
        assert!(factory.get_parser("rust", Some(missing)).await.is_err());
        // A failed load leaves the slot empty for a later, valid request.
        assert!(factory.get_parser("rust", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let mut factory = ParserEngineFactory::builtin();
        factory.init(None).await.unwrap();
        let first = factory.get_parser("rust", None).await.unwrap();
        assert_eq!(factory.cached_languages(), vec!["rust".to_string()]);

        factory.reset();
        assert!(!factory.is_initialized());
        assert!(factory.cached_languages().is_empty());

        factory.init(None).await.unwrap();
        let second = factory.get_parser("rust", None).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.parse("fn main() {}").is_some());
    }
}
