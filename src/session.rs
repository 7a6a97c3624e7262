//! Project session: the registry that owns every long-lived piece of state
//! for one project and exposes the host-facing operations.
//!
//! - Engine factory and language service are created here and injected
//!   into everything else.
//! - Symbol analyses are cached per file stamp; the reverse index is
//!   updated one source file at a time.

use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::analyzer::{LanguageAnalyzer, LanguageService};
use crate::config::ProjectConfig;
use crate::engine::ParserEngineFactory;
use crate::error::{ErrorKind, GraphError, NodeError, Result};
use crate::index::{FileStamp, ReverseIndex};
use crate::parser::{ReferenceKind, SupportedLanguage};
use crate::path::{is_within, normalize_path};
use crate::spider::{CrawlOptions, CrawlResult, FileReader, Spider, StampedCache};
use crate::symbols::{FileAnalysis, SymbolDependency, SymbolInfo};

/// Where the CLI keeps its state, relative to the project root.
pub const STATE_DIR: &str = ".graphit";

/// Symbols of one file and everything they depend on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolGraph {
    pub file: String,
    pub symbols: Vec<SymbolInfo>,
    /// Same-file dependencies first, then dependencies on other files.
    pub dependencies: Vec<SymbolDependency>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSummary {
    /// Supported source files found under the project root.
    pub files: usize,
    pub indexed: usize,
    pub up_to_date: usize,
    /// Slices dropped because their file no longer exists.
    pub removed: usize,
    pub dependencies: usize,
    pub errors: BTreeMap<String, NodeError>,
}

/// An import none of whose names are used by the file's symbols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnusedDependency {
    pub module_path: String,
    pub line: usize,
    /// Resolved file, when the specifier maps to one.
    pub target: Option<String>,
}

struct LoadedFile {
    path: PathBuf,
    analyzer: Arc<LanguageAnalyzer>,
    stamp: FileStamp,
    content: String,
}

pub struct ProjectSession {
    config: Arc<ProjectConfig>,
    factory: Arc<ParserEngineFactory>,
    languages: Arc<LanguageService>,
    spider: Spider,
    reader: FileReader,
    symbols: StampedCache<FileAnalysis>,
    index: RwLock<ReverseIndex>,
}

impl ProjectSession {
    /// Session using the compiled-in grammars.
    pub fn new(config: ProjectConfig) -> Self {
        Self::with_factory(config, Arc::new(ParserEngineFactory::builtin()))
    }

    pub fn with_factory(config: ProjectConfig, factory: Arc<ParserEngineFactory>) -> Self {
        let config = Arc::new(config).anchored();
        let languages = Arc::new(LanguageService::new(
            Arc::clone(&config),
            Arc::clone(&factory),
        ));
        Self {
            spider: Spider::new(Arc::clone(&config), Arc::clone(&languages)),
            reader: FileReader::from_config(&config),
            symbols: StampedCache::new(config.symbol_cache_max_entries),
            index: RwLock::new(ReverseIndex::new()),
            config,
            factory,
            languages,
        }
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn factory(&self) -> &Arc<ParserEngineFactory> {
        &self.factory
    }

    pub fn languages(&self) -> &Arc<LanguageService> {
        &self.languages
    }

    pub fn spider(&self) -> &Spider {
        &self.spider
    }

    /// Default location of the persisted index.
    pub fn default_index_path(&self) -> PathBuf {
        self.config.project_root.join(STATE_DIR).join("index.bin")
    }

    // ---- file graph ----

    pub async fn crawl(&self, root: &Path) -> CrawlResult {
        self.spider
            .crawl(root, &CrawlOptions::from_config(&self.config))
            .await
    }

    pub async fn crawl_with(&self, roots: &[PathBuf], options: &CrawlOptions) -> CrawlResult {
        self.spider.crawl_many(roots, options).await
    }

    // ---- symbols ----

    /// Symbol analysis of `file`, cached by stamp.
    pub async fn analyze(&self, file: &Path) -> Result<Arc<FileAnalysis>> {
        let (_, _, analysis) = self.load_analysis(file).await?;
        Ok(analysis)
    }

    pub async fn get_symbol_graph(&self, file: &Path) -> Result<SymbolGraph> {
        let path = self.absolute(file);
        let (analyzer, _, analysis) = self.load_analysis(&path).await?;
        let dependencies = self.link(&path, &analyzer, &analysis).await;
        Ok(SymbolGraph {
            file: normalize_path(&path),
            symbols: analysis.symbols.clone(),
            dependencies,
        })
    }

    /// Everything that depends on `symbol_name` declared in `file`.
    ///
    /// The file's own slice is refreshed first; dependents in other files
    /// come from the index as last built.
    pub async fn get_symbol_dependents(
        &self,
        file: &Path,
        symbol_name: &str,
    ) -> Result<Vec<SymbolDependency>> {
        let path = self.absolute(file);
        let key = normalize_path(&path);
        let stamp = self.reader.stat(&path).await?;
        if self.index_read().is_file_stale(&key, stamp) {
            self.index_file(&path).await?;
        }
        let analysis = self.analyze(&path).await?;
        let Some(symbol) = analysis.find_by_name(symbol_name) else {
            debug!(file = %key, symbol = symbol_name, "no such symbol");
            return Ok(Vec::new());
        };
        Ok(self.get_callers(&symbol.id))
    }

    // ---- reverse index ----

    pub fn get_callers(&self, symbol_id: &str) -> Vec<SymbolDependency> {
        self.index_read().get_callers(symbol_id)
    }

    pub fn get_runtime_callers(&self, symbol_id: &str) -> Vec<SymbolDependency> {
        self.index_read().get_runtime_callers(symbol_id)
    }

    pub fn get_type_only_callers(&self, symbol_id: &str) -> Vec<SymbolDependency> {
        self.index_read().get_type_only_callers(symbol_id)
    }

    pub async fn is_file_stale(&self, file: &Path) -> Result<bool> {
        let path = self.absolute(file);
        let stamp = self.reader.stat(&path).await?;
        Ok(self.index_read().is_file_stale(&normalize_path(&path), stamp))
    }

    pub fn indexed_files(&self) -> Vec<String> {
        self.index_read().indexed_files()
    }

    /// Index every supported file under the project root whose slice is
    /// missing or stale. Files are read concurrently and analyzed on a
    /// thread pool, both bounded by `indexing_concurrency`.
    pub async fn build_full_index(&self) -> Result<IndexSummary> {
        let root = self.config.project_root.clone();
        let exclude = self.config.exclude_node_modules;
        let files = tokio::task::spawn_blocking(move || discover(&root, exclude))
            .await
            .map_err(|e| GraphError::Io(std::io::Error::other(e)))?;
        info!(files = files.len(), "building symbol index");

        let mut summary = IndexSummary {
            files: files.len(),
            ..IndexSummary::default()
        };

        let present: HashSet<String> = files.iter().map(|f| normalize_path(f)).collect();
        {
            let mut index = self.index_write();
            for gone in index.indexed_files() {
                if !present.contains(&gone) && index.remove_dependencies_from_source(&gone) {
                    summary.removed += 1;
                }
            }
        }

        let known: Arc<HashMap<String, FileStamp>> = {
            let index = self.index_read();
            Arc::new(
                index
                    .indexed_files()
                    .into_iter()
                    .filter_map(|f| index.file_stamp(&f).map(|stamp| (f, stamp)))
                    .collect(),
            )
        };

        let limit = self.config.indexing_concurrency.max(1);
        let permits = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();
        for path in files {
            let languages = Arc::clone(&self.languages);
            let reader = self.reader;
            let permits = Arc::clone(&permits);
            let known = Arc::clone(&known);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let key = normalize_path(&path);
                let loaded = load_if_stale(&languages, &reader, path, known.get(&key).copied()).await;
                (key, loaded)
            });
        }

        let mut pending = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (key, loaded) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "indexing task aborted");
                    continue;
                }
            };
            match loaded {
                Ok(Some(file)) => pending.push(file),
                Ok(None) => summary.up_to_date += 1,
                Err(err) => {
                    warn!(file = %key, error = %err, "file not indexed");
                    summary.errors.insert(key, NodeError::from(&err));
                }
            }
        }
        pending.sort_by(|a, b| a.path.cmp(&b.path));

        let analyzed = tokio::task::spawn_blocking(move || analyze_all(pending, limit))
            .await
            .map_err(|e| GraphError::Io(std::io::Error::other(e)))??;

        for (path, _, stamp, analysis) in &analyzed {
            self.symbols
                .insert(normalize_path(path), *stamp, Arc::clone(analysis));
        }
        for (path, analyzer, stamp, analysis) in analyzed {
            let dependencies = self.link(&path, &analyzer, &analysis).await;
            self.index_write()
                .add_dependencies(&normalize_path(&path), dependencies, stamp);
            summary.indexed += 1;
        }

        summary.dependencies = self.index_read().len();
        info!(
            indexed = summary.indexed,
            up_to_date = summary.up_to_date,
            removed = summary.removed,
            errors = summary.errors.len(),
            "symbol index built"
        );
        Ok(summary)
    }

    /// Re-analyze one file after it changed on disk, or drop it from the
    /// index when it was deleted.
    pub async fn file_changed(&self, file: &Path) -> Result<()> {
        let path = self.absolute(file);
        let key = normalize_path(&path);
        self.spider.invalidate(&path);
        self.symbols.remove(&key);
        match self.reader.stat(&path).await {
            Err(err) if err.kind() == ErrorKind::NotFound => {
                self.index_write().remove_dependencies_from_source(&key);
                debug!(file = %key, "removed deleted file from index");
                Ok(())
            }
            Err(err) => Err(err),
            Ok(_) => self.index_file(&path).await.map(|_| ()),
        }
    }

    pub fn save_index(&self, path: &Path) -> Result<()> {
        self.index_read().save(path)
    }

    pub fn load_index(&self, path: &Path) -> Result<()> {
        let loaded = ReverseIndex::load(path)?;
        *self.index_write() = loaded;
        Ok(())
    }

    /// Imports of `file` that none of its symbols use.
    pub async fn unused_dependencies(&self, file: &Path) -> Result<Vec<UnusedDependency>> {
        let path = self.absolute(file);
        let (analyzer, stamp, analysis) = self.load_analysis(&path).await?;
        let content = self.reader.read(&path, stamp).await?;
        let report = analyzer.parse_imports(&content);

        let dependencies = self.link(&path, &analyzer, &analysis).await;
        let used_files: HashSet<&str> = dependencies
            .iter()
            .map(|d| d.target_file_path.as_str())
            .collect();
        let used_specifiers: HashSet<&str> = analysis
            .external_calls
            .iter()
            .map(|c| c.module_specifier.as_str())
            .collect();

        let mut unused = Vec::new();
        for reference in report.references {
            if matches!(reference.kind, ReferenceKind::Export | ReferenceKind::Dynamic) {
                continue;
            }
            if used_specifiers.contains(reference.module_path.as_str()) {
                continue;
            }
            let target = analyzer
                .resolve_path(&path, &reference.module_path)
                .await
                .map(|t| normalize_path(&t));
            if target.as_deref().is_some_and(|t| used_files.contains(t)) {
                continue;
            }
            unused.push(UnusedDependency {
                module_path: reference.module_path,
                line: reference.line,
                target,
            });
        }
        Ok(unused)
    }

    // ---- internals ----

    async fn load_analysis(
        &self,
        file: &Path,
    ) -> Result<(Arc<LanguageAnalyzer>, FileStamp, Arc<FileAnalysis>)> {
        let path = self.absolute(file);
        let key = normalize_path(&path);
        let (analyzer, stamp) = load_file(&self.languages, &self.reader, &path).await?;
        if let Some(hit) = self.symbols.get(&key, stamp) {
            return Ok((analyzer, stamp, hit));
        }
        let content = self.reader.read(&path, stamp).await?;
        let analysis = Arc::new(analyzer.analyze_symbols(&path, &content));
        self.symbols.insert(key, stamp, Arc::clone(&analysis));
        Ok((analyzer, stamp, analysis))
    }

    async fn index_file(&self, path: &Path) -> Result<usize> {
        let (analyzer, stamp, analysis) = self.load_analysis(path).await?;
        let dependencies = self.link(path, &analyzer, &analysis).await;
        let count = dependencies.len();
        self.index_write()
            .add_dependencies(&normalize_path(path), dependencies, stamp);
        Ok(count)
    }

    /// Same-file dependencies plus cross-file ones: each unresolved call is
    /// resolved through the file's resolver and kept only when the target
    /// file declares that symbol.
    async fn link(
        &self,
        file: &Path,
        analyzer: &LanguageAnalyzer,
        analysis: &FileAnalysis,
    ) -> Vec<SymbolDependency> {
        let mut dependencies = analysis.dependencies.clone();
        let mut seen: HashSet<(String, String, bool)> = dependencies
            .iter()
            .map(|d| {
                (
                    d.source_symbol_id.clone(),
                    d.target_symbol_id.clone(),
                    d.is_type_only,
                )
            })
            .collect();
        let mut modules: HashMap<String, Option<(String, Arc<FileAnalysis>)>> = HashMap::new();

        for call in &analysis.external_calls {
            if !modules.contains_key(&call.module_specifier) {
                let target = match analyzer.resolve_path(file, &call.module_specifier).await {
                    Some(target) if is_within(&target, &self.config.project_root) => {
                        match self.analyze(&target).await {
                            Ok(found) => Some((normalize_path(&target), found)),
                            Err(err) => {
                                debug!(module = %call.module_specifier, error = %err, "target not analyzable");
                                None
                            }
                        }
                    }
                    _ => None,
                };
                modules.insert(call.module_specifier.clone(), target);
            }
            let Some(Some((target_file, target))) = modules.get(&call.module_specifier) else {
                continue;
            };
            let Some(symbol) = target.find_by_name(&call.symbol_name) else {
                continue;
            };
            let key = (
                call.source_symbol_id.clone(),
                symbol.id.clone(),
                call.is_type_only,
            );
            if seen.insert(key) {
                dependencies.push(SymbolDependency {
                    source_symbol_id: call.source_symbol_id.clone(),
                    target_symbol_id: symbol.id.clone(),
                    target_file_path: target_file.clone(),
                    is_type_only: call.is_type_only,
                });
            }
        }
        dependencies
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.project_root.join(path)
        }
    }

    fn index_read(&self) -> RwLockReadGuard<'_, ReverseIndex> {
        self.index.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn index_write(&self) -> RwLockWriteGuard<'_, ReverseIndex> {
        self.index.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn load_file(
    languages: &LanguageService,
    reader: &FileReader,
    path: &Path,
) -> Result<(Arc<LanguageAnalyzer>, FileStamp)> {
    let analyzer = languages.analyzer_for(path).await?;
    let stamp = reader.stat(path).await?;
    Ok((analyzer, stamp))
}

/// `None` when the file still matches its indexed stamp.
async fn load_if_stale(
    languages: &LanguageService,
    reader: &FileReader,
    path: PathBuf,
    indexed: Option<FileStamp>,
) -> Result<Option<LoadedFile>> {
    let (analyzer, stamp) = load_file(languages, reader, &path).await?;
    if indexed == Some(stamp) {
        return Ok(None);
    }
    let content = reader.read(&path, stamp).await?;
    Ok(Some(LoadedFile {
        path,
        analyzer,
        stamp,
        content,
    }))
}

/// Supported source files under `root`, honoring ignore files.
fn discover(root: &Path, exclude_node_modules: bool) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .require_git(false)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter(|entry| SupportedLanguage::from_path(entry.path()).is_some())
        .filter(|entry| {
            !(exclude_node_modules
                && entry
                    .path()
                    .components()
                    .any(|c| c.as_os_str() == "node_modules"))
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

type Analyzed = (PathBuf, Arc<LanguageAnalyzer>, FileStamp, Arc<FileAnalysis>);

fn analyze_all(pending: Vec<LoadedFile>, threads: usize) -> Result<Vec<Analyzed>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| GraphError::Config(e.to_string()))?;
    Ok(pool.install(|| {
        pending
            .into_par_iter()
            .map(|file| {
                let analysis = file.analyzer.analyze_symbols(&file.path, &file.content);
                (file.path, file.analyzer, file.stamp, Arc::new(analysis))
            })
            .collect()
    }))
}
