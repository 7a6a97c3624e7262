//! Graph crawler.
//!
//! Walks a project outward from one or more root files. Each level of the
//! walk is processed concurrently, bounded by a semaphore; levels are merged
//! in path order, so the resulting graph does not depend on which task
//! finished first. A file that fails is recorded against its node and the
//! rest of the walk continues.

mod cache;
mod reader;

pub use cache::StampedCache;
pub use reader::FileReader;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::analyzer::LanguageService;
use crate::config::ProjectConfig;
use crate::error::{NodeError, Result};
use crate::graph::{DependencyGraph, GraphEdge};
use crate::parser::ReferenceKind;
use crate::path::{is_within, normalize_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlOptions {
    /// Files discovered at this depth become nodes but are not expanded.
    pub max_depth: usize,
    /// Files parsed and resolved in flight.
    pub concurrency: usize,
}

impl CrawlOptions {
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            concurrency: config.crawl_concurrency,
        }
    }

    pub fn with_max_depth(self, max_depth: usize) -> Self {
        Self { max_depth, ..self }
    }
}

/// A specifier that did not resolve to a followed project file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalReference {
    pub source: String,
    pub module_path: String,
    pub line: usize,
    pub kind: ReferenceKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlResult {
    pub roots: Vec<String>,
    /// Sorted; the roots plus every edge endpoint.
    pub nodes: Vec<String>,
    /// Sorted by (source, target).
    pub edges: Vec<GraphEdge>,
    pub node_errors: BTreeMap<String, NodeError>,
    pub external: Vec<ExternalReference>,
    /// Strongly connected components with more than one file.
    pub cycles: Vec<Vec<String>>,
    /// Files whose imports were only partially extracted.
    pub degraded: Vec<String>,
}

impl CrawlResult {
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Rebuild the file graph for queries.
    pub fn graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for node in &self.nodes {
            graph.add_file(node);
        }
        for edge in &self.edges {
            graph.add_edge(&edge.source, &edge.target);
        }
        graph
    }
}

/// Per-file crawl output, cached by path and stamp.
#[derive(Debug, Clone, Default)]
pub struct FileOutcome {
    pub targets: Vec<String>,
    pub external: Vec<ExternalReference>,
    pub degraded: bool,
}

#[derive(Clone)]
pub struct Spider {
    config: Arc<ProjectConfig>,
    languages: Arc<LanguageService>,
    cache: Arc<StampedCache<FileOutcome>>,
    reader: FileReader,
}

impl Spider {
    pub fn new(config: Arc<ProjectConfig>, languages: Arc<LanguageService>) -> Self {
        let config = config.anchored();
        Self {
            cache: Arc::new(StampedCache::new(config.cache_max_entries)),
            reader: FileReader::from_config(&config),
            config,
            languages,
        }
    }

    pub async fn crawl(&self, root: &Path, options: &CrawlOptions) -> CrawlResult {
        self.crawl_many(&[root.to_path_buf()], options).await
    }

    pub async fn crawl_many(&self, roots: &[PathBuf], options: &CrawlOptions) -> CrawlResult {
        let permits = Arc::new(Semaphore::new(options.concurrency.max(1)));
        let mut graph = DependencyGraph::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut node_errors = BTreeMap::new();
        let mut external = Vec::new();
        let mut degraded = BTreeSet::new();

        let mut root_keys = Vec::new();
        let mut frontier = Vec::new();
        for root in roots {
            let key = normalize_path(&self.absolute(root));
            graph.add_file(&key);
            if seen.insert(key.clone()) {
                root_keys.push(key.clone());
                frontier.push(key);
            }
        }
        info!(roots = root_keys.len(), max_depth = options.max_depth, "crawl started");

        let mut depth = 0;
        while !frontier.is_empty() && depth < options.max_depth {
            let mut tasks = JoinSet::new();
            for file in frontier.drain(..) {
                let spider = self.clone();
                let permits = Arc::clone(&permits);
                tasks.spawn(async move {
                    let _permit = permits.acquire_owned().await.ok();
                    let outcome = spider.visit(&file).await;
                    (file, outcome)
                });
            }

            let mut finished = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(pair) => finished.push(pair),
                    Err(e) => warn!(error = %e, "crawl task aborted"),
                }
            }
            finished.sort_by(|a, b| a.0.cmp(&b.0));

            let mut next = Vec::new();
            for (file, outcome) in finished {
                match outcome {
                    Err(err) => {
                        warn!(file = %file, error = %err, "file skipped");
                        node_errors.insert(file, NodeError::from(&err));
                    }
                    Ok(outcome) => {
                        if outcome.degraded {
                            degraded.insert(file.clone());
                        }
                        external.extend(outcome.external.iter().cloned());
                        for target in &outcome.targets {
                            graph.add_edge(&file, target);
                            if seen.insert(target.clone()) {
                                next.push(target.clone());
                            }
                        }
                    }
                }
            }
            frontier = next;
            depth += 1;
        }

        external.sort();
        let result = CrawlResult {
            roots: root_keys,
            nodes: graph.nodes(),
            edges: graph.edges(),
            node_errors,
            external,
            cycles: graph.find_cycles(),
            degraded: degraded.into_iter().collect(),
        };
        info!(
            nodes = result.nodes.len(),
            edges = result.edges.len(),
            errors = result.node_errors.len(),
            cycles = result.cycles.len(),
            "crawl finished"
        );
        result
    }

    /// Drop the cached result for `path`. Returns false when nothing was cached.
    pub fn invalidate(&self, path: &Path) -> bool {
        self.cache.remove(&normalize_path(&self.absolute(path)))
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cached_files(&self) -> usize {
        self.cache.len()
    }

    pub fn reader(&self) -> &FileReader {
        &self.reader
    }

    async fn visit(&self, file: &str) -> Result<Arc<FileOutcome>> {
        let path = PathBuf::from(file);
        let analyzer = self.languages.analyzer_for(&path).await?;
        let stamp = self.reader.stat(&path).await?;
        if let Some(hit) = self.cache.get(file, stamp) {
            debug!(file = %file, "cache hit");
            return Ok(hit);
        }

        let content = self.reader.read(&path, stamp).await?;
        let report = analyzer.parse_imports(&content);
        let mut outcome = FileOutcome {
            degraded: report.degraded,
            ..FileOutcome::default()
        };
        for reference in report.references {
            match analyzer.resolve_path(&path, &reference.module_path).await {
                Some(target) if self.follows(&target) => {
                    outcome.targets.push(normalize_path(&target));
                }
                _ => outcome.external.push(ExternalReference {
                    source: file.to_string(),
                    module_path: reference.module_path,
                    line: reference.line,
                    kind: reference.kind,
                }),
            }
        }
        debug!(
            file = %file,
            targets = outcome.targets.len(),
            external = outcome.external.len(),
            "visited"
        );

        let outcome = Arc::new(outcome);
        self.cache.insert(file.to_string(), stamp, Arc::clone(&outcome));
        Ok(outcome)
    }

    fn follows(&self, target: &Path) -> bool {
        if !is_within(target, &self.config.project_root) {
            return false;
        }
        !(self.config.exclude_node_modules
            && target.components().any(|c| c.as_os_str() == "node_modules"))
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.project_root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ParserEngineFactory;
    use crate::error::ErrorKind;
    use std::fs;

    fn spider(root: &Path, tweak: impl FnOnce(&mut ProjectConfig)) -> Spider {
        let mut config = ProjectConfig::for_root(root);
        tweak(&mut config);
        let config = Arc::new(config);
        let languages = Arc::new(LanguageService::new(
            Arc::clone(&config),
            Arc::new(ParserEngineFactory::builtin()),
        ));
        Spider::new(config, languages)
    }

    fn key(root: &Path, name: &str) -> String {
        normalize_path(&root.join(name))
    }

    fn write(root: &Path, name: &str, content: &str) {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_chain_with_externals() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "main.ts", "import { a } from './a';\nimport React from 'react';\nimport fs from 'fs';\n");
        write(root, "a.ts", "export * from './lib/b';\n");
        write(root, "lib/b.ts", "export const b = 1;\n");

        let spider = spider(root, |_| {});
        let options = CrawlOptions::from_config(&ProjectConfig::default());
        let result = spider.crawl(&root.join("main.ts"), &options).await;

        assert_eq!(result.nodes.len(), 3);
        assert_eq!(result.edges.len(), 2);
        assert!(!result.has_cycles());
        assert!(result.node_errors.is_empty());
        let external: Vec<(&str, usize)> = result
            .external
            .iter()
            .map(|e| (e.module_path.as_str(), e.line))
            .collect();
        assert_eq!(external, vec![("fs", 3), ("react", 2)]);
        assert!(!result.nodes.iter().any(|n| n.contains("react")));
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "a.py", "import b\n");
        write(root, "b.py", "import c\n");
        write(root, "c.py", "import d\n");
        write(root, "d.py", "");

        let spider = spider(root, |_| {});
        let options = CrawlOptions::from_config(&ProjectConfig::default()).with_max_depth(2);
        let result = spider.crawl(&root.join("a.py"), &options).await;
        assert_eq!(
            result.nodes,
            vec![key(root, "a.py"), key(root, "b.py"), key(root, "c.py")]
        );

        let none = spider.crawl(&root.join("a.py"), &options.with_max_depth(0)).await;
        assert_eq!(none.nodes, vec![key(root, "a.py")]);
        assert!(none.edges.is_empty());
    }

    #[tokio::test]
    async fn test_failures_stay_on_their_node() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "main.ts", "import './big';\nimport './ok';\n");
        write(root, "big.ts", &"// padding\n".repeat(100));
        write(root, "ok.ts", "import './leaf';\n");
        write(root, "leaf.ts", "");

        let spider = spider(root, |c| {
            c.max_file_size = 200;
            c.stream_threshold = 100;
        });
        let options = CrawlOptions::from_config(&ProjectConfig::default());
        let result = spider.crawl(&root.join("main.ts"), &options).await;

        assert_eq!(result.nodes.len(), 4);
        assert_eq!(result.node_errors.len(), 1);
        assert_eq!(result.node_errors[&key(root, "big.ts")].kind, ErrorKind::TooLarge);
        assert!(result.nodes.contains(&key(root, "leaf.ts")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_read_is_a_node_error() {
        use super::reader::tests::{mkfifo, release_fifo};

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "main.py", "import util\n");
        write(root, "util.py", "");
        mkfifo(&root.join("stuck.py"));

        let spider = spider(root, |c| c.read_timeout_ms = 50);
        let options = CrawlOptions::from_config(&ProjectConfig::default());
        let result = spider
            .crawl_many(&[root.join("stuck.py"), root.join("main.py")], &options)
            .await;
        release_fifo(&root.join("stuck.py"));

        assert_eq!(result.node_errors.len(), 1);
        assert_eq!(result.node_errors[&key(root, "stuck.py")].kind, ErrorKind::Timeout);
        assert!(result.nodes.contains(&key(root, "stuck.py")));
        assert_eq!(result.edges.len(), 1);
        assert_eq!(result.edges[0].target, key(root, "util.py"));
    }

    #[tokio::test]
    async fn test_unsupported_and_missing_roots() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "notes.md", "# notes\n");
        write(root, "a.rs", "mod b;\n");
        write(root, "b.rs", "");

        let spider = spider(root, |_| {});
        let options = CrawlOptions::from_config(&ProjectConfig::default());
        let result = spider
            .crawl_many(
                &[root.join("notes.md"), PathBuf::from("a.rs"), root.join("gone.py")],
                &options,
            )
            .await;
        assert_eq!(result.roots.len(), 3);
        assert_eq!(
            result.node_errors[&key(root, "notes.md")].kind,
            ErrorKind::UnsupportedLanguage
        );
        assert_eq!(result.node_errors[&key(root, "gone.py")].kind, ErrorKind::NotFound);
        assert!(result.nodes.contains(&key(root, "b.rs")));
    }

    #[tokio::test]
    async fn test_same_graph_at_any_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let mut main = String::new();
        for i in 0..12 {
            main.push_str(&format!("import './m{i}';\n"));
            write(root, &format!("m{i}.ts"), &format!("import './m{}';\n", (i + 5) % 12));
        }
        write(root, "main.ts", &main);

        let serial = spider(root, |_| {});
        let parallel = spider(root, |_| {});
        let base = CrawlOptions::from_config(&ProjectConfig::default());
        let one = serial
            .crawl(&root.join("main.ts"), &CrawlOptions { concurrency: 1, ..base })
            .await;
        let many = parallel
            .crawl(&root.join("main.ts"), &CrawlOptions { concurrency: 8, ..base })
            .await;
        assert_eq!(one.nodes, many.nodes);
        assert_eq!(one.edges, many.edges);
        assert_eq!(one.cycles, many.cycles);
        assert_eq!(one.edges.len(), 24);
    }

    #[tokio::test]
    async fn test_cache_follows_file_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "a.ts", "import './b';\n");
        write(root, "b.ts", "");
        write(root, "c.ts", "");

        let spider = spider(root, |_| {});
        let options = CrawlOptions::from_config(&ProjectConfig::default());
        let first = spider.crawl(&root.join("a.ts"), &options).await;
        assert_eq!(first.edges.len(), 1);
        assert_eq!(spider.cached_files(), 2);

        write(root, "a.ts", "import './b';\nimport './c';\n");
        let second = spider.crawl(&root.join("a.ts"), &options).await;
        assert_eq!(second.edges.len(), 2);

        assert!(spider.invalidate(&root.join("c.ts")));
        assert!(!spider.invalidate(&root.join("c.ts")));
    }

    #[tokio::test]
    async fn test_relative_root_keeps_outside_files_external() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("app");
        write(&root, "main.ts", "import { x } from '../other/x';\n");
        write(dir.path(), "other/x.ts", "export const x = 1;\n");

        let relative = spider(Path::new("."), |_| {});
        assert!(relative.config.project_root.is_absolute());

        let spider = spider(&root, |_| {});
        let options = CrawlOptions::from_config(&ProjectConfig::default());
        let result = spider.crawl(&root.join("main.ts"), &options).await;
        assert_eq!(result.nodes, vec![key(&root, "main.ts")]);
        assert_eq!(result.external.len(), 1);
        assert_eq!(result.external[0].module_path, "../other/x");
    }

    #[tokio::test]
    async fn test_node_modules_not_followed_when_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "a.js", "require('./node_modules/pkg/index.js');\n");
        write(root, "node_modules/pkg/index.js", "");

        let excluded = spider(root, |_| {});
        let options = CrawlOptions::from_config(&ProjectConfig::default());
        let result = excluded.crawl(&root.join("a.js"), &options).await;
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.external.len(), 1);

        let included = spider(root, |c| c.exclude_node_modules = false);
        let result = included.crawl(&root.join("a.js"), &options).await;
        assert_eq!(result.nodes.len(), 2);
    }
}
