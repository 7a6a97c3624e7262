//! Project configuration supplied by the host.
//!
//! Loaded from `.graphit/config.toml` by the CLI; hosts embedding the
//! library usually build it in code via [`ProjectConfig::for_root`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{GraphError, Result};

/// Configuration for one project session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Resolution never climbs above this directory.
    pub project_root: PathBuf,
    /// Hard ceiling on crawl depth from each root.
    pub max_depth: usize,
    /// Treat anything under `node_modules` as external.
    pub exclude_node_modules: bool,
    /// Files parsed/resolved in flight during a crawl.
    pub crawl_concurrency: usize,
    /// Files analyzed in flight while building the symbol index.
    pub indexing_concurrency: usize,
    /// Files larger than this are reported as `TooLarge`.
    pub max_file_size: u64,
    /// Files larger than this are read through the streaming path.
    pub stream_threshold: u64,
    pub read_timeout_ms: u64,
    /// Per-file crawl results kept in memory.
    pub cache_max_entries: usize,
    /// Per-file symbol analyses kept in memory.
    pub symbol_cache_max_entries: usize,
    /// Location of the core engine runtime assets, if any.
    pub engine_core_path: Option<PathBuf>,
    /// Directory holding per-language engine assets, if any.
    pub engine_dir: Option<PathBuf>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            max_depth: 50,
            exclude_node_modules: true,
            crawl_concurrency: 8,
            indexing_concurrency: 4,
            max_file_size: 1024 * 1024,
            stream_threshold: 256 * 1024,
            read_timeout_ms: 5_000,
            cache_max_entries: 1_000,
            symbol_cache_max_entries: 256,
            engine_core_path: None,
            engine_dir: None,
        }
    }
}

impl ProjectConfig {
    /// Defaults rooted at `root`.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: root.into(),
            ..Self::default()
        }
    }

    /// The same configuration with `project_root` made absolute against the
    /// current directory, so containment checks compare like with like.
    pub fn anchored(self: Arc<Self>) -> Arc<Self> {
        if self.project_root.is_absolute() {
            return self;
        }
        match std::path::absolute(&self.project_root) {
            Ok(root) => Arc::new(Self {
                project_root: root,
                ..(*self).clone()
            }),
            Err(e) => {
                tracing::warn!(root = %self.project_root.display(), error = %e, "project root left relative");
                self
            }
        }
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| GraphError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.crawl_concurrency == 0 || self.indexing_concurrency == 0 {
            return Err(GraphError::Config(
                "concurrency limits must be at least 1".to_string(),
            ));
        }
        if self.stream_threshold > self.max_file_size {
            tracing::warn!(
                stream_threshold = self.stream_threshold,
                max_file_size = self.max_file_size,
                "stream threshold exceeds the size guard; streaming path is unreachable"
            );
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Asset location for a language engine, when an engine directory is set.
    pub fn engine_asset(&self, language: &str) -> Option<PathBuf> {
        self.engine_dir
            .as_ref()
            .map(|dir| dir.join(format!("tree-sitter-{}.wasm", language)))
    }
}
