//! # graphit
//!
//! Live dependency and symbol graph for multi-language projects.
//!
//! graphit crawls a project from one or more root files, resolving the
//! imports of TypeScript/JavaScript (including Vue and Svelte script blocks),
//! Python and Rust sources into a file graph, and extracts per-file symbols
//! with the calls between them. A reverse index answers "who uses this
//! symbol" without scanning the project.
//!
//! ## Key Features
//!
//! - **Cycle-safe crawling**: bounded concurrency, depth limits, per-file errors
//! - **Symbol graph**: functions, classes, methods and the calls between them
//! - **Reverse index**: constant-time caller lookup with staleness tracking
//! - **Persistent**: the index round-trips through a compact binary file
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graphit::{ProjectConfig, ProjectSession};
//! use std::path::Path;
//!
//! # async fn demo() -> graphit::Result<()> {
//! let session = ProjectSession::new(ProjectConfig::for_root("."));
//!
//! let crawl = session.crawl(Path::new("src/main.ts")).await;
//! println!("{} files, {} cycles", crawl.nodes.len(), crawl.cycles.len());
//!
//! session.build_full_index().await?;
//! let callers = session.get_callers("src/util.ts:format");
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod index;
pub mod parser;
pub mod path;
pub mod resolver;
pub mod session;
pub mod spider;
pub mod symbols;

// Re-exports for convenience
pub use error::{ErrorKind, GraphError, NodeError, Result};

pub use analyzer::{LanguageAnalyzer, LanguageService};
pub use config::ProjectConfig;
pub use engine::{EngineHandle, EngineLoader, ParserEngineFactory};
pub use graph::{DependencyGraph, GraphEdge};
pub use index::{FileStamp, ReverseIndex};
pub use parser::{DependencyReference, ParseReport, ReferenceKind, SupportedLanguage};
pub use path::normalize_path;
pub use session::{IndexSummary, ProjectSession, SymbolGraph, UnusedDependency};
pub use spider::{CrawlOptions, CrawlResult, ExternalReference, Spider};
pub use symbols::{
    analyze_file_content, FileAnalysis, SymbolCategory, SymbolDependency, SymbolInfo, SymbolKind,
};
