//! graphit CLI - dependency and symbol graphs for a project.
//!
//! Usage:
//!   graphit crawl <file>...            # File graph from one or more roots
//!   graphit symbols <file>             # Symbols of a file and what they use
//!   graphit callers <symbol-id>        # Who uses a symbol (from the index)
//!   graphit dependents <file> <name>   # Who uses a symbol declared in a file
//!   graphit unused <file>              # Imports no symbol of the file uses
//!   graphit index                      # Build or refresh the symbol index
//!   graphit stale <file>...            # Which files changed since indexing

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use graphit::session::STATE_DIR;
use graphit::{CrawlOptions, ProjectConfig, ProjectSession};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "graphit")]
#[command(about = "graphit - dependency and symbol graphs for multi-language projects", long_about = None)]
struct Cli {
    /// Project root directory (default: current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the file graph from one or more root files
    Crawl {
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Override the configured maximum depth
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Show the symbols of a file and their dependencies
    Symbols { file: PathBuf },

    /// Show every caller of a symbol id (`<file>:<qualified name>`)
    Callers {
        symbol_id: String,

        /// Only type-level uses
        #[arg(long, conflicts_with = "runtime")]
        types: bool,

        /// Only runtime uses
        #[arg(long)]
        runtime: bool,
    },

    /// Show every user of a symbol declared in a file
    Dependents { file: PathBuf, name: String },

    /// List imports of a file that none of its symbols use
    Unused { file: PathBuf },

    /// Build or refresh the symbol index and save it
    Index,

    /// Report whether files changed since they were indexed
    Stale {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let root = cli.root.canonicalize().unwrap_or(cli.root);
    let state_dir = root.join(STATE_DIR);
    let config_path = state_dir.join("config.toml");
    let mut config = ProjectConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.project_root = root.clone();

    let session = ProjectSession::new(config);
    let index_path = session.default_index_path();
    let json = cli.json;

    match cli.command {
        Commands::Crawl { roots, depth } => {
            let mut options = CrawlOptions::from_config(session.config());
            if let Some(depth) = depth {
                options = options.with_max_depth(depth);
            }
            let roots: Vec<PathBuf> = roots.iter().map(|r| absolute(&root, r)).collect();
            let result = session.crawl_with(&roots, &options).await;
            if json {
                return print_json(&result);
            }
            println!("Files: {}  Edges: {}", result.nodes.len(), result.edges.len());
            for edge in &result.edges {
                println!("  {} -> {}", relative(&root, &edge.source), relative(&root, &edge.target));
            }
            for cycle in &result.cycles {
                let members: Vec<String> = cycle.iter().map(|f| relative(&root, f)).collect();
                println!("Cycle: {}", members.join(" <-> "));
            }
            for (file, err) in &result.node_errors {
                println!("Error: {} [{}] {}", relative(&root, file), err.kind, err.message);
            }
            if !result.external.is_empty() {
                println!("External: {}", result.external.len());
            }
        }

        Commands::Symbols { file } => {
            let graph = session.get_symbol_graph(&absolute(&root, &file)).await?;
            if json {
                return print_json(&graph);
            }
            for symbol in &graph.symbols {
                let marker = if symbol.is_exported { "+" } else { " " };
                println!("{} {:<40} {:<14} line {}", marker, symbol.qualified_name(), symbol.kind.to_string(), symbol.line);
            }
            for dep in &graph.dependencies {
                let arrow = if dep.is_type_only { "-:>" } else { "->" };
                println!("  {} {} {}", relative(&root, &dep.source_symbol_id), arrow, relative(&root, &dep.target_symbol_id));
            }
        }

        Commands::Callers {
            symbol_id,
            types,
            runtime,
        } => {
            load_index(&session, &index_path).await?;
            let symbol_id = qualify(&root, &symbol_id);
            let callers = if types {
                session.get_type_only_callers(&symbol_id)
            } else if runtime {
                session.get_runtime_callers(&symbol_id)
            } else {
                session.get_callers(&symbol_id)
            };
            if json {
                return print_json(&callers);
            }
            if callers.is_empty() {
                println!("No callers of {}", symbol_id);
            }
            for dep in &callers {
                println!("{}", relative(&root, &dep.source_symbol_id));
            }
        }

        Commands::Dependents { file, name } => {
            load_index(&session, &index_path).await?;
            let dependents = session
                .get_symbol_dependents(&absolute(&root, &file), &name)
                .await?;
            if json {
                return print_json(&dependents);
            }
            for dep in &dependents {
                println!("{}", relative(&root, &dep.source_symbol_id));
            }
        }

        Commands::Unused { file } => {
            let unused = session.unused_dependencies(&absolute(&root, &file)).await?;
            if json {
                return print_json(&unused);
            }
            for dep in &unused {
                println!("line {:>4}  {}", dep.line, dep.module_path);
            }
        }

        Commands::Index => {
            if index_path.exists() {
                if let Err(e) = session.load_index(&index_path) {
                    warn!(error = %e, "ignoring unreadable index, rebuilding");
                }
            }
            let summary = session.build_full_index().await?;
            session.save_index(&index_path)?;
            if json {
                return print_json(&summary);
            }
            println!(
                "Indexed {} of {} files ({} unchanged, {} removed), {} dependencies",
                summary.indexed, summary.files, summary.up_to_date, summary.removed, summary.dependencies
            );
            for (file, err) in &summary.errors {
                println!("Error: {} [{}] {}", relative(&root, file), err.kind, err.message);
            }
        }

        Commands::Stale { files } => {
            load_index(&session, &index_path).await?;
            let mut report = Vec::new();
            for file in files {
                let path = absolute(&root, &file);
                let stale = session.is_file_stale(&path).await?;
                report.push((relative(&root, &graphit::normalize_path(&path)), stale));
            }
            if json {
                return print_json(&report);
            }
            for (file, stale) in &report {
                println!("{} {}", if *stale { "stale" } else { "fresh" }, file);
            }
        }
    }

    Ok(())
}

/// Load the saved index, building it on first use.
async fn load_index(session: &ProjectSession, index_path: &Path) -> Result<()> {
    if index_path.exists() {
        session
            .load_index(index_path)
            .with_context(|| format!("loading {}", index_path.display()))?;
        return Ok(());
    }
    info!("no index found, building (first run)");
    session.build_full_index().await?;
    session.save_index(index_path)?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn absolute(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Accept `src/a.ts:f` as well as the absolute id.
fn qualify(root: &Path, symbol_id: &str) -> String {
    match symbol_id.rsplit_once(':') {
        Some((file, name)) => format!(
            "{}:{}",
            graphit::normalize_path(&absolute(root, Path::new(file))),
            name
        ),
        None => symbol_id.to_string(),
    }
}

/// Strip the project root from a path or symbol id.
fn relative(root: &Path, file: &str) -> String {
    let root = graphit::normalize_path(root);
    file.strip_prefix(&format!("{}/", root))
        .unwrap_or(file)
        .to_string()
}
