//! TS/JS module resolution.
//!
//! Order of attempts for a specifier:
//! 1. relative (`./`, `../`) against the referencing file's directory,
//! 2. node builtins are external,
//! 3. `tsconfig.json` `paths` patterns, then `baseUrl`,
//! 4. `node_modules` packages, only when they are not excluded.
//!
//! A candidate base resolves to the exact file, then the `.js`→`.ts` source
//! mapping, then `base.<ext>`, then `base/index.<ext>`.

use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::debug;

use super::{ancestors_within, first_file, is_file, parent_dir};
use crate::parser::source::mask_js_source;
use crate::parser::SupportedLanguage;

const EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "mts", "cts", "vue", "svelte",
];

/// Emitted JS extension -> TS source extensions it may have come from.
const SOURCE_MAPPINGS: &[(&str, &[&str])] = &[
    ("js", &["ts", "tsx"]),
    ("jsx", &["tsx"]),
    ("mjs", &["mts"]),
    ("cjs", &["cts"]),
];

const NODE_BUILTINS: &[&str] = &[
    "assert", "buffer", "child_process", "cluster", "crypto", "dgram", "dns", "events", "fs",
    "http", "http2", "https", "net", "os", "path", "perf_hooks", "process", "querystring",
    "readline", "stream", "string_decoder", "timers", "tls", "tty", "url", "util", "v8", "vm",
    "worker_threads", "zlib",
];

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("valid trailing comma pattern"));

/// `compilerOptions.baseUrl` / `paths` from one tsconfig.
#[derive(Debug, Clone, Default)]
struct PathAliases {
    base_url: Option<PathBuf>,
    /// Sorted so that longer (more specific) prefixes are tried first.
    patterns: Vec<(String, Vec<String>)>,
    paths_base: PathBuf,
}

pub struct TsResolver {
    project_root: PathBuf,
    exclude_node_modules: bool,
    aliases: DashMap<PathBuf, Option<Arc<PathAliases>>>,
}

impl TsResolver {
    pub fn new(project_root: impl Into<PathBuf>, exclude_node_modules: bool) -> Self {
        Self {
            project_root: project_root.into(),
            exclude_node_modules,
            aliases: DashMap::new(),
        }
    }

    pub async fn resolve(&self, from_file: &Path, specifier: &str) -> Option<PathBuf> {
        let specifier = strip_query(specifier.trim());
        if specifier.is_empty() {
            return None;
        }
        let from_dir = parent_dir(from_file);

        if is_relative(specifier) {
            return resolve_base(&from_dir.join(specifier)).await;
        }
        if specifier.starts_with('/') {
            return resolve_base(Path::new(specifier)).await;
        }
        if is_node_builtin(specifier) {
            return None;
        }

        if let Some(aliases) = self.aliases_for(&from_dir).await {
            if let Some(found) = resolve_alias(&aliases, specifier).await {
                return Some(found);
            }
        }

        if !self.exclude_node_modules {
            return self.resolve_package(&from_dir, specifier).await;
        }
        None
    }

    /// Nearest tsconfig aliases, cached per directory.
    async fn aliases_for(&self, dir: &Path) -> Option<Arc<PathAliases>> {
        if let Some(cached) = self.aliases.get(dir) {
            return cached.value().clone();
        }
        let mut loaded = None;
        for candidate in ancestors_within(dir, &self.project_root) {
            let config = candidate.join("tsconfig.json");
            if is_file(&config).await {
                loaded = load_aliases(&config).await.map(Arc::new);
                break;
            }
        }
        self.aliases.insert(dir.to_path_buf(), loaded.clone());
        loaded
    }

    async fn resolve_package(&self, from_dir: &Path, specifier: &str) -> Option<PathBuf> {
        let (package, subpath) = split_package(specifier);
        for dir in ancestors_within(from_dir, &self.project_root) {
            let package_dir = dir.join("node_modules").join(package);
            if !tokio::fs::try_exists(&package_dir).await.unwrap_or(false) {
                continue;
            }
            if let Some(subpath) = subpath {
                return resolve_base(&package_dir.join(subpath)).await;
            }
            for entry in package_entries(&package_dir).await {
                if let Some(found) = resolve_base(&package_dir.join(entry)).await {
                    return Some(found);
                }
            }
            return resolve_base(&package_dir.join("index")).await;
        }
        None
    }
}

/// Candidate files for a base path, in precedence order.
async fn resolve_base(base: &Path) -> Option<PathBuf> {
    let mut candidates = Vec::new();
    let extension = base.extension().and_then(|e| e.to_str());

    if SupportedLanguage::from_path(base).is_some() {
        candidates.push(base.to_path_buf());
    }
    if let Some(ext) = extension {
        if let Some((_, sources)) = SOURCE_MAPPINGS.iter().find(|(js, _)| *js == ext) {
            for source in sources.iter() {
                candidates.push(base.with_extension(source));
            }
        }
    }
    for ext in EXTENSIONS {
        let mut file = base.as_os_str().to_os_string();
        file.push(".");
        file.push(ext);
        candidates.push(PathBuf::from(file));
    }
    for ext in EXTENSIONS {
        candidates.push(base.join(format!("index.{}", ext)));
    }
    first_file(candidates).await
}

async fn resolve_alias(aliases: &PathAliases, specifier: &str) -> Option<PathBuf> {
    for (pattern, targets) in &aliases.patterns {
        let Some(captured) = match_pattern(pattern, specifier) else {
            continue;
        };
        for target in targets {
            let substituted = target.replacen('*', captured, 1);
            if let Some(found) = resolve_base(&aliases.paths_base.join(substituted)).await {
                return Some(found);
            }
        }
    }
    match &aliases.base_url {
        Some(base_url) => resolve_base(&base_url.join(specifier)).await,
        None => None,
    }
}

/// Match a tsconfig `paths` key with at most one `*`.
fn match_pattern<'a>(pattern: &str, specifier: &'a str) -> Option<&'a str> {
    match pattern.split_once('*') {
        None => (pattern == specifier).then_some(""),
        Some((prefix, suffix)) => {
            if specifier.len() >= prefix.len() + suffix.len()
                && specifier.starts_with(prefix)
                && specifier.ends_with(suffix)
            {
                Some(&specifier[prefix.len()..specifier.len() - suffix.len()])
            } else {
                None
            }
        }
    }
}

async fn load_aliases(config: &Path) -> Option<PathAliases> {
    let text = tokio::fs::read_to_string(config).await.ok()?;
    let masked = mask_js_source(&text).text;
    let cleaned = TRAILING_COMMA.replace_all(&masked, "$1");
    let json: Value = match serde_json::from_str(&cleaned) {
        Ok(json) => json,
        Err(e) => {
            debug!(config = %config.display(), error = %e, "ignoring unreadable tsconfig");
            return None;
        }
    };
    let config_dir = parent_dir(config);
    let options = json.get("compilerOptions")?;
    let base_url = options
        .get("baseUrl")
        .and_then(Value::as_str)
        .map(|base| config_dir.join(base));

    let mut patterns: Vec<(String, Vec<String>)> = options
        .get("paths")
        .and_then(Value::as_object)
        .map(|paths| {
            paths
                .iter()
                .map(|(key, targets)| {
                    let targets = targets
                        .as_array()
                        .map(|list| {
                            list.iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();
                    (key.clone(), targets)
                })
                .collect()
        })
        .unwrap_or_default();
    patterns.sort_by(|(a, _), (b, _)| {
        let prefix = |p: &str| p.split('*').next().map(str::len).unwrap_or(0);
        prefix(b).cmp(&prefix(a)).then_with(|| a.cmp(b))
    });

    if base_url.is_none() && patterns.is_empty() {
        return None;
    }
    let paths_base = base_url.clone().unwrap_or_else(|| config_dir.clone());
    Some(PathAliases {
        base_url,
        patterns,
        paths_base,
    })
}

/// `main`-like entries of a package, in lookup order.
async fn package_entries(package_dir: &Path) -> Vec<String> {
    let Ok(text) = tokio::fs::read_to_string(package_dir.join("package.json")).await else {
        return Vec::new();
    };
    let Ok(json) = serde_json::from_str::<Value>(&text) else {
        return Vec::new();
    };
    ["types", "typings", "module", "main"]
        .iter()
        .filter_map(|field| json.get(*field).and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn split_package(specifier: &str) -> (&str, Option<&str>) {
    let mut slashes = specifier.match_indices('/').map(|(i, _)| i);
    let cut = if specifier.starts_with('@') {
        slashes.nth(1)
    } else {
        slashes.next()
    };
    match cut {
        Some(i) => (&specifier[..i], Some(&specifier[i + 1..])),
        None => (specifier, None),
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

fn is_node_builtin(specifier: &str) -> bool {
    if specifier.starts_with("node:") {
        return true;
    }
    let root = specifier.split('/').next().unwrap_or(specifier);
    NODE_BUILTINS.contains(&root)
}

fn strip_query(specifier: &str) -> &str {
    specifier
        .split(['?', '#'])
        .next()
        .unwrap_or(specifier)
}
