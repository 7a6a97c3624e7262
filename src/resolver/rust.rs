//! Rust module resolution.
//!
//! `crate::` starts at the `src/` directory next to the nearest `Cargo.toml`,
//! `self::` at the current module's directory and each `super::` one module
//! up. The remaining segments are matched longest prefix first, since the
//! tail of a use path may name an item rather than a module. For each prefix
//! `seg.rs` wins over `seg/mod.rs`.

use std::path::{Path, PathBuf};

use super::{ancestors_within, first_file, is_file, parent_dir};
use crate::parser::is_external_crate;

const MODULE_ROOTS: &[&str] = &["mod.rs", "lib.rs", "main.rs"];

#[derive(Debug, Clone)]
pub struct RustResolver {
    project_root: PathBuf,
}

impl RustResolver {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    pub async fn resolve(&self, from_file: &Path, specifier: &str) -> Option<PathBuf> {
        let segments: Vec<&str> = specifier
            .trim()
            .trim_start_matches("::")
            .split("::")
            .filter(|s| !s.is_empty())
            .collect();
        let (&head, rest) = segments.split_first()?;
        if is_external_crate(head) {
            return None;
        }

        match head {
            "crate" => {
                let src = self.crate_src(from_file).await?;
                if rest.is_empty() {
                    return first_file([src.join("lib.rs"), src.join("main.rs")]).await;
                }
                resolve_in(&src, rest).await
            }
            "self" => resolve_in(&module_dir(from_file), rest).await,
            "super" => {
                let mut dir = parent_module_dir(from_file)?;
                let mut tail = rest;
                while let Some((&"super", more)) = tail.split_first() {
                    dir = dir.parent()?.to_path_buf();
                    tail = more;
                }
                if tail.is_empty() {
                    return module_file(&dir).await;
                }
                resolve_in(&dir, tail).await
            }
            _ => {
                // Child module (`mod foo;`) or a crate-relative 2015-style path.
                if let Some(found) = resolve_in(&module_dir(from_file), &segments).await {
                    return Some(found);
                }
                if let Some(found) = resolve_in(&parent_dir(from_file), &segments).await {
                    return Some(found);
                }
                let src = self.crate_src(from_file).await?;
                resolve_in(&src, &segments).await
            }
        }
    }

    /// `src/` beside the nearest `Cargo.toml` at or below the project root.
    async fn crate_src(&self, from_file: &Path) -> Option<PathBuf> {
        for dir in ancestors_within(&parent_dir(from_file), &self.project_root) {
            if is_file(&dir.join("Cargo.toml")).await {
                return Some(dir.join("src"));
            }
        }
        let fallback = self.project_root.join("src");
        tokio::fs::metadata(&fallback)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
            .then_some(fallback)
    }
}

/// Directory holding the child modules of the module defined by `file`.
fn module_dir(file: &Path) -> PathBuf {
    let dir = parent_dir(file);
    let name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if MODULE_ROOTS.contains(&name) {
        return dir;
    }
    match file.file_stem().and_then(|s| s.to_str()) {
        Some(stem) => dir.join(stem),
        None => dir,
    }
}

/// Directory holding the siblings of the module defined by `file`.
fn parent_module_dir(file: &Path) -> Option<PathBuf> {
    let dir = parent_dir(file);
    let name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if MODULE_ROOTS.contains(&name) {
        dir.parent().map(Path::to_path_buf)
    } else {
        Some(dir)
    }
}

/// The file defining the module whose children live in `dir`.
async fn module_file(dir: &Path) -> Option<PathBuf> {
    let mut candidates = vec![dir.join("mod.rs")];
    if let Some(name) = dir.file_name() {
        let mut file = name.to_os_string();
        file.push(".rs");
        candidates.push(parent_dir(dir).join(file));
    }
    candidates.push(dir.join("lib.rs"));
    candidates.push(dir.join("main.rs"));
    first_file(candidates).await
}

async fn resolve_in(base: &Path, segments: &[&str]) -> Option<PathBuf> {
    for len in (1..=segments.len()).rev() {
        let stem = base.join(segments[..len].join("/"));
        let mut file = stem.clone().into_os_string();
        file.push(".rs");
        if let Some(found) = first_file([PathBuf::from(file), stem.join("mod.rs")]).await {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::normalized;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/graph")).unwrap();
        fs::create_dir_all(root.join("src/parser")).unwrap();
        fs::write(root.join("Cargo.toml"), "[package]\nname = \"demo\"\n").unwrap();
        fs::write(root.join("src/main.rs"), "mod helper;\nmod graph;\n").unwrap();
        fs::write(root.join("src/helper.rs"), "pub fn format_data() {}\n").unwrap();
        fs::write(root.join("src/graph/mod.rs"), "pub mod engine;\n").unwrap();
        fs::write(root.join("src/graph/engine.rs"), "").unwrap();
        fs::write(root.join("src/parser.rs"), "mod rust;\n").unwrap();
        fs::write(root.join("src/parser/rust.rs"), "").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_child_modules() {
        let dir = project();
        let root = dir.path();
        let resolver = RustResolver::new(root);

        assert_eq!(
            resolver.resolve(&root.join("src/main.rs"), "helper").await,
            Some(normalized(&root.join("src/helper.rs")))
        );
        assert_eq!(
            resolver.resolve(&root.join("src/main.rs"), "graph").await,
            Some(normalized(&root.join("src/graph/mod.rs")))
        );
        assert_eq!(
            resolver.resolve(&root.join("src/parser.rs"), "rust").await,
            Some(normalized(&root.join("src/parser/rust.rs")))
        );
        assert_eq!(
            resolver.resolve(&root.join("src/graph/mod.rs"), "engine").await,
            Some(normalized(&root.join("src/graph/engine.rs")))
        );
    }

    #[tokio::test]
    async fn test_crate_self_super_paths() {
        let dir = project();
        let root = dir.path();
        let resolver = RustResolver::new(root);
        let engine = root.join("src/graph/engine.rs");

        assert_eq!(
            resolver.resolve(&engine, "crate::helper::format_data").await,
            Some(normalized(&root.join("src/helper.rs")))
        );
        assert_eq!(
            resolver.resolve(&engine, "crate::graph::engine").await,
            Some(normalized(&root.join("src/graph/engine.rs")))
        );
        assert_eq!(
            resolver.resolve(&engine, "super").await,
            Some(normalized(&root.join("src/graph/mod.rs")))
        );
        assert_eq!(
            resolver.resolve(&engine, "super::super::helper").await,
            Some(normalized(&root.join("src/helper.rs")))
        );
        assert_eq!(
            resolver.resolve(&root.join("src/graph/mod.rs"), "self::engine").await,
            Some(normalized(&root.join("src/graph/engine.rs")))
        );
        assert_eq!(resolver.resolve(&engine, "crate::missing").await, None);
    }

    #[tokio::test]
    async fn test_external_roots_resolve_to_none() {
        let dir = project();
        let root = dir.path();
        fs::create_dir_all(root.join("src/std")).unwrap();
        fs::write(root.join("src/std.rs"), "").unwrap();
        let resolver = RustResolver::new(root);
        let main = root.join("src/main.rs");
        for specifier in ["std::collections", "serde", "tokio::sync", "::core::fmt"] {
            for _ in 0..3 {
                assert_eq!(resolver.resolve(&main, specifier).await, None);
            }
        }
    }
}
