//! Module resolvers: specifier + referencing file -> file on disk.
//!
//! Resolvers never fail. A specifier that does not map to a project file
//! resolves to `None` and is treated as an external dependency. Every path
//! handed back is in canonical form (see [`crate::path`]).

pub mod python;
pub mod rust;
pub mod typescript;

use std::path::{Path, PathBuf};

use crate::path::{is_within, normalized};

pub use python::PythonResolver;
pub use rust::RustResolver;
pub use typescript::TsResolver;

/// True when `path` exists and is a regular file.
pub(crate) async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// First candidate that exists as a file, normalized.
pub(crate) async fn first_file<I>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    for candidate in candidates {
        if is_file(&candidate).await {
            return Some(normalized(&candidate));
        }
    }
    None
}

/// Directory of the referencing file.
pub(crate) fn parent_dir(file: &Path) -> PathBuf {
    file.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `start` and its ancestors, nearest first, stopping at `root` (inclusive).
/// A `start` outside `root` yields only itself.
pub(crate) fn ancestors_within(start: &Path, root: &Path) -> Vec<PathBuf> {
    let start = normalized(start);
    if !is_within(&start, root) {
        return vec![start];
    }
    let root = normalized(root);
    let mut dirs = Vec::new();
    for dir in start.ancestors() {
        dirs.push(dir.to_path_buf());
        if dir == root.as_path() {
            break;
        }
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ancestors_stop_at_root() {
        let dirs = ancestors_within(Path::new("/p/src/a/b"), Path::new("/p"));
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/p/src/a/b"),
                PathBuf::from("/p/src/a"),
                PathBuf::from("/p/src"),
                PathBuf::from("/p"),
            ]
        );
        let outside = ancestors_within(Path::new("/q/x"), Path::new("/p"));
        assert_eq!(outside, vec![PathBuf::from("/q/x")]);
    }

    #[tokio::test]
    async fn test_first_file_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg.py"), "").unwrap();
        let found = first_file([dir.path().join("pkg"), dir.path().join("pkg.py")]).await;
        assert_eq!(found, Some(normalized(&dir.path().join("pkg.py"))));
        assert_eq!(first_file([dir.path().join("none")]).await, None);
    }
}
