//! Python module resolution.
//!
//! Relative specifiers (`.mod`, `..pkg.mod`) climb one directory per extra
//! dot. Absolute specifiers are searched from the referencing file's directory
//! up through its ancestors to the project root. In every directory the module
//! file `x.py` wins over the package entry `x/__init__.py`.

use std::path::{Path, PathBuf};

use super::{ancestors_within, first_file, parent_dir};

#[derive(Debug, Clone)]
pub struct PythonResolver {
    project_root: PathBuf,
}

impl PythonResolver {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    pub async fn resolve(&self, from_file: &Path, specifier: &str) -> Option<PathBuf> {
        let specifier = specifier.trim();
        if specifier.is_empty() {
            return None;
        }
        let dots = specifier.chars().take_while(|c| *c == '.').count();
        let module = &specifier[dots..];
        let from_dir = parent_dir(from_file);

        if dots > 0 {
            let mut base = from_dir;
            for _ in 1..dots {
                base = base.parent()?.to_path_buf();
            }
            return first_file(module_candidates(&base, module)).await;
        }

        for dir in ancestors_within(&from_dir, &self.project_root) {
            if let Some(found) = first_file(module_candidates(&dir, module)).await {
                return Some(found);
            }
        }
        None
    }
}

fn module_candidates(base: &Path, module: &str) -> Vec<PathBuf> {
    if module.is_empty() {
        return vec![base.join("__init__.py")];
    }
    let relative = module.replace('.', "/");
    let stem = base.join(&relative);
    vec![
        base.join(format!("{}.py", relative)),
        base.join(format!("{}.pyi", relative)),
        stem.join("__init__.py"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::normalized;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("app/utils")).unwrap();
        fs::create_dir_all(root.join("app/models")).unwrap();
        fs::write(root.join("app/main.py"), "").unwrap();
        fs::write(root.join("app/helpers.py"), "").unwrap();
        fs::write(root.join("app/utils/__init__.py"), "").unwrap();
        fs::write(root.join("app/utils/helpers.py"), "").unwrap();
        fs::write(root.join("app/models/user.py"), "").unwrap();
        // Both forms exist: the bare module wins.
        fs::write(root.join("app/models.py"), "").unwrap();
        fs::write(root.join("app/models/__init__.py"), "").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_relative_specifiers() {
        let dir = project();
        let root = dir.path();
        let resolver = PythonResolver::new(root);
        let from = root.join("app/models/user.py");

        assert_eq!(
            resolver.resolve(&from, "..helpers").await,
            Some(normalized(&root.join("app/helpers.py")))
        );
        assert_eq!(
            resolver.resolve(&from, "..utils.helpers").await,
            Some(normalized(&root.join("app/utils/helpers.py")))
        );
        assert_eq!(
            resolver.resolve(&root.join("app/main.py"), ".helpers").await,
            Some(normalized(&root.join("app/helpers.py")))
        );
        assert_eq!(resolver.resolve(&from, ".missing").await, None);
    }

    #[tokio::test]
    async fn test_absolute_search_and_package_precedence() {
        let dir = project();
        let root = dir.path();
        let resolver = PythonResolver::new(root);
        let from = root.join("app/models/user.py");

        assert_eq!(
            resolver.resolve(&from, "app.utils").await,
            Some(normalized(&root.join("app/utils/__init__.py")))
        );
        assert_eq!(
            resolver.resolve(&from, "app.models").await,
            Some(normalized(&root.join("app/models.py")))
        );
        assert_eq!(resolver.resolve(&from, "os").await, None);
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let dir = project();
        let resolver = PythonResolver::new(dir.path());
        let from = dir.path().join("app/main.py");
        for specifier in ["utils.helpers", ".helpers", "requests", "..x"] {
            let first = resolver.resolve(&from, specifier).await;
            assert_eq!(resolver.resolve(&from, specifier).await, first);
            assert_eq!(resolver.resolve(&from, specifier).await, first);
        }
    }
}
