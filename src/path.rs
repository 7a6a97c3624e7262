//! Canonical path form used for node identity.
//!
//! Every path that becomes a graph node or symbol id goes through
//! [`normalize_path`]: forward slashes only, `.`/`..` folded lexically, and a
//! lower-cased drive letter. Nothing else is case-folded.

use std::path::{Path, PathBuf};

/// Normalize a path into its canonical string form.
pub fn normalize_path(path: &Path) -> String {
    normalize_str(&path.to_string_lossy())
}

/// Normalize a path given as a string.
pub fn normalize_str(raw: &str) -> String {
    let replaced = raw.replace('\\', "/");
    let (prefix, rest) = split_drive(&replaced);

    let absolute = rest.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in rest.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let mut out = prefix;
    if absolute {
        out.push('/');
    }
    out.push_str(&parts.join("/"));
    if out.is_empty() {
        out.push('.');
    }
    out
}

/// Normalized form as a `PathBuf`.
pub fn normalized(path: &Path) -> PathBuf {
    PathBuf::from(normalize_path(path))
}

/// True when `path` lies at or below `root` (both normalized first).
pub fn is_within(path: &Path, root: &Path) -> bool {
    let path = normalize_path(path);
    let root = normalize_path(root);
    if root == "." {
        // Relative root: relative paths that do not climb out of it.
        return !(path == ".." || path.starts_with("../") || is_rooted(&path));
    }
    path == root || path.starts_with(&format!("{}/", root.trim_end_matches('/')))
}

fn is_rooted(path: &str) -> bool {
    path.starts_with('/') || !split_drive(path).0.is_empty()
}

fn split_drive(path: &str) -> (String, &str) {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let drive = (bytes[0] as char).to_ascii_lowercase();
        (format!("{}:", drive), &path[2..])
    } else {
        (String::new(), path)
    }
}
