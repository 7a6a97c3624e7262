//! Reverse symbol index: target symbol -> the symbols that use it.
//!
//! Entries are grouped by target id first, so a caller lookup touches only
//! the callers of that symbol. Each source file owns exactly one slice of
//! the index, tagged with the `(mtime, size)` stamp it was built from;
//! adding a slice for a file drops the previous one first.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

use crate::error::Result;
use crate::path::normalize_str;
use crate::symbols::SymbolDependency;

const FORMAT_VERSION: u32 = 1;

/// On-disk state of a file at indexing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileStamp {
    pub mtime_ms: u64,
    pub size: u64,
}

impl FileStamp {
    pub fn new(mtime_ms: u64, size: u64) -> Self {
        Self { mtime_ms, size }
    }

    pub fn from_metadata(meta: &fs::Metadata) -> Self {
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            mtime_ms,
            size: meta.len(),
        }
    }

    pub async fn of(path: &Path) -> Result<Self> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(Self::from_metadata(&meta))
    }
}

type CallerMap = HashMap<String, HashMap<String, Vec<SymbolDependency>>>;

#[derive(Debug, Clone)]
struct FileSlice {
    stamp: FileStamp,
    dependencies: Vec<SymbolDependency>,
}

#[derive(Debug, Clone, Default)]
pub struct ReverseIndex {
    /// target id -> source file -> runtime dependencies.
    runtime: CallerMap,
    /// target id -> source file -> type-only dependencies.
    type_only: CallerMap,
    slices: HashMap<String, FileSlice>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    files: Vec<SnapshotFile>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    source: String,
    stamp: FileStamp,
    dependencies: Vec<SymbolDependency>,
}

impl ReverseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slice of `source_file` with `dependencies`.
    pub fn add_dependencies(
        &mut self,
        source_file: &str,
        dependencies: Vec<SymbolDependency>,
        stamp: FileStamp,
    ) {
        let source = normalize_str(source_file);
        self.remove_dependencies_from_source(&source);

        for dep in &dependencies {
            let partition = if dep.is_type_only {
                &mut self.type_only
            } else {
                &mut self.runtime
            };
            partition
                .entry(dep.target_symbol_id.clone())
                .or_default()
                .entry(source.clone())
                .or_default()
                .push(dep.clone());
        }
        debug!(file = %source, count = dependencies.len(), "indexed file");
        self.slices.insert(
            source,
            FileSlice {
                stamp,
                dependencies,
            },
        );
    }

    /// Drop everything `source_file` contributed. Returns false when the
    /// file was not indexed.
    pub fn remove_dependencies_from_source(&mut self, source_file: &str) -> bool {
        let source = normalize_str(source_file);
        let Some(slice) = self.slices.remove(&source) else {
            return false;
        };
        for dep in &slice.dependencies {
            let partition = if dep.is_type_only {
                &mut self.type_only
            } else {
                &mut self.runtime
            };
            if let Some(by_source) = partition.get_mut(&dep.target_symbol_id) {
                by_source.remove(&source);
                if by_source.is_empty() {
                    partition.remove(&dep.target_symbol_id);
                }
            }
        }
        true
    }

    /// Every dependency on `target_symbol_id`, runtime first.
    pub fn get_callers(&self, target_symbol_id: &str) -> Vec<SymbolDependency> {
        let mut callers = self.get_runtime_callers(target_symbol_id);
        callers.extend(self.get_type_only_callers(target_symbol_id));
        callers
    }

    pub fn get_runtime_callers(&self, target_symbol_id: &str) -> Vec<SymbolDependency> {
        collect(&self.runtime, target_symbol_id)
    }

    pub fn get_type_only_callers(&self, target_symbol_id: &str) -> Vec<SymbolDependency> {
        collect(&self.type_only, target_symbol_id)
    }

    /// True when `source_file` is not indexed or was indexed from a
    /// different `(mtime, size)`.
    pub fn is_file_stale(&self, source_file: &str, stamp: FileStamp) -> bool {
        self.slices
            .get(&normalize_str(source_file))
            .map_or(true, |slice| slice.stamp != stamp)
    }

    pub fn file_stamp(&self, source_file: &str) -> Option<FileStamp> {
        self.slices.get(&normalize_str(source_file)).map(|s| s.stamp)
    }

    /// Indexed source files, sorted.
    pub fn indexed_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.slices.keys().cloned().collect();
        files.sort();
        files
    }

    /// Number of dependencies held.
    pub fn len(&self) -> usize {
        self.slices.values().map(|s| s.dependencies.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.values().all(|s| s.dependencies.is_empty())
    }

    pub fn clear(&mut self) {
        self.runtime.clear();
        self.type_only.clear();
        self.slices.clear();
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut files: Vec<SnapshotFile> = self
            .slices
            .iter()
            .map(|(source, slice)| SnapshotFile {
                source: source.clone(),
                stamp: slice.stamp,
                dependencies: slice.dependencies.clone(),
            })
            .collect();
        files.sort_by(|a, b| a.source.cmp(&b.source));
        let snapshot = Snapshot {
            version: FORMAT_VERSION,
            files,
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot = bincode::deserialize(bytes)?;
        if snapshot.version != FORMAT_VERSION {
            return Err(crate::error::GraphError::Serialization(format!(
                "unsupported index format version {}",
                snapshot.version
            )));
        }
        let mut index = Self::new();
        for file in snapshot.files {
            index.add_dependencies(&file.source, file.dependencies, file.stamp);
        }
        Ok(index)
    }

    /// Write the index to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = self.serialize()?;
        fs::write(path, &bytes)?;
        info!(path = %path.display(), files = self.slices.len(), bytes = bytes.len(), "saved index");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let index = Self::deserialize(&bytes)?;
        info!(path = %path.display(), files = index.slices.len(), "loaded index");
        Ok(index)
    }
}

fn collect(partition: &CallerMap, target: &str) -> Vec<SymbolDependency> {
    partition
        .get(target)
        .map(|by_source| by_source.values().flatten().cloned().collect())
        .unwrap_or_default()
}
