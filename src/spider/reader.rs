//! Guarded file reads: size limit, time budget, buffered path for large files.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader};

use crate::config::ProjectConfig;
use crate::error::{GraphError, Result};
use crate::index::FileStamp;

const STREAM_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct FileReader {
    max_file_size: u64,
    stream_threshold: u64,
    timeout: Duration,
}

impl FileReader {
    pub fn new(max_file_size: u64, stream_threshold: u64, timeout: Duration) -> Self {
        Self {
            max_file_size,
            stream_threshold,
            timeout,
        }
    }

    pub fn from_config(config: &ProjectConfig) -> Self {
        Self::new(
            config.max_file_size,
            config.stream_threshold,
            config.read_timeout(),
        )
    }

    /// Current stamp of `path`; a missing file or a directory is `NotFound`.
    pub async fn stat(&self, path: &Path) -> Result<FileStamp> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if !meta.is_dir() => Ok(FileStamp::from_metadata(&meta)),
            Ok(_) => Err(GraphError::NotFound(path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(GraphError::NotFound(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read `path` as text. Invalid UTF-8 is replaced rather than rejected.
    pub async fn read(&self, path: &Path, stamp: FileStamp) -> Result<String> {
        if stamp.size > self.max_file_size {
            return Err(GraphError::TooLarge {
                path: path.to_path_buf(),
                size: stamp.size,
                limit: self.max_file_size,
            });
        }
        let streaming = stamp.size > self.stream_threshold;
        let read = read_bytes(path.to_path_buf(), streaming, self.max_file_size);
        let bytes = tokio::time::timeout(self.timeout, read)
            .await
            .map_err(|_| GraphError::Timeout {
                path: path.to_path_buf(),
                millis: self.timeout.as_millis() as u64,
            })??;

        // Stamp and content can disagree when the file grows mid-read.
        if bytes.len() as u64 > self.max_file_size {
            return Err(GraphError::TooLarge {
                path: path.to_path_buf(),
                size: bytes.len() as u64,
                limit: self.max_file_size,
            });
        }
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}

/// Reads at most one byte past `limit`, enough for the caller to see that
/// the file outgrew its stamp.
async fn read_bytes(path: PathBuf, streaming: bool, limit: u64) -> Result<Vec<u8>> {
    let file = tokio::fs::File::open(&path).await?;
    let cap = limit.saturating_add(1);
    let mut bytes = Vec::new();
    if !streaming {
        file.take(cap).read_to_end(&mut bytes).await?;
        return Ok(bytes);
    }
    let mut reader = BufReader::with_capacity(STREAM_BUFFER, file).take(cap);
    let mut chunk = vec![0u8; STREAM_BUFFER];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..n]);
    }
    Ok(bytes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;

    #[tokio::test]
    async fn test_small_and_streamed_reads_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.py");
        let content = "import os\n".repeat(2_000);
        fs::write(&path, &content).unwrap();

        let direct = FileReader::new(1 << 20, 1 << 20, Duration::from_secs(5));
        let streamed = FileReader::new(1 << 20, 16, Duration::from_secs(5));
        let stamp = direct.stat(&path).await.unwrap();
        assert_eq!(stamp.size, content.len() as u64);
        assert_eq!(direct.read(&path, stamp).await.unwrap(), content);
        assert_eq!(streamed.read(&path, stamp).await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_size_guard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.ts");
        fs::write(&path, "x".repeat(100)).unwrap();
        let reader = FileReader::new(10, 5, Duration::from_secs(5));
        let stamp = reader.stat(&path).await.unwrap();
        let err = reader.read(&path, stamp).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TooLarge);
    }

    #[tokio::test]
    async fn test_stale_stamp_reads_stop_past_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grown.ts");
        fs::write(&path, "x".repeat(10_000)).unwrap();
        let reader = FileReader::new(10, 5, Duration::from_secs(5));

        // Stamps taken before the file grew: one direct, one streamed.
        for stamp in [FileStamp::new(0, 4), FileStamp::new(0, 8)] {
            match reader.read(&path, stamp).await {
                Err(GraphError::TooLarge { size, limit, .. }) => {
                    assert_eq!(size, 11);
                    assert_eq!(limit, 10);
                }
                other => panic!("expected TooLarge, got {:?}", other),
            }
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_that_never_finishes_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipe.ts");
        mkfifo(&path);

        let reader = FileReader::new(1 << 20, 1 << 20, Duration::from_millis(50));
        let stamp = reader.stat(&path).await.unwrap();
        let result = reader.read(&path, stamp).await;
        release_fifo(&path);

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(matches!(err, GraphError::Timeout { millis: 50, .. }));
    }

    /// Named pipe with no writer: opening it for reading blocks.
    #[cfg(unix)]
    pub(crate) fn mkfifo(path: &Path) {
        let status = std::process::Command::new("mkfifo").arg(path).status().unwrap();
        assert!(status.success());
    }

    /// Open and close the write end so the abandoned blocking read returns.
    #[cfg(unix)]
    pub(crate) fn release_fifo(path: &Path) {
        drop(fs::OpenOptions::new().write(true).open(path).unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_and_directory_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let reader = FileReader::new(10, 5, Duration::from_secs(5));
        let err = reader.stat(&dir.path().join("gone.rs")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = reader.stat(dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin.js");
        fs::write(&path, [b'a', 0xff, b'b']).unwrap();
        let reader = FileReader::new(1024, 1024, Duration::from_secs(5));
        let stamp = reader.stat(&path).await.unwrap();
        assert_eq!(reader.read(&path, stamp).await.unwrap(), "a\u{fffd}b");
    }
}
