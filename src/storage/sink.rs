//! Persistence sinks for finished streams

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::error::StorageError;
use super::naming::{recording_file_name, sanitize_name};

/// Upper bound on same-second disambiguation suffixes
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Durable storage for a stream's complete recording
///
/// Called once per stopped stream (again only if the previous attempt failed).
/// Implementations must never overwrite an earlier recording.
#[async_trait]
pub trait PersistenceSink: Send + Sync + 'static {
    /// Store `data` under a name derived from `base_name`; returns the stored identifier
    async fn save(&self, base_name: &str, data: Bytes) -> Result<String, StorageError>;
}

/// Sink that writes each recording to its own file in a directory
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    /// Create a sink writing into `dir` (created on first save)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory recordings are written to
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl PersistenceSink for FileSink {
    async fn save(&self, base_name: &str, data: Bytes) -> Result<String, StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let base = sanitize_name(base_name);
        let now = Utc::now();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let file_name = recording_file_name(&base, now, attempt);
            let path = self.dir.join(&file_name);

            let mut file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };

            let written = async {
                file.write_all(&data).await?;
                file.sync_all().await
            }
            .await;

            if let Err(e) = written {
                // Leave no truncated recording behind; the caller keeps the buffer
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e.into());
            }

            tracing::debug!(
                path = %path.display(),
                bytes = data.len(),
                "Recording written"
            );
            return Ok(file_name);
        }

        Err(StorageError::NameExhausted(base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::naming::recording_base;

    #[tokio::test]
    async fn test_save_writes_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());

        let name = sink
            .save("lobby", Bytes::from_static(b"c1c2c3"))
            .await
            .unwrap();

        assert_eq!(recording_base(&name), Some("lobby"));
        let stored = tokio::fs::read(dir.path().join(&name)).await.unwrap();
        assert_eq!(stored, b"c1c2c3");
    }

    #[tokio::test]
    async fn test_repeated_saves_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());

        let first = sink.save("sos", Bytes::from_static(b"one")).await.unwrap();
        let second = sink.save("sos", Bytes::from_static(b"two")).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(tokio::fs::read(dir.path().join(&first)).await.unwrap(), b"one");
        assert_eq!(tokio::fs::read(dir.path().join(&second)).await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_save_sanitizes_name() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());

        let name = sink
            .save("../escape", Bytes::from_static(b"x"))
            .await
            .unwrap();

        assert!(name.starts_with("___escape_"));
        assert!(dir.path().join(&name).exists());
    }

    #[tokio::test]
    async fn test_save_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let sink = FileSink::new(&nested);

        sink.save("x", Bytes::from_static(b"x")).await.unwrap();

        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_save_reports_unwritable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a dir").unwrap();
        let sink = FileSink::new(blocker.join("sub"));

        let result = sink.save("x", Bytes::from_static(b"x")).await;

        assert!(matches!(result, Err(StorageError::Io(_))));
    }
}
