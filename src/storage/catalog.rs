//! Read-side view over stored recordings

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use super::error::StorageError;
use super::naming::{is_valid_file_name, recording_base, sanitize_name};

/// Lists and reads recordings in a storage directory
#[derive(Debug, Clone)]
pub struct RecordingCatalog {
    dir: PathBuf,
}

impl RecordingCatalog {
    /// Create a catalog over `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All recording file names, sorted
    ///
    /// A missing directory means no recordings yet.
    pub async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_valid_file_name(name) {
                    files.push(name.to_string());
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Recordings of one stream name
    pub async fn list_for(&self, name: &str) -> Result<Vec<String>, StorageError> {
        let base = sanitize_name(name);
        let files = self.list().await?;

        Ok(files
            .into_iter()
            .filter(|file| recording_base(file) == Some(base.as_str()))
            .collect())
    }

    /// Distinct stream names that have at least one recording, sorted
    pub async fn names(&self) -> Result<Vec<String>, StorageError> {
        let files = self.list().await?;
        let names: BTreeSet<String> = files
            .iter()
            .filter_map(|file| recording_base(file))
            .map(str::to_string)
            .collect();

        Ok(names.into_iter().collect())
    }

    /// Read a recording by file name
    pub async fn read(&self, file_name: &str) -> Result<Bytes, StorageError> {
        if !is_valid_file_name(file_name) {
            return Err(StorageError::InvalidFilename(file_name.to_string()));
        }

        match tokio::fs::read(self.dir.join(file_name)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(file_name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
