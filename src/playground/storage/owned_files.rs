use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::playground::error::{PlaygroundError, Result};
use crate::playground::host::{OwnedEntry, OwnedStorageMedium};
use crate::playground::images::validate_image_name;
use crate::playground::storage::write_atomic;

const TEMP_SUFFIX: &str = "tmp";

/// App-private file storage
///
/// Directory structure:
/// ```text
/// <data_dir>/
///   files/
///     <name>
/// ```
///
/// Writes are atomic (temp file, then rename), so a concurrent `list` never
/// sees a half-written file.
#[derive(Debug)]
pub struct OwnedFileStorage {
    files_dir: PathBuf,
}

impl OwnedFileStorage {
    /// Opens the storage at `<data_dir>/files/`, creating the directory if needed.
    pub fn new(data_dir: &Path) -> Result<Self> {
        let files_dir = data_dir.join("files");

        if !files_dir.exists() {
            std::fs::create_dir_all(&files_dir).map_err(|e| {
                PlaygroundError::Configuration(format!(
                    "Failed to create files directory {}: {}",
                    files_dir.display(),
                    e
                ))
            })?;
        }

        Ok(Self { files_dir })
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    fn resolve(&self, name: &str) -> io::Result<PathBuf> {
        validate_image_name(name)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        Ok(self.files_dir.join(name))
    }
}

#[async_trait]
impl OwnedStorageMedium for OwnedFileStorage {
    async fn list(&self) -> io::Result<Vec<OwnedEntry>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.files_dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == TEMP_SUFFIX) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            match fs::read(&path).await {
                Ok(bytes) => entries.push(OwnedEntry {
                    name: name.to_string(),
                    bytes,
                }),
                Err(e) => {
                    tracing::warn!(
                        target: "storage_playground::storage::owned_files",
                        "Skipping unreadable file {}: {}",
                        path.display(),
                        e
                    );
                }
            }
        }

        Ok(entries)
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.resolve(name)?;
        write_atomic(&path, bytes).await?;

        tracing::debug!(
            target: "storage_playground::storage::owned_files",
            "Stored {} ({} bytes)",
            path.display(),
            bytes.len()
        );
        Ok(())
    }

    async fn delete(&self, name: &str) -> io::Result<()> {
        let path = self.resolve(name)?;
        fs::remove_file(&path).await?;

        tracing::debug!(
            target: "storage_playground::storage::owned_files",
            "Deleted {}",
            path.display()
        );
        Ok(())
    }
}
