pub mod owned_files;

use std::path::Path;
use std::sync::Arc;

use crate::playground::error::Result;
use crate::playground::host::OwnedStorageMedium;

pub use owned_files::OwnedFileStorage;

/// Storage layer for the app-private directory
pub struct Storage {
    pub(crate) owned_files: Arc<OwnedFileStorage>,
}

impl Storage {
    /// Creates the storage subsystems under `data_dir`
    pub(crate) fn new(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            owned_files: Arc::new(OwnedFileStorage::new(data_dir)?),
        })
    }

    pub(crate) fn owned_medium(&self) -> Arc<dyn OwnedStorageMedium> {
        self.owned_files.clone()
    }
}

/// Writes `bytes` to `path` through a sibling temp file and a rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp_path = std::path::PathBuf::from(temp);

    tokio::fs::write(&temp_path, bytes).await?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    Ok(())
}
