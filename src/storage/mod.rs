use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Where uploaded image bytes live. Paths returned by `save` are what the
/// Image record stores and what `remove` later receives.
///
/// Every saved file is keyed by its image id, so two uploads with the same
/// file name never share a path.
#[async_trait]
pub trait ImageStorage: Send + Sync {
    async fn save(
        &self,
        breeder_id: &str,
        image_id: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError>;

    /// Missing files are not an error
    async fn remove(&self, path: &str) -> Result<(), StorageError>;
}

/// Reject names that could escape the breeder's folder
fn check_segment(segment: &str) -> Result<(), StorageError> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
    {
        return Err(StorageError::InvalidName(segment.to_string()));
    }
    Ok(())
}

/// `<imageId>-<name>`, once every segment is known to be safe
fn stored_name(breeder_id: &str, image_id: &str, name: &str) -> Result<String, StorageError> {
    check_segment(breeder_id)?;
    check_segment(image_id)?;
    check_segment(name)?;
    Ok(format!("{}-{}", image_id, name))
}

/// Files under `<root>/<breederId>/<imageId>-<name>`
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ImageStorage for DiskStorage {
    async fn save(
        &self,
        breeder_id: &str,
        image_id: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let file_name = stored_name(breeder_id, image_id, name)?;

        let dir = self.root.join(breeder_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;

        info!(path = %path.display(), bytes = bytes.len(), "Stored image");
        Ok(path.to_string_lossy().into_owned())
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!(path, "Removed image");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path, "Image file already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps uploads in a map; used by tests and `--store memory`
#[derive(Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.files.read().await.contains_key(path)
    }
}

#[async_trait]
impl ImageStorage for MemoryStorage {
    async fn save(
        &self,
        breeder_id: &str,
        image_id: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let path = format!("uploads/{}/{}", breeder_id, stored_name(breeder_id, image_id, name)?);
        self.files.write().await.insert(path.clone(), bytes.to_vec());
        Ok(path)
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        self.files.write().await.remove(path);
        Ok(())
    }
}
