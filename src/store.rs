//! Storage backend contract and the two bundled implementations.
//!
//! A backend keeps one opaque encrypted blob per session identifier. Any
//! implementation must distinguish "not found" from other I/O failures;
//! everything else is passed through unchanged.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

/// Backend failure. [`StoreError::NotFound`] is the only condition session
/// code interprets; everything else propagates to the caller unchanged.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session blob not found")]
    NotFound,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Storage backend consumed by session records.
///
/// User-implemented seam: filesystem, in-memory, object store. Blobs are
/// already encrypted when they arrive here; backends never see plaintext.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Whether a blob exists for `id`.
    async fn exists(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Read the blob for `id`. Absent blobs are [`StoreError::NotFound`].
    async fn read(&self, id: Uuid) -> Result<Vec<u8>, StoreError>;

    /// Write (replace) the blob for `id`.
    async fn write(&self, id: Uuid, bytes: &[u8]) -> Result<(), StoreError>;

    /// Delete the blob for `id`. Deleting an absent blob is not an error.
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

// ============================================================================
// FsStore
// ============================================================================

/// Filesystem backend: one `<uuid>.sess` file per session under a root
/// directory.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open a store rooted at `root`, creating the directory if absent.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// The root directory blobs are kept under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("{id}.sess"))
    }
}

fn map_not_found(err: io::Error) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound
    } else {
        StoreError::Io(err)
    }
}

#[async_trait]
impl SessionStore for FsStore {
    async fn exists(&self, id: Uuid) -> Result<bool, StoreError> {
        match tokio::fs::metadata(self.blob_path(id)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, id: Uuid) -> Result<Vec<u8>, StoreError> {
        tokio::fs::read(self.blob_path(id)).await.map_err(map_not_found)
    }

    async fn write(&self, id: Uuid, bytes: &[u8]) -> Result<(), StoreError> {
        // Write-then-rename so readers never observe a partial blob.
        let path = self.blob_path(id);
        let tmp = self.root.join(format!("{id}.sess.tmp"));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.blob_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// MemStore
// ============================================================================

/// In-memory backend for tests and process-local deployments.
#[derive(Debug, Default)]
pub struct MemStore {
    blobs: Mutex<HashMap<Uuid, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently held.
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemStore {
    async fn exists(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.blobs.lock().contains_key(&id))
    }

    async fn read(&self, id: Uuid) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .lock()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn write(&self, id: Uuid, bytes: &[u8]) -> Result<(), StoreError> {
        self.blobs.lock().insert(id, bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.blobs.lock().remove(&id);
        Ok(())
    }
}
