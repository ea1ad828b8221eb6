//! Opaque keyed blob storage.
//!
//! The index store only needs two operations: read a blob back as a byte
//! stream and upload a byte stream under a key. Backends know nothing about
//! the byte layout inside a blob.

use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Readable byte stream handed out and accepted by a [`BlobStore`].
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Error, Debug)]
pub enum BlobStoreError {
    #[error("Blob '{key}' not found")]
    NotFound { key: String },

    #[error("Invalid blob key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("Blob I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Keyed storage of opaque byte streams.
///
/// Implementations are shared between concurrent requests.
pub trait BlobStore: Send + Sync {
    /// Opens the blob stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<BlobReader, BlobStoreError>> + Send;

    /// Drains `body` into the blob `key` and returns the number of bytes stored.
    fn upload(
        &self,
        key: &str,
        body: BlobReader,
    ) -> impl Future<Output = Result<u64, BlobStoreError>> + Send;
}

impl<S: BlobStore> BlobStore for Arc<S> {
    fn get(&self, key: &str) -> impl Future<Output = Result<BlobReader, BlobStoreError>> + Send {
        (**self).get(key)
    }

    fn upload(
        &self,
        key: &str,
        body: BlobReader,
    ) -> impl Future<Output = Result<u64, BlobStoreError>> + Send {
        (**self).upload(key, body)
    }
}

/// In-memory blob store.
#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    blobs: Arc<DashMap<String, Arc<Vec<u8>>>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `bytes` directly, bypassing the streaming upload.
    pub fn insert(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.blobs.insert(key.into(), Arc::new(bytes));
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.get(key).map(|blob| blob.as_ref().clone())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.blobs.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<BlobReader, BlobStoreError> {
        let blob = self
            .blobs
            .get(key)
            .map(|blob| Arc::clone(blob.value()))
            .ok_or_else(|| BlobStoreError::NotFound {
                key: key.to_string(),
            })?;
        Ok(Box::new(io::Cursor::new(ArcBytes(blob))))
    }

    async fn upload(&self, key: &str, mut body: BlobReader) -> Result<u64, BlobStoreError> {
        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes).await?;
        let size = bytes.len() as u64;
        self.blobs.insert(key.to_string(), Arc::new(bytes));
        Ok(size)
    }
}

/// Shared byte buffer readable through `io::Cursor`.
struct ArcBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for ArcBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

/// Blob store backed by files under a root directory.
///
/// Uploads stream into a temporary sibling file which is renamed into place
/// once the body is fully written, so readers never see a partial blob.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> Result<PathBuf, BlobStoreError> {
        let invalid = |reason| BlobStoreError::InvalidKey {
            key: key.to_string(),
            reason,
        };
        if key.is_empty() {
            return Err(invalid("key is empty"));
        }
        let relative = Path::new(key);
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(invalid("key must be a relative path without '..'"));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for LocalBlobStore {
    async fn get(&self, key: &str) -> Result<BlobReader, BlobStoreError> {
        let path = self.blob_path(key)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(tokio::io::BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobStoreError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(&self, key: &str, mut body: BlobReader) -> Result<u64, BlobStoreError> {
        let path = self.blob_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut partial = path.clone().into_os_string();
        partial.push(".partial");
        let partial = PartialFile::new(PathBuf::from(partial));

        let mut file = tokio::fs::File::create(partial.path()).await?;
        let size = tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(partial.path(), &path).await?;
        partial.keep();

        debug!("Stored blob '{key}' ({size} bytes) at {}", path.display());
        Ok(size)
    }
}

/// Removes a half-written upload when dropped, unless it was renamed into
/// place. Covers errors as well as an upload future dropped mid-copy.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed && std::fs::remove_file(&self.path).is_ok() {
            debug!("Removed partial upload {}", self.path.display());
        }
    }
}
