//! Write and read paths for repository embedding indexes.
//!
//! Uploads stream the encoder's output straight into the blob store through
//! a bounded in-memory pipe, so memory stays flat however large the index
//! is. Downloads decode on the blocking pool while bytes arrive, and fall
//! back to the legacy float layout when the chunked layout does not match.

use std::io::{BufReader, Cursor};

use bincode::{Decode, Encode};
use tokio::io::AsyncWriteExt;
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::storage::blob::{BlobReader, BlobStore};
use crate::storage::codec::{self, CodecError, DEFAULT_CHUNK_ROWS};
use crate::storage::error::{StorageError, StorageResult};
use crate::vector::{CommitId, RepoEmbeddingIndex, RepoEmbeddingIndexName, RepoName};

/// Default capacity of the pipe between encoder and uploader.
pub const DEFAULT_UPLOAD_BUFFER_BYTES: usize = 1024 * 1024;

/// Synchronous view of a blob stream used by the decoders.
type BlobStreamReader = BufReader<SyncIoBridge<BlobReader>>;

/// Tuning for the streaming write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// Matrix rows per encoded chunk.
    pub chunk_rows: usize,
    /// Capacity of the encoder to uploader pipe. The encoder waits once it
    /// is full.
    pub buffer_bytes: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_rows: DEFAULT_CHUNK_ROWS,
            buffer_bytes: DEFAULT_UPLOAD_BUFFER_BYTES,
        }
    }
}

impl From<&StorageConfig> for UploadOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            chunk_rows: config.chunk_rows,
            buffer_bytes: config.upload_buffer_bytes,
        }
    }
}

/// Persists and loads indexes in a [`BlobStore`].
#[derive(Debug, Clone)]
pub struct IndexStore<S> {
    store: S,
    options: UploadOptions,
}

impl<S: BlobStore> IndexStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_options(store, UploadOptions::default())
    }

    pub fn with_options(store: S, options: UploadOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> UploadOptions {
        self.options
    }

    /// Uploads `index` under its revision-addressed name.
    pub async fn save(
        &self,
        index: &RepoEmbeddingIndex,
    ) -> StorageResult<(RepoEmbeddingIndexName, u64)> {
        let name = RepoEmbeddingIndexName::new(&index.repo_name, &index.revision);
        let size = self.upload_repo_index(name.as_str(), index).await?;
        Ok((name, size))
    }

    /// Loads the index of `repo_name` at `revision`.
    pub async fn load(
        &self,
        repo_name: &RepoName,
        revision: &CommitId,
    ) -> StorageResult<RepoEmbeddingIndex> {
        let name = RepoEmbeddingIndexName::new(repo_name, revision);
        self.download_repo_index(name.as_str()).await
    }

    /// Encodes `index` and uploads it under `key` concurrently.
    ///
    /// Both halves must succeed. The first failure drops the other half,
    /// which closes its end of the pipe.
    pub async fn upload_repo_index(
        &self,
        key: &str,
        index: &RepoEmbeddingIndex,
    ) -> StorageResult<u64> {
        let (mut writer, reader) = tokio::io::duplex(self.options.buffer_bytes.max(1));
        let chunk_rows = self.options.chunk_rows;

        let encode = async move {
            codec::encode_repo_index(&mut writer, index, chunk_rows).await?;
            writer.shutdown().await.map_err(CodecError::Io)
        };
        // A closed pipe means the uploader gave up, which is a store failure.
        let encode = async {
            encode.await.map_err(|source| match source {
                CodecError::Io(e) => StorageError::Write {
                    key: key.to_string(),
                    source: e.into(),
                },
                source => StorageError::Encode {
                    key: key.to_string(),
                    source,
                },
            })
        };
        let upload = async {
            self.store
                .upload(key, Box::new(reader))
                .await
                .map_err(|source| StorageError::Write {
                    key: key.to_string(),
                    source,
                })
        };

        let ((), size) = tokio::try_join!(encode, upload)?;
        info!(
            "Uploaded embedding index for {}@{} to '{key}' ({size} bytes)",
            index.repo_name, index.revision
        );
        Ok(size)
    }

    /// Downloads and decodes the index stored under `key`.
    ///
    /// Blobs that do not match the chunked layout are read a second time
    /// as legacy float indexes and quantized in memory. The stored blob is
    /// left untouched.
    pub async fn download_repo_index(&self, key: &str) -> StorageResult<RepoEmbeddingIndex> {
        let current = match self.decode_blob(key, codec::decode_repo_index).await? {
            Ok(index) => {
                debug!("Decoded embedding index '{key}'");
                return Ok(index);
            }
            Err(e) if e.is_corruption() => e,
            Err(e) => return Err(stream_failure(key, e)),
        };

        warn!("Blob '{key}' is not a chunked index ({current}), retrying as legacy index");
        match self.decode_blob(key, codec::decode_legacy_repo_index).await? {
            Ok(index) => {
                info!("Converted legacy embedding index '{key}' to quantized form");
                Ok(index)
            }
            Err(legacy) if legacy.is_corruption() => Err(StorageError::Corrupt {
                key: key.to_string(),
                current,
                legacy,
            }),
            Err(e) => Err(stream_failure(key, e)),
        }
    }

    /// Uploads a small value encoded in one shot.
    pub async fn upload_index<T>(&self, key: &str, value: &T) -> StorageResult<u64>
    where
        T: Encode + Sync,
    {
        let bytes = codec::encode_value(value).map_err(|source| StorageError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.store
            .upload(key, Box::new(Cursor::new(bytes)))
            .await
            .map_err(|source| StorageError::Write {
                key: key.to_string(),
                source,
            })
    }

    /// Downloads a value written by [`IndexStore::upload_index`].
    pub async fn download_index<T>(&self, key: &str) -> StorageResult<T>
    where
        T: Decode<()> + Send + 'static,
    {
        match self
            .decode_blob(key, |reader, _| codec::decode_value(reader))
            .await?
        {
            Ok(value) => Ok(value),
            Err(e) if e.is_corruption() => Err(StorageError::Decode {
                key: key.to_string(),
                source: e,
            }),
            Err(e) => Err(stream_failure(key, e)),
        }
    }

    /// Opens `key` and runs `decode` over it on the blocking pool.
    ///
    /// Dropping the returned future cancels the token handed to `decode`.
    async fn decode_blob<T, F>(&self, key: &str, decode: F) -> StorageResult<Result<T, CodecError>>
    where
        T: Send + 'static,
        F: FnOnce(&mut BlobStreamReader, &CancellationToken) -> Result<T, CodecError>
            + Send
            + 'static,
    {
        let blob = self
            .store
            .get(key)
            .await
            .map_err(|source| StorageError::Read {
                key: key.to_string(),
                source,
            })?;

        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();
        let bridge = SyncIoBridge::new(blob);

        tokio::task::spawn_blocking(move || {
            let mut reader = BufReader::new(bridge);
            decode(&mut reader, &cancel)
        })
        .await
        .map_err(|source| StorageError::Task {
            key: key.to_string(),
            source,
        })
    }
}

fn stream_failure(key: &str, error: CodecError) -> StorageError {
    match error {
        CodecError::Io(e) => StorageError::Read {
            key: key.to_string(),
            source: e.into(),
        },
        CodecError::Cancelled => StorageError::Cancelled {
            key: key.to_string(),
        },
        other => StorageError::Decode {
            key: key.to_string(),
            source: other,
        },
    }
}
