use thiserror::Error;
use tokio::task::JoinError;

use crate::storage::blob::BlobStoreError;
use crate::storage::codec::CodecError;

/// Errors from persisting or loading indexes.
///
/// Storage failures (`Read`, `Write`) are kept apart from bad data
/// (`Encode`, `Decode`, `Corrupt`) so callers can tell an unavailable store
/// from a broken blob.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read blob '{key}': {source}")]
    Read {
        key: String,
        source: BlobStoreError,
    },

    #[error("Failed to upload blob '{key}': {source}")]
    Write {
        key: String,
        source: BlobStoreError,
    },

    #[error("Failed to encode index for blob '{key}': {source}")]
    Encode { key: String, source: CodecError },

    #[error("Failed to decode blob '{key}': {source}")]
    Decode { key: String, source: CodecError },

    #[error(
        "Blob '{key}' matches neither the chunked index layout ({current}) \
         nor the legacy layout ({legacy})"
    )]
    Corrupt {
        key: String,
        current: CodecError,
        legacy: CodecError,
    },

    #[error("Decoding blob '{key}' was cancelled")]
    Cancelled { key: String },

    #[error("Decode task for blob '{key}' failed: {source}")]
    Task { key: String, source: JoinError },
}

impl StorageError {
    /// True when the blob content is at fault rather than the store.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        match self {
            Self::Encode { source, .. } | Self::Decode { source, .. } => source.is_corruption(),
            Self::Corrupt { .. } => true,
            _ => false,
        }
    }

    /// Key of the blob the failed operation was working on.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Read { key, .. }
            | Self::Write { key, .. }
            | Self::Encode { key, .. }
            | Self::Decode { key, .. }
            | Self::Corrupt { key, .. }
            | Self::Cancelled { key }
            | Self::Task { key, .. } => key,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
