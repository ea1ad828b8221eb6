//! Error types for the embeddings index store and search client
//!
//! Each concern has its own thiserror enum. [`EmbeddingsError`] wraps them
//! for the command line, where they are turned into status codes, recovery
//! hints and exit codes.

use std::path::PathBuf;

use thiserror::Error;
use tokio::task::JoinError;

use crate::storage::StorageError;

/// Errors from talking to the search backends
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("An embeddings service has not been configured")]
    NotConfigured,

    #[error("Got {names} repository names but {ids} repository IDs")]
    LengthMismatch { names: usize, ids: usize },

    #[error("Embeddings.{method} request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        method: &'static str,
        source: reqwest::Error,
    },

    #[error("Embeddings.{method} http status {status} from {endpoint}: {body}")]
    Status {
        endpoint: String,
        method: &'static str,
        status: u16,
        body: String,
    },

    #[error("Embeddings.{method} response from {endpoint} is not valid JSON: {source}")]
    Decode {
        endpoint: String,
        method: &'static str,
        source: serde_json::Error,
    },

    /// One partition of a multi-search failed, so the whole search did.
    #[error("Embeddings partition {endpoint} failed: {source}")]
    Partition {
        endpoint: String,
        source: Box<ClientError>,
    },

    #[error("Embeddings request was cancelled")]
    Cancelled,

    #[error("Embeddings request task failed: {0}")]
    Task(#[from] JoinError),

    #[error("Failed to initialize HTTP client: {0}")]
    HttpClientInit(#[source] reqwest::Error),
}

impl ClientError {
    /// The error that actually happened, looking through partition wrapping.
    #[must_use]
    pub fn root(&self) -> &ClientError {
        match self {
            Self::Partition { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Top-level error returned by the command line operations
#[derive(Error, Debug)]
pub enum EmbeddingsError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {source}")]
    InvalidInput {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid embedding index: {0}")]
    Shape(#[from] crate::vector::IndexShapeError),

    #[error("{0}")]
    General(String),
}

impl EmbeddingsError {
    /// Get a stable status code for this error type.
    pub fn status_code(&self) -> String {
        match self {
            Self::Client(e) => match e.root() {
                ClientError::NotConfigured => "NOT_CONFIGURED",
                ClientError::LengthMismatch { .. } => "INVALID_ARGUMENTS",
                ClientError::Transport { .. } => "TRANSPORT_ERROR",
                ClientError::Status { .. } => "HTTP_STATUS_ERROR",
                ClientError::Decode { .. } => "INVALID_RESPONSE",
                ClientError::Cancelled => "CANCELLED",
                ClientError::Task(_) | ClientError::Partition { .. } => "TASK_FAILED",
                ClientError::HttpClientInit(_) => "HTTP_CLIENT_INIT_ERROR",
            },
            Self::Storage(e) => match e {
                StorageError::Read { .. } => "BLOB_READ_ERROR",
                StorageError::Write { .. } => "BLOB_WRITE_ERROR",
                StorageError::Encode { .. } => "ENCODE_ERROR",
                StorageError::Decode { .. } | StorageError::Corrupt { .. } => "INDEX_CORRUPTED",
                StorageError::Cancelled { .. } => "CANCELLED",
                StorageError::Task { .. } => "TASK_FAILED",
            },
            Self::Config(_) => "CONFIG_ERROR",
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::Shape(_) => "INVALID_INDEX",
            Self::General(_) => "GENERAL_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Client(e) => match e.root() {
                ClientError::NotConfigured => vec![
                    "Set client.endpoints in .repo-embeddings/settings.toml",
                    "Or export RE_CLIENT__ENDPOINTS='[\"http://host:port\"]'",
                ],
                ClientError::Transport { .. } => vec![
                    "Check that every configured embeddings endpoint is reachable",
                    "Increase client.request_timeout_secs for slow backends",
                ],
                ClientError::Status { .. } => vec![
                    "Inspect the backend logs for the failing endpoint",
                    "Verify the repository has been indexed on that backend",
                ],
                _ => vec![],
            },
            Self::Storage(e) if e.is_corruption() => vec![
                "Re-run the embedding job for this repository revision",
                "Run 'repo-embeddings inspect' to check which blob is affected",
            ],
            Self::Storage(StorageError::Read { .. } | StorageError::Write { .. }) => vec![
                "Check that storage.blob_root exists and is writable",
                "Check disk space in the blob directory",
            ],
            Self::Config(_) => vec![
                "Fix the syntax of .repo-embeddings/settings.toml",
                "Run 'repo-embeddings config' to see the effective settings",
            ],
            Self::InvalidInput { .. } | Self::Shape(_) => vec![
                "Every row needs one embedding of columnDimension floats and one metadata entry",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type alias for command line operations
pub type EmbeddingsResult<T> = Result<T, EmbeddingsError>;
