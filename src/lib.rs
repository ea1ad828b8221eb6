//! Quantized embedding index storage and sharded search client for code search.

pub mod client;
pub mod config;
pub mod display;
pub mod error;
pub mod import;
pub mod io;
pub mod storage;
pub mod vector;

// Explicit exports for better API clarity
pub use client::{
    EmbeddingSearchResult, EmbeddingSearchResults, EmbeddingsClient, EndpointSet,
    MultiSearchParameters, SearchParameters,
};
pub use config::Settings;
pub use error::{ClientError, ClientResult, EmbeddingsError, EmbeddingsResult};
pub use storage::{
    BlobStore, IndexStore, LocalBlobStore, MemoryBlobStore, StorageError, StorageResult,
};
pub use vector::{
    CommitId, EmbeddingIndex, RepoEmbeddingIndex, RepoEmbeddingIndexName, RepoId, RepoName,
    RowMetadata, quantize,
};
