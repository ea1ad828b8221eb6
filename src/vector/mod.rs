//! Embedding index model and quantization.
//!
//! Indexes store embeddings as signed bytes. Full-precision vectors coming
//! from the embedding model are quantized once, when the index is built (or
//! when a legacy float index is read), and never again.

mod quantize;
mod types;

pub use quantize::{QUANTIZATION_SCALE, QUANTIZED_MAX, dequantize, quantize, quantize_component};
pub use types::{
    CommitId, ContextDetectionEmbeddingIndex, EmbeddingIndex, IndexShapeError,
    LegacyEmbeddingIndex, LegacyRepoEmbeddingIndex, RepoEmbeddingIndex, RepoEmbeddingIndexName,
    RepoId, RepoName, RowMetadata,
};
