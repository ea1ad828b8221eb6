//! Full-precision index files produced by the embedding job.
//!
//! The job writes plain JSON with `f32` embeddings. Importing quantizes the
//! matrices once and hands the result to the index store.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingsError, EmbeddingsResult};
use crate::vector::{CommitId, EmbeddingIndex, RepoEmbeddingIndex, RepoName, RowMetadata};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloatEmbeddingIndex {
    /// Row-major matrix, `rows * column_dimension` values.
    #[serde(default)]
    pub embeddings: Vec<f32>,
    #[serde(default)]
    pub column_dimension: usize,
    #[serde(default)]
    pub row_metadata: Vec<RowMetadata>,
    #[serde(default)]
    pub ranks: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloatRepoEmbeddingIndex {
    pub repo_name: RepoName,
    pub revision: CommitId,
    #[serde(default)]
    pub code_index: FloatEmbeddingIndex,
    #[serde(default)]
    pub text_index: FloatEmbeddingIndex,
}

impl FloatRepoEmbeddingIndex {
    /// Reads an index file from disk.
    pub fn read(path: &Path) -> EmbeddingsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| EmbeddingsError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| EmbeddingsError::InvalidInput {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Quantizes both matrices, checking their shapes.
    pub fn quantize(self) -> EmbeddingsResult<RepoEmbeddingIndex> {
        Ok(RepoEmbeddingIndex {
            repo_name: self.repo_name,
            revision: self.revision,
            code_index: into_quantized(self.code_index)?,
            text_index: into_quantized(self.text_index)?,
        })
    }
}

fn into_quantized(index: FloatEmbeddingIndex) -> EmbeddingsResult<EmbeddingIndex> {
    Ok(EmbeddingIndex::from_float(
        &index.embeddings,
        index.column_dimension,
        index.row_metadata,
        index.ranks,
    )?)
}
