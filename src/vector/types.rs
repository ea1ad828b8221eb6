//! Core types for repository embedding indexes.
//!
//! Identifiers are newtypes so repository names, IDs and revisions cannot be
//! mixed up at call sites. All of them encode transparently, both as JSON
//! (for the search API) and in the binary index format.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vector::quantize::quantize;

/// Name of a repository, e.g. `github.com/sourcegraph/sourcegraph`.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode,
)]
#[serde(transparent)]
pub struct RepoName(String);

impl RepoName {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepoName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RepoName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Database identifier of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize, Encode, Decode)]
#[serde(transparent)]
pub struct RepoId(i32);

impl RepoId {
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commit an index was built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source location of one embedded chunk of text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct RowMetadata {
    pub file_name: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl RowMetadata {
    #[must_use]
    pub fn new(file_name: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            file_name: file_name.into(),
            start_line,
            end_line,
        }
    }
}

/// Violations of the matrix/metadata invariants of an [`EmbeddingIndex`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexShapeError {
    #[error("column dimension is zero but the matrix holds {len} values")]
    ZeroDimension { len: usize },

    #[error("matrix of {len} values is not a multiple of column dimension {dimension}")]
    RaggedMatrix { len: usize, dimension: usize },

    #[error("index has {rows} rows but {metadata} row metadata entries")]
    MetadataMismatch { rows: usize, metadata: usize },

    #[error("index has {rows} rows but {ranks} ranks")]
    RanksMismatch { rows: usize, ranks: usize },
}

/// Row-major matrix of quantized embeddings plus per-row metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmbeddingIndex {
    pub embeddings: Vec<i8>,
    pub column_dimension: usize,
    pub row_metadata: Vec<RowMetadata>,
    /// Relevance boost per row. Empty if document ranks were unavailable.
    pub ranks: Vec<f32>,
}

impl EmbeddingIndex {
    /// Builds an index by quantizing a full-precision matrix.
    pub fn from_float(
        embeddings: &[f32],
        column_dimension: usize,
        row_metadata: Vec<RowMetadata>,
        ranks: Vec<f32>,
    ) -> Result<Self, IndexShapeError> {
        let index = Self {
            embeddings: quantize(embeddings),
            column_dimension,
            row_metadata,
            ranks,
        };
        index.validate()?;
        Ok(index)
    }

    /// Number of rows in the matrix.
    #[must_use]
    pub fn rows(&self) -> usize {
        if self.column_dimension == 0 {
            0
        } else {
            self.embeddings.len() / self.column_dimension
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Returns the embedding of the nth row.
    ///
    /// # Panics
    /// Panics if `n` is not a valid row.
    #[must_use]
    pub fn row(&self, n: usize) -> &[i8] {
        let dim = self.column_dimension;
        &self.embeddings[n * dim..(n + 1) * dim]
    }

    /// Checks the matrix, metadata and ranks agree on the number of rows.
    pub fn validate(&self) -> Result<(), IndexShapeError> {
        let len = self.embeddings.len();
        if self.column_dimension == 0 {
            if len != 0 {
                return Err(IndexShapeError::ZeroDimension { len });
            }
        } else if len % self.column_dimension != 0 {
            return Err(IndexShapeError::RaggedMatrix {
                len,
                dimension: self.column_dimension,
            });
        }

        let rows = self.rows();
        if self.row_metadata.len() != rows {
            return Err(IndexShapeError::MetadataMismatch {
                rows,
                metadata: self.row_metadata.len(),
            });
        }
        if !self.ranks.is_empty() && self.ranks.len() != rows {
            return Err(IndexShapeError::RanksMismatch {
                rows,
                ranks: self.ranks.len(),
            });
        }
        Ok(())
    }
}

/// Code and text indexes of one repository at one revision.
///
/// Immutable once built: a new revision gets a new index.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoEmbeddingIndex {
    pub repo_name: RepoName,
    pub revision: CommitId,
    pub code_index: EmbeddingIndex,
    pub text_index: EmbeddingIndex,
}

impl RepoEmbeddingIndex {
    pub fn validate(&self) -> Result<(), IndexShapeError> {
        self.code_index.validate()?;
        self.text_index.validate()
    }
}

/// Full-precision index layout written before quantization existed.
///
/// Only ever decoded. The field order is the on-disk layout and must not
/// change without migrating every stored index.
#[derive(Debug, Clone, PartialEq, Default, Decode)]
#[cfg_attr(test, derive(Encode))]
pub struct LegacyEmbeddingIndex {
    pub embeddings: Vec<f32>,
    pub column_dimension: usize,
    pub row_metadata: Vec<RowMetadata>,
    pub ranks: Vec<f32>,
}

impl LegacyEmbeddingIndex {
    #[must_use]
    pub fn into_current(self) -> EmbeddingIndex {
        EmbeddingIndex {
            embeddings: quantize(&self.embeddings),
            column_dimension: self.column_dimension,
            row_metadata: self.row_metadata,
            ranks: self.ranks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Decode)]
#[cfg_attr(test, derive(Encode))]
pub struct LegacyRepoEmbeddingIndex {
    pub repo_name: RepoName,
    pub revision: CommitId,
    pub code_index: LegacyEmbeddingIndex,
    pub text_index: LegacyEmbeddingIndex,
}

impl LegacyRepoEmbeddingIndex {
    #[must_use]
    pub fn into_current(self) -> RepoEmbeddingIndex {
        RepoEmbeddingIndex {
            repo_name: self.repo_name,
            revision: self.revision,
            code_index: self.code_index.into_current(),
            text_index: self.text_index.into_current(),
        }
    }
}

/// Mean embeddings of chat messages with and without extra context, used
/// by the backend to decide whether a chat query needs code context.
#[derive(Debug, Clone, PartialEq, Default, Encode, Decode)]
pub struct ContextDetectionEmbeddingIndex {
    pub messages_with_additional_context_mean_embedding: Vec<f32>,
    pub messages_without_additional_context_mean_embedding: Vec<f32>,
}

/// Blob key of a repository index at one revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoEmbeddingIndexName(String);

impl RepoEmbeddingIndexName {
    const SUFFIX: &'static str = ".embeddingindex";

    #[must_use]
    pub fn new(repo_name: &RepoName, revision: &CommitId) -> Self {
        let flattened = repo_name.as_str().replace('/', "_");
        Self(format!("{flattened}@{revision}{}", Self::SUFFIX))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepoEmbeddingIndexName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
