//! Request and response bodies of the embeddings search API.

use serde::{Deserialize, Deserializer, Serialize};

use crate::vector::{RepoId, RepoName, RowMetadata};

/// Body of `POST {endpoint}/search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParameters {
    pub repo_name: RepoName,
    #[serde(rename = "repoID")]
    pub repo_id: RepoId,
    pub query: String,
    pub code_results_count: usize,
    pub text_results_count: usize,
    #[serde(default)]
    pub use_document_ranks: bool,
}

/// Body of `POST {endpoint}/multiSearch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSearchParameters {
    pub repo_names: Vec<RepoName>,
    #[serde(rename = "repoIDs")]
    pub repo_ids: Vec<RepoId>,
    pub query: String,
    pub code_results_count: usize,
    pub text_results_count: usize,
    #[serde(default)]
    pub use_document_ranks: bool,
    /// Asks backends to attach a debug payload to each result.
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsContextRequiredForChatQueryParameters {
    pub query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsContextRequiredForChatQueryResult {
    pub is_required: bool,
}

/// One matched row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingSearchResult {
    #[serde(flatten)]
    pub row_metadata: RowMetadata,
    /// Row of the source index this result came from.
    pub row_num: usize,
    pub content: String,
    /// Free-form payload, only present when debugging was requested.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub debug: String,
    /// Similarity assigned by the backend. Higher is better.
    #[serde(default)]
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingSearchResults {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub code_results: Vec<EmbeddingSearchResult>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub text_results: Vec<EmbeddingSearchResult>,
}

impl EmbeddingSearchResults {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code_results.is_empty() && self.text_results.is_empty()
    }
}

// Backends written in languages with nil slices send `null` for empty lists.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
