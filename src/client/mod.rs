//! Sharded search client: partitioning, fan-out and result merging.

mod http;
mod merge;
mod partition;
mod types;

pub use http::{ERROR_BODY_LIMIT, EmbeddingsClient};
pub use merge::merge_search_results;
pub use partition::{EndpointSet, RepoPartition, partition};
pub use types::{
    EmbeddingSearchResult, EmbeddingSearchResults, IsContextRequiredForChatQueryParameters,
    IsContextRequiredForChatQueryResult, MultiSearchParameters, SearchParameters,
};
