use crate::client::types::{EmbeddingSearchResult, EmbeddingSearchResults};

/// Combines per-partition responses into one ranked response.
///
/// Each kind is merged on its own: lists are concatenated in the order of
/// `partials`, sorted by descending score and cut to the requested count.
/// The sort is stable, so equal scores keep partition order.
#[must_use]
pub fn merge_search_results<I>(
    partials: I,
    code_results_count: usize,
    text_results_count: usize,
) -> EmbeddingSearchResults
where
    I: IntoIterator<Item = EmbeddingSearchResults>,
{
    let mut code_results = Vec::new();
    let mut text_results = Vec::new();
    for partial in partials {
        code_results.extend(partial.code_results);
        text_results.extend(partial.text_results);
    }

    EmbeddingSearchResults {
        code_results: rank(code_results, code_results_count),
        text_results: rank(text_results, text_results_count),
    }
}

fn rank(mut results: Vec<EmbeddingSearchResult>, limit: usize) -> Vec<EmbeddingSearchResult> {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(limit);
    results
}
