//! HTTP client for the embeddings search backends.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::merge::merge_search_results;
use crate::client::partition::{EndpointSet, partition};
use crate::client::types::{
    EmbeddingSearchResults, IsContextRequiredForChatQueryParameters,
    IsContextRequiredForChatQueryResult, MultiSearchParameters, SearchParameters,
};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Bytes of a failed response body kept in the error.
pub const ERROR_BODY_LIMIT: usize = 200;

/// Client for a sharded set of embeddings backends.
///
/// The endpoint set can be replaced at any time. Every call works on the
/// snapshot taken when it started.
#[derive(Debug)]
pub struct EmbeddingsClient {
    http: reqwest::Client,
    endpoints: RwLock<Arc<EndpointSet>>,
}

impl EmbeddingsClient {
    /// Builds a client with the timeouts and endpoints from `config`.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(ClientError::HttpClientInit)?;
        Ok(Self::with_http_client(
            http,
            EndpointSet::new(config.endpoints.iter().cloned()),
        ))
    }

    pub fn with_http_client(http: reqwest::Client, endpoints: EndpointSet) -> Self {
        Self {
            http,
            endpoints: RwLock::new(Arc::new(endpoints)),
        }
    }

    /// Current endpoint snapshot.
    #[must_use]
    pub fn endpoints(&self) -> Arc<EndpointSet> {
        Arc::clone(&self.endpoints.read())
    }

    /// Replaces the endpoint set. In-flight requests keep their snapshot.
    pub fn set_endpoints(&self, endpoints: EndpointSet) {
        info!("Embeddings endpoints updated: {} endpoint(s)", endpoints.len());
        *self.endpoints.write() = Arc::new(endpoints);
    }

    /// Searches a single repository on the endpoint that owns it.
    pub async fn search(&self, params: &SearchParameters) -> ClientResult<EmbeddingSearchResults> {
        let endpoints = self.endpoints();
        let endpoint = endpoints.get(params.repo_name.as_str())?;
        post_json(&self.http, endpoint, "search", params).await
    }

    /// Searches many repositories across all partitions and merges the results.
    pub async fn multi_search(
        &self,
        params: &MultiSearchParameters,
    ) -> ClientResult<EmbeddingSearchResults> {
        self.multi_search_with_cancel(params, &CancellationToken::new())
            .await
    }

    /// Like [`EmbeddingsClient::multi_search`], stopping early once `cancel`
    /// fires.
    ///
    /// Any failing partition fails the whole call and stops the remaining
    /// requests. No partial results are returned.
    pub async fn multi_search_with_cancel(
        &self,
        params: &MultiSearchParameters,
        cancel: &CancellationToken,
    ) -> ClientResult<EmbeddingSearchResults> {
        let endpoints = self.endpoints();
        let partitions = partition(&params.repo_names, &params.repo_ids, &endpoints)?;
        debug!(
            "Fanning out multi-search for {} repos to {} partition(s)",
            params.repo_names.len(),
            partitions.len()
        );

        let token = cancel.child_token();
        let mut tasks = JoinSet::new();
        let count = partitions.len();
        for (slot, (endpoint, part)) in partitions.into_iter().enumerate() {
            let args = MultiSearchParameters {
                repo_names: part.repo_names,
                repo_ids: part.repo_ids,
                query: params.query.clone(),
                code_results_count: params.code_results_count,
                text_results_count: params.text_results_count,
                use_document_ranks: params.use_document_ranks,
                debug: params.debug,
            };
            let http = self.http.clone();
            let token = token.clone();
            tasks.spawn(async move {
                let result = tokio::select! {
                    biased;
                    () = token.cancelled() => Err(ClientError::Cancelled),
                    result = post_json(&http, &endpoint, "multiSearch", &args) => result,
                };
                (slot, endpoint, result)
            });
        }

        let mut partials: Vec<Option<EmbeddingSearchResults>> = vec![None; count];
        while let Some(joined) = tasks.join_next().await {
            let (slot, endpoint, result) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    token.cancel();
                    tasks.abort_all();
                    return Err(ClientError::Task(e));
                }
            };
            match result {
                Ok(results) => partials[slot] = Some(results),
                Err(ClientError::Cancelled) => {
                    tasks.abort_all();
                    return Err(ClientError::Cancelled);
                }
                Err(source) => {
                    warn!("Embeddings partition {endpoint} failed: {source}");
                    token.cancel();
                    tasks.abort_all();
                    return Err(ClientError::Partition {
                        endpoint,
                        source: Box::new(source),
                    });
                }
            }
        }

        Ok(merge_search_results(
            partials.into_iter().flatten(),
            params.code_results_count,
            params.text_results_count,
        ))
    }

    /// Asks the default endpoint whether a chat query needs repository
    /// context.
    pub async fn is_context_required_for_chat_query(&self, query: &str) -> ClientResult<bool> {
        let endpoints = self.endpoints();
        let endpoint = endpoints.first().ok_or(ClientError::NotConfigured)?;
        let params = IsContextRequiredForChatQueryParameters {
            query: query.to_string(),
        };
        let result: IsContextRequiredForChatQueryResult =
            post_json(&self.http, endpoint, "isContextRequiredForChatQuery", &params).await?;
        Ok(result.is_required)
    }
}

/// Joins `endpoint` and `method` with exactly one `/` inserted if missing.
fn method_url(endpoint: &str, method: &str) -> String {
    if endpoint.ends_with('/') {
        format!("{endpoint}{method}")
    } else {
        format!("{endpoint}/{method}")
    }
}

async fn post_json<P, T>(
    http: &reqwest::Client,
    endpoint: &str,
    method: &'static str,
    payload: &P,
) -> ClientResult<T>
where
    P: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let url = method_url(endpoint, method);
    debug!("POST {url}");

    let transport = |source| ClientError::Transport {
        endpoint: endpoint.to_string(),
        method,
        source,
    };
    let response = http
        .post(&url)
        .json(payload)
        .send()
        .await
        .map_err(transport)?;

    let status = response.status();
    if !status.is_success() {
        let body = body_excerpt(response).await;
        return Err(ClientError::Status {
            endpoint: endpoint.to_string(),
            method,
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await.map_err(transport)?;
    serde_json::from_slice(&bytes).map_err(|source| ClientError::Decode {
        endpoint: endpoint.to_string(),
        method,
        source,
    })
}

/// Reads at most [`ERROR_BODY_LIMIT`] bytes of `response`, ignoring errors.
async fn body_excerpt(mut response: reqwest::Response) -> String {
    let mut body = Vec::with_capacity(ERROR_BODY_LIMIT);
    while body.len() < ERROR_BODY_LIMIT {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(ERROR_BODY_LIMIT - body.len());
                body.extend_from_slice(&chunk[..take]);
            }
            Ok(None) | Err(_) => break,
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}
