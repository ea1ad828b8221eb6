//! Search client against in-process fake partitions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use parking_lot::Mutex;
use repo_embeddings::client::{ERROR_BODY_LIMIT, IsContextRequiredForChatQueryResult};
use repo_embeddings::{
    ClientError, EmbeddingSearchResult, EmbeddingSearchResults, EmbeddingsClient, EndpointSet,
    MultiSearchParameters, RepoId, RepoName, RowMetadata, SearchParameters,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
enum Behavior {
    Respond(EmbeddingSearchResults),
    Fail(StatusCode, String),
    Hang,
}

#[derive(Clone)]
struct PartitionState {
    behavior: Behavior,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

struct FakePartition {
    url: String,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

impl FakePartition {
    fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().clone()
    }
}

async fn respond(state: &PartitionState, method: &str, body: Value) -> Response {
    state.requests.lock().push((method.to_string(), body));
    match &state.behavior {
        Behavior::Respond(results) => Json(results.clone()).into_response(),
        Behavior::Fail(status, body) => (*status, body.clone()).into_response(),
        Behavior::Hang => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Json(EmbeddingSearchResults::default()).into_response()
        }
    }
}

async fn search(State(state): State<PartitionState>, Json(body): Json<Value>) -> Response {
    respond(&state, "search", body).await
}

async fn multi_search(State(state): State<PartitionState>, Json(body): Json<Value>) -> Response {
    respond(&state, "multiSearch", body).await
}

async fn context_required(
    State(state): State<PartitionState>,
    Json(body): Json<Value>,
) -> Json<IsContextRequiredForChatQueryResult> {
    state
        .requests
        .lock()
        .push(("isContextRequiredForChatQuery".to_string(), body));
    Json(IsContextRequiredForChatQueryResult { is_required: true })
}

async fn spawn_partition(behavior: Behavior) -> FakePartition {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = PartitionState {
        behavior,
        requests: Arc::clone(&requests),
    };
    let app = Router::new()
        .route("/search", post(search))
        .route("/multiSearch", post(multi_search))
        .route("/isContextRequiredForChatQuery", post(context_required))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakePartition {
        url: format!("http://{addr}"),
        requests,
    }
}

fn result(file: &str, score: f32) -> EmbeddingSearchResult {
    EmbeddingSearchResult {
        row_metadata: RowMetadata::new(file, 0, 10),
        row_num: 1,
        content: format!("contents of {file}"),
        debug: String::new(),
        score,
    }
}

fn results(code: &[(&str, f32)], text: &[(&str, f32)]) -> EmbeddingSearchResults {
    EmbeddingSearchResults {
        code_results: code.iter().map(|(f, s)| result(f, *s)).collect(),
        text_results: text.iter().map(|(f, s)| result(f, *s)).collect(),
    }
}

fn client_for(partitions: &[&FakePartition]) -> EmbeddingsClient {
    EmbeddingsClient::with_http_client(
        reqwest::Client::new(),
        EndpointSet::new(partitions.iter().map(|p| p.url.clone())),
    )
}

// Enough repositories that every partition is all but certain to get some.
fn multi_params(repos: usize, code: usize, text: usize) -> MultiSearchParameters {
    MultiSearchParameters {
        repo_names: (0..repos)
            .map(|i| RepoName::new(format!("github.com/org/repo-{i}")))
            .collect(),
        repo_ids: (0..repos).map(|i| RepoId::new(i as i32)).collect(),
        query: "how are retries configured".to_string(),
        code_results_count: code,
        text_results_count: text,
        use_document_ranks: true,
        debug: false,
    }
}

fn files(results: &[EmbeddingSearchResult]) -> Vec<&str> {
    results
        .iter()
        .map(|r| r.row_metadata.file_name.as_str())
        .collect()
}

#[tokio::test]
async fn test_multi_search_merges_partitions_by_score() {
    let a = spawn_partition(Behavior::Respond(results(
        &[("a1", 0.9), ("a2", 0.1)],
        &[("ta", 0.2)],
    )))
    .await;
    let b = spawn_partition(Behavior::Respond(results(&[("b1", 0.5)], &[("tb", 0.8)]))).await;
    let c = spawn_partition(Behavior::Respond(results(
        &[("c1", 0.7), ("c2", 0.3)],
        &[("tc", 0.5)],
    )))
    .await;
    let client = client_for(&[&a, &b, &c]);

    let merged = client.multi_search(&multi_params(40, 3, 10)).await.unwrap();

    assert_eq!(files(&merged.code_results), vec!["a1", "c1", "b1"]);
    assert_eq!(files(&merged.text_results), vec!["tb", "tc", "ta"]);
}

#[tokio::test]
async fn test_multi_search_sends_each_partition_only_its_repos() {
    let a = spawn_partition(Behavior::Respond(EmbeddingSearchResults::default())).await;
    let b = spawn_partition(Behavior::Respond(EmbeddingSearchResults::default())).await;
    let client = client_for(&[&a, &b]);
    let params = multi_params(40, 5, 5);

    client.multi_search(&params).await.unwrap();

    let mut seen = Vec::new();
    for partition in [&a, &b] {
        let requests = partition.requests();
        assert_eq!(requests.len(), 1, "one request per partition");
        let (method, body) = &requests[0];
        assert_eq!(method, "multiSearch");
        assert_eq!(body["query"], "how are retries configured");
        assert_eq!(body["codeResultsCount"], 5);
        assert_eq!(body["useDocumentRanks"], true);

        let names = body["repoNames"].as_array().unwrap();
        let ids = body["repoIDs"].as_array().unwrap();
        assert_eq!(names.len(), ids.len());
        for (name, id) in names.iter().zip(ids) {
            let expected = format!("github.com/org/repo-{}", id.as_i64().unwrap());
            assert_eq!(name.as_str().unwrap(), expected);
            seen.push(expected);
        }
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 40);
}

#[tokio::test]
async fn test_one_failing_partition_fails_the_search() {
    let ok = spawn_partition(Behavior::Respond(results(&[("ok", 1.0)], &[]))).await;
    let broken = spawn_partition(Behavior::Fail(
        StatusCode::INTERNAL_SERVER_ERROR,
        "index not loaded".to_string(),
    ))
    .await;
    let client = client_for(&[&ok, &broken]);

    let err = client
        .multi_search(&multi_params(40, 5, 5))
        .await
        .unwrap_err();

    match &err {
        ClientError::Partition { endpoint, source } => {
            assert_eq!(endpoint, &broken.url);
            assert!(
                matches!(
                    source.as_ref(),
                    ClientError::Status { status: 500, body, .. } if body == "index not loaded"
                ),
                "{source}"
            );
        }
        other => panic!("expected a partition error, got {other}"),
    }
}

#[tokio::test]
async fn test_failure_does_not_wait_for_slow_partition() {
    let slow = spawn_partition(Behavior::Hang).await;
    let broken = spawn_partition(Behavior::Fail(
        StatusCode::SERVICE_UNAVAILABLE,
        "overloaded".to_string(),
    ))
    .await;
    let client = client_for(&[&slow, &broken]);

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        client.multi_search(&multi_params(40, 5, 5)),
    )
    .await
    .expect("multi-search should fail fast instead of waiting for the slow partition");

    assert!(matches!(
        outcome,
        Err(ClientError::Partition { ref endpoint, .. }) if *endpoint == broken.url
    ));
}

#[tokio::test]
async fn test_caller_cancellation_stops_fan_out() {
    let a = spawn_partition(Behavior::Hang).await;
    let b = spawn_partition(Behavior::Hang).await;
    let client = client_for(&[&a, &b]);
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        client.multi_search_with_cancel(&multi_params(10, 1, 1), &cancel),
    )
    .await
    .expect("cancellation should end the search");
    assert!(matches!(outcome, Err(ClientError::Cancelled)));
}

#[tokio::test]
async fn test_error_body_is_truncated() {
    let broken = spawn_partition(Behavior::Fail(StatusCode::BAD_GATEWAY, "x".repeat(5000))).await;
    let client = client_for(&[&broken]);

    let err = client
        .multi_search(&multi_params(3, 1, 1))
        .await
        .unwrap_err();
    match err.root() {
        ClientError::Status { status, body, .. } => {
            assert_eq!(*status, 502);
            assert_eq!(body.len(), ERROR_BODY_LIMIT);
        }
        other => panic!("expected a status error, got {other}"),
    }
}

#[tokio::test]
async fn test_single_search_returns_response_unmodified() {
    // Unsorted on purpose: single-repo search must not reorder.
    let partition = spawn_partition(Behavior::Respond(results(
        &[("low", 0.1), ("high", 0.9)],
        &[("doc", 0.4)],
    )))
    .await;
    let client = EmbeddingsClient::with_http_client(
        reqwest::Client::new(),
        EndpointSet::new([format!("{}/", partition.url)]),
    );
    let params = SearchParameters {
        repo_name: RepoName::new("github.com/sourcegraph/sourcegraph"),
        repo_id: RepoId::new(11),
        query: "graphql resolvers".to_string(),
        code_results_count: 1,
        text_results_count: 1,
        use_document_ranks: false,
    };

    let response = client.search(&params).await.unwrap();
    assert_eq!(files(&response.code_results), vec!["low", "high"]);
    assert_eq!(files(&response.text_results), vec!["doc"]);

    let requests = partition.requests();
    assert_eq!(requests.len(), 1);
    let (method, body) = &requests[0];
    assert_eq!(method, "search");
    assert_eq!(body["repoName"], "github.com/sourcegraph/sourcegraph");
    assert_eq!(body["repoID"], 11);
}

#[tokio::test]
async fn test_context_required_asks_first_endpoint_only() {
    let a = spawn_partition(Behavior::Respond(EmbeddingSearchResults::default())).await;
    let b = spawn_partition(Behavior::Respond(EmbeddingSearchResults::default())).await;
    let client = client_for(&[&a, &b]);

    assert!(
        client
            .is_context_required_for_chat_query("what does this repo do")
            .await
            .unwrap()
    );

    let endpoints = client.endpoints();
    let first = endpoints.first().unwrap();
    let (asked, other) = if a.url == first { (&a, &b) } else { (&b, &a) };
    let requests = asked.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].1["query"], "what does this repo do");
    assert!(other.requests().is_empty());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_transport_error() {
    // Bind and drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = EmbeddingsClient::with_http_client(
        reqwest::Client::new(),
        EndpointSet::new([format!("http://{addr}")]),
    );
    let err = client
        .multi_search(&multi_params(2, 1, 1))
        .await
        .unwrap_err();
    assert!(
        matches!(err.root(), ClientError::Transport { method: "multiSearch", .. }),
        "{err}"
    );
}
