use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use axum::{
	Json, Router,
	body::Body,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing,
};
use reqwest::header::AUTHORIZATION;
use serde_json::{Map, Value};
use tokio::{
	net::TcpListener,
	sync::oneshot::{self, Sender},
};
use tokio_util::sync::CancellationToken;

use scout_config::{LlmProviderConfig, Retry, SearchProviderConfig};
use scout_domain::SearchRequest;
use scout_providers::Error;

type Handler = fn(usize, Value) -> Response;

#[derive(Clone)]
struct MockState {
	calls: Arc<AtomicUsize>,
	handler: Handler,
}

async fn start_server(path: &str, handler: Handler) -> (String, Arc<AtomicUsize>, Sender<()>) {
	let calls = Arc::new(AtomicUsize::new(0));
	let state = MockState { calls: calls.clone(), handler };
	let app = Router::new().route(path, routing::post(dispatch)).with_state(state);
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind mock server.");
	let addr = listener.local_addr().expect("Failed to read mock server address.");
	let (tx, rx) = oneshot::channel();
	let server = axum::serve(listener, app).with_graceful_shutdown(async move {
		let _ = rx.await;
	});

	tokio::spawn(async move {
		let _ = server.into_future().await;
	});

	(format!("http://{addr}"), calls, tx)
}

async fn dispatch(State(state): State<MockState>, Json(payload): Json<Value>) -> Response {
	let call_index = state.calls.fetch_add(1, Ordering::SeqCst);

	(state.handler)(call_index, payload)
}

fn completion_cfg(api_base: String, retry: Retry) -> LlmProviderConfig {
	LlmProviderConfig {
		provider_id: "mock".to_string(),
		api_base,
		api_key: "secret".to_string(),
		path: "/v1/chat/completions".to_string(),
		model: "mock-model".to_string(),
		temperature: 0.0,
		timeout_ms: 5_000,
		default_headers: Map::new(),
		retry,
	}
}

fn search_cfg(api_base: String) -> SearchProviderConfig {
	SearchProviderConfig {
		provider_id: "mock".to_string(),
		api_base,
		api_key: "secret".to_string(),
		path: "/v1/search".to_string(),
		timeout_ms: 5_000,
		default_headers: Map::new(),
		retry: fast_retry(),
	}
}

fn fast_retry() -> Retry {
	Retry { max_retries: 3, base_backoff_ms: 10, max_backoff_ms: 50 }
}

fn completion_ok(text: &str) -> Response {
	(StatusCode::OK, Json(serde_json::json!({ "choices": [{ "message": { "content": text } }] })))
		.into_response()
}

#[test]
fn builds_bearer_auth_header() {
	let headers =
		scout_providers::auth_headers("secret", &Map::new()).expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
}

#[tokio::test]
async fn server_error_is_retried_then_succeeds() {
	fn handler(call_index: usize, _: Value) -> Response {
		if call_index == 0 {
			return StatusCode::INTERNAL_SERVER_ERROR.into_response();
		}

		completion_ok("{\"score\": 70}")
	}

	let (api_base, calls, shutdown) = start_server("/v1/chat/completions", handler).await;
	let cfg = completion_cfg(api_base, fast_retry());
	let text = scout_providers::completion::complete(
		&cfg,
		"Score this query.",
		Some("You are a sourcing expert."),
		&CancellationToken::new(),
	)
	.await
	.expect("Expected completion after retry.");

	assert_eq!(text, "{\"score\": 70}");
	assert_eq!(calls.load(Ordering::SeqCst), 2);

	let _ = shutdown.send(());
}

#[tokio::test]
async fn unauthorized_is_not_retried() {
	fn handler(_: usize, _: Value) -> Response {
		(StatusCode::UNAUTHORIZED, "invalid api key").into_response()
	}

	let (api_base, calls, shutdown) = start_server("/v1/chat/completions", handler).await;
	let cfg = completion_cfg(api_base, fast_retry());
	let err = scout_providers::completion::complete(&cfg, "prompt", None, &CancellationToken::new())
		.await
		.expect_err("Expected auth failure.");

	assert!(matches!(err, Error::Auth { status: 401, .. }), "Unexpected error: {err:?}");
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	let _ = shutdown.send(());
}

#[tokio::test]
async fn exhausted_retries_report_status() {
	fn handler(_: usize, _: Value) -> Response {
		StatusCode::SERVICE_UNAVAILABLE.into_response()
	}

	let (api_base, calls, shutdown) = start_server("/v1/chat/completions", handler).await;
	let retry = Retry { max_retries: 2, base_backoff_ms: 5, max_backoff_ms: 10 };
	let cfg = completion_cfg(api_base, retry);
	let err = scout_providers::completion::complete(&cfg, "prompt", None, &CancellationToken::new())
		.await
		.expect_err("Expected status failure.");

	assert!(matches!(err, Error::Status { status: 503, .. }), "Unexpected error: {err:?}");
	assert_eq!(calls.load(Ordering::SeqCst), 3);

	let _ = shutdown.send(());
}

#[tokio::test]
async fn cancellation_during_backoff_returns_cancelled() {
	fn handler(_: usize, _: Value) -> Response {
		StatusCode::BAD_GATEWAY.into_response()
	}

	let (api_base, _calls, shutdown) = start_server("/v1/chat/completions", handler).await;
	let retry = Retry { max_retries: 5, base_backoff_ms: 10_000, max_backoff_ms: 10_000 };
	let cfg = completion_cfg(api_base, retry);
	let cancel = CancellationToken::new();
	let trigger = cancel.clone();

	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(200)).await;
		trigger.cancel();
	});

	let err = tokio::time::timeout(
		Duration::from_secs(5),
		scout_providers::completion::complete(&cfg, "prompt", None, &cancel),
	)
	.await
	.expect("Cancellation must interrupt the backoff.")
	.expect_err("Expected cancellation.");

	assert!(matches!(err, Error::Cancelled), "Unexpected error: {err:?}");

	let _ = shutdown.send(());
}

#[tokio::test]
async fn cancellation_while_reading_error_body_returns_cancelled() {
	fn handler(_: usize, _: Value) -> Response {
		let chunks = futures::stream::unfold(0_u8, |step| async move {
			match step {
				0 => Some((Ok::<_, std::io::Error>("upstream ".to_string()), 1)),
				1 => {
					tokio::time::sleep(Duration::from_secs(10)).await;

					Some((Ok("failure".to_string()), 2))
				},
				_ => None,
			}
		});

		(StatusCode::INTERNAL_SERVER_ERROR, Body::from_stream(chunks)).into_response()
	}

	let (api_base, calls, shutdown) = start_server("/v1/chat/completions", handler).await;
	let cfg = completion_cfg(api_base, fast_retry());
	let cancel = CancellationToken::new();
	let trigger = cancel.clone();

	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(200)).await;
		trigger.cancel();
	});

	let err = tokio::time::timeout(
		Duration::from_secs(5),
		scout_providers::completion::complete(&cfg, "prompt", None, &cancel),
	)
	.await
	.expect("Cancellation must interrupt the error body read.")
	.expect_err("Expected cancellation.");

	assert!(matches!(err, Error::Cancelled), "Unexpected error: {err:?}");
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	let _ = shutdown.send(());
}

#[tokio::test]
async fn search_sends_request_fields_and_parses_results() {
	fn handler(_: usize, payload: Value) -> Response {
		assert_eq!(payload["query"], "\"CTO\" AND fintech");
		assert_eq!(payload["max_results"], 2);

		(
			StatusCode::OK,
			Json(serde_json::json!({
				"results": [
					{ "url": "https://a.example", "title": "A" },
					{ "url": "https://b.example", "title": "B" },
					{ "url": "https://c.example", "title": "C" }
				],
				"total_results": 42
			})),
		)
			.into_response()
	}

	let (api_base, _calls, shutdown) = start_server("/v1/search", handler).await;
	let request = SearchRequest {
		query: "\"CTO\" AND fintech".to_string(),
		country: "us".to_string(),
		language: "en".to_string(),
		max_results: 2,
	};
	let response = scout_providers::search::search(
		&search_cfg(api_base),
		&request,
		&CancellationToken::new(),
	)
	.await
	.expect("Expected search response.");

	assert_eq!(response.results.len(), 2);
	assert_eq!(response.total_results, 42);
	assert_eq!(response.results[1].rank, 2);

	let _ = shutdown.send(());
}
