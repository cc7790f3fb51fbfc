pub mod completion;
pub mod search;

mod error;

pub use error::{Error, Result};

use std::time::Duration;

use reqwest::{
	Client, Response, StatusCode,
	header::{AUTHORIZATION, HeaderMap, HeaderName, RETRY_AFTER},
};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use scout_config::Retry;

const MAX_ERROR_BODY_CHARS: usize = 500;

/// One provider endpoint with the settings shared by every request to it.
pub struct Endpoint<'a> {
	pub url: String,
	pub api_key: &'a str,
	pub default_headers: &'a Map<String, Value>,
	pub timeout_ms: u64,
	pub retry: Retry,
}

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// POSTs `body` as JSON and returns the decoded JSON response.
///
/// Connect errors, timeouts, HTTP 429 and 5xx are retried up to `retry.max_retries` times with
/// exponential backoff. 401 and 403 fail immediately with [`Error::Auth`]. Both the request and
/// every backoff sleep race `cancel`.
pub async fn send_with_retry<T>(
	endpoint: &Endpoint<'_>,
	body: &T,
	cancel: &CancellationToken,
) -> Result<Value>
where
	T: Serialize + ?Sized,
{
	let client = Client::builder().timeout(Duration::from_millis(endpoint.timeout_ms)).build()?;
	let headers = auth_headers(endpoint.api_key, endpoint.default_headers)?;
	let mut attempt = 0_u32;

	loop {
		let request = client.post(&endpoint.url).headers(headers.clone()).json(body).send();
		let outcome = tokio::select! {
			_ = cancel.cancelled() => return Err(Error::Cancelled),
			outcome = request => outcome,
		};
		let (reason, retry_after) = match outcome {
			Ok(response) if response.status().is_success() => {
				let text = tokio::select! {
					_ = cancel.cancelled() => return Err(Error::Cancelled),
					text = response.text() => text?,
				};

				return Ok(serde_json::from_str(&text)?);
			},
			Ok(response) => {
				let status = response.status();
				let retry_after = retry_after_hint(&response);
				let body = tokio::select! {
					_ = cancel.cancelled() => return Err(Error::Cancelled),
					text = response.text() => truncate(&text.unwrap_or_default()),
				};

				if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
					return Err(Error::Auth { status: status.as_u16(), message: body });
				}
				if !is_retryable_status(status) || attempt >= endpoint.retry.max_retries {
					return Err(Error::Status { status: status.as_u16(), body });
				}

				(format!("HTTP {status}"), retry_after)
			},
			Err(err) => {
				if !(err.is_timeout() || err.is_connect()) || attempt >= endpoint.retry.max_retries
				{
					return Err(err.into());
				}

				(err.to_string(), None)
			},
		};

		attempt += 1;

		let delay = retry_after
			.map(|hint| hint.min(Duration::from_millis(endpoint.retry.max_backoff_ms)))
			.unwrap_or_else(|| backoff(&endpoint.retry, attempt));

		tracing::warn!(
			url = %endpoint.url,
			attempt,
			delay_ms = delay.as_millis() as u64,
			reason = %reason,
			"Retrying provider request."
		);

		tokio::select! {
			_ = cancel.cancelled() => return Err(Error::Cancelled),
			_ = tokio::time::sleep(delay) => {},
		}
	}
}

/// `base * 2^(attempt - 1)`, capped at `max_backoff_ms`.
pub fn backoff(retry: &Retry, attempt: u32) -> Duration {
	let factor = 1_u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);

	Duration::from_millis(retry.base_backoff_ms.saturating_mul(factor).min(retry.max_backoff_ms))
}

fn is_retryable_status(status: StatusCode) -> bool {
	status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_after_hint(response: &Response) -> Option<Duration> {
	if response.status() != StatusCode::TOO_MANY_REQUESTS {
		return None;
	}

	response
		.headers()
		.get(RETRY_AFTER)
		.and_then(|value| value.to_str().ok())
		.and_then(|raw| raw.trim().parse::<u64>().ok())
		.map(Duration::from_secs)
}

fn truncate(text: &str) -> String {
	if text.chars().count() <= MAX_ERROR_BODY_CHARS {
		return text.to_string();
	}

	let mut out: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();

	out.push_str("...");

	out
}
