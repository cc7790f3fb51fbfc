use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{Endpoint, Error, Result};
use scout_config::LlmProviderConfig;

/// Sends one chat-completions request and returns the first choice's text.
pub async fn complete(
	cfg: &LlmProviderConfig,
	prompt: &str,
	system_prompt: Option<&str>,
	cancel: &CancellationToken,
) -> Result<String> {
	let endpoint = Endpoint {
		url: format!("{}{}", cfg.api_base, cfg.path),
		api_key: &cfg.api_key,
		default_headers: &cfg.default_headers,
		timeout_ms: cfg.timeout_ms,
		retry: cfg.retry,
	};
	let body = build_body(cfg, prompt, system_prompt);
	let json = crate::send_with_retry(&endpoint, &body, cancel).await?;

	parse_completion_content(&json)
}

fn build_body(cfg: &LlmProviderConfig, prompt: &str, system_prompt: Option<&str>) -> Value {
	let mut messages = Vec::with_capacity(2);

	if let Some(system) = system_prompt.filter(|system| !system.trim().is_empty()) {
		messages.push(serde_json::json!({ "role": "system", "content": system }));
	}

	messages.push(serde_json::json!({ "role": "user", "content": prompt }));

	serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
	})
}

fn parse_completion_content(json: &Value) -> Result<String> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"));

	match content {
		Some(Value::String(text)) => Ok(text.clone()),
		// Some gateways return content as a list of typed parts.
		Some(Value::Array(parts)) => Ok(parts
			.iter()
			.filter_map(|part| part.get("text").and_then(Value::as_str))
			.collect::<Vec<_>>()
			.join("")),
		_ => Err(Error::InvalidResponse {
			message: "Completion response is missing choices[0].message.content.".to_string(),
		}),
	}
}
