use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{Endpoint, Error, Result};
use scout_config::SearchProviderConfig;
use scout_domain::{SearchRequest, SearchResponse, SearchResult};

pub async fn search(
	cfg: &SearchProviderConfig,
	request: &SearchRequest,
	cancel: &CancellationToken,
) -> Result<SearchResponse> {
	let endpoint = Endpoint {
		url: format!("{}{}", cfg.api_base, cfg.path),
		api_key: &cfg.api_key,
		default_headers: &cfg.default_headers,
		timeout_ms: cfg.timeout_ms,
		retry: cfg.retry,
	};
	let json = crate::send_with_retry(&endpoint, request, cancel).await?;

	parse_search_response(json, request.max_results)
}

fn parse_search_response(mut json: Value, max_results: u32) -> Result<SearchResponse> {
	let items = json
		.get("results")
		.or_else(|| json.get("items"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Search response is missing results array.".to_string(),
		})?;
	let mut results: Vec<SearchResult> = items
		.iter()
		.enumerate()
		.filter_map(|(position, item)| parse_result(item, position))
		.collect();
	let total_results = json
		.get("total_results")
		.or_else(|| json.get("totalResults"))
		.and_then(|v| v.as_u64())
		.unwrap_or(results.len() as u64);

	results.truncate(max_results as usize);

	let metadata = json
		.get_mut("metadata")
		.map(Value::take)
		.unwrap_or_else(|| Value::Object(Default::default()));

	Ok(SearchResponse { results, total_results, metadata })
}

fn parse_result(item: &Value, position: usize) -> Option<SearchResult> {
	let text = |keys: &[&str]| {
		keys.iter()
			.find_map(|key| item.get(*key).and_then(Value::as_str))
			.map(|value| value.trim().to_string())
	};
	let url = text(&["url", "link"]).filter(|url| !url.is_empty())?;
	let rank = item
		.get("rank")
		.or_else(|| item.get("position"))
		.and_then(|v| v.as_u64())
		.map(|rank| rank as u32)
		.unwrap_or(position as u32 + 1);

	Some(SearchResult {
		url,
		title: text(&["title"]).unwrap_or_default(),
		description: text(&["description", "snippet"]).unwrap_or_default(),
		result_type: text(&["type"]).unwrap_or_else(|| "web".to_string()),
		rank,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accepts_camel_case_total_and_defaults_rank() {
		let json = serde_json::json!({
			"results": [
				{ "url": "https://a.example", "title": "A", "description": "d", "type": "profile" },
				{ "link": "https://b.example", "snippet": "s", "rank": 9 }
			],
			"totalResults": 1200,
			"metadata": { "engine": "mock" }
		});
		let response = parse_search_response(json, 10).expect("parse failed");

		assert_eq!(response.total_results, 1_200);
		assert_eq!(response.results[0].rank, 1);
		assert_eq!(response.results[1].rank, 9);
		assert_eq!(response.results[1].description, "s");
		assert_eq!(response.results[1].result_type, "web");
		assert_eq!(response.metadata["engine"], "mock");
	}

	#[test]
	fn skips_items_without_url_and_truncates() {
		let json = serde_json::json!({
			"results": [
				{ "title": "no url" },
				{ "url": "https://a.example" },
				{ "url": "https://b.example" },
				{ "url": "https://c.example" }
			]
		});
		let response = parse_search_response(json, 2).expect("parse failed");
		let urls = response.results.iter().map(|r| r.url.as_str()).collect::<Vec<_>>();

		assert_eq!(urls, vec!["https://a.example", "https://b.example"]);
		assert_eq!(response.results[0].rank, 2);
		assert_eq!(response.total_results, 3);
	}

	#[test]
	fn missing_results_is_invalid_response() {
		let err = parse_search_response(serde_json::json!({ "data": [] }), 10)
			.expect_err("Expected invalid response.");

		assert!(matches!(err, Error::InvalidResponse { .. }));
	}
}
