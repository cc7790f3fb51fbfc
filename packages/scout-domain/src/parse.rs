//! Tolerant parsing of completion-service output.
//!
//! Every entry point tries three tiers in order: a direct JSON parse of the fenced or embedded
//! payload, a line-oriented repair of unescaped quotes inside known string fields, and regex
//! extraction of individual fields. Score parsing never fails; it degrades to a fixed
//! low-confidence record.

use std::collections::HashSet;

use regex::Regex;
use serde_json::{Map, Value};

use crate::{
	model::{Pass1Breakdown, Pass1Score, Pass2Breakdown, Pass2Score, ParseTier},
	scoring::clamp_score,
};

pub const FALLBACK_SCORE: f64 = 15.0;
pub const FALLBACK_RATIONALE: &str = "Failed to parse scoring response.";

const LIST_KEYS: &[&str] = &["queries", "results", "items", "data"];
const QUERY_KEYS: &[&str] = &["query", "boolean_query", "booleanQuery", "search_query"];
const RATIONALE_KEYS: &[&str] = &["rationale", "reasoning", "explanation", "reason"];
const TOTAL_KEYS: &[&str] = &["score", "total", "total_score", "totalScore"];
const BREAKDOWN_KEYS: &[&str] = &["breakdown", "scores", "sub_scores", "subScores"];

const PERSONA_FIT_KEYS: &[&str] = &["persona_fit", "personaFit", "persona_match"];
const BOOLEAN_PRECISION_KEYS: &[&str] = &["boolean_precision", "booleanPrecision", "precision"];
const REACH_KEYS: &[&str] = &["reach", "coverage"];

const RESULT_RELEVANCE_KEYS: &[&str] = &["result_relevance", "resultRelevance", "relevance"];
const RESULT_QUALITY_KEYS: &[&str] = &["result_quality", "resultQuality", "quality"];
const DIVERSITY_KEYS: &[&str] = &["diversity"];
const RELEVANT_COUNT_KEYS: &[&str] = &["relevant_count", "relevantCount", "relevant_results"];
const TOP_MATCH_KEYS: &[&str] =
	&["top_matches", "topMatches", "top_match_indices", "matching_indices"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedQuery {
	pub query: String,
	pub rationale: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedQueries {
	pub queries: Vec<GeneratedQuery>,
	pub tier: ParseTier,
}

/// Parses a generation response into validated, case-insensitively deduplicated queries.
/// Returns an empty list with [`ParseTier::Fallback`] when nothing can be recovered.
pub fn parse_generated_queries(text: &str) -> ParsedQueries {
	let candidate = json_candidate(text);

	if let Some(queries) = parse_json(&candidate).as_ref().and_then(queries_from_value) {
		return ParsedQueries { queries: dedupe_queries(queries), tier: ParseTier::Direct };
	}

	let string_fields: Vec<&str> = QUERY_KEYS.iter().chain(RATIONALE_KEYS).copied().collect();
	let repaired = repair_unescaped_quotes(&candidate, &string_fields);

	if let Some(queries) = parse_json(&repaired).as_ref().and_then(queries_from_value) {
		return ParsedQueries { queries: dedupe_queries(queries), tier: ParseTier::Repaired };
	}

	let extracted = dedupe_queries(extract_queries(text));

	if !extracted.is_empty() {
		return ParsedQueries { queries: extracted, tier: ParseTier::Extracted };
	}

	ParsedQueries { queries: Vec::new(), tier: ParseTier::Fallback }
}

pub fn parse_pass1_score(text: &str) -> Pass1Score {
	parse_score(text, pass1_from_value).unwrap_or_else(fallback_pass1)
}

pub fn parse_pass2_score(text: &str) -> Pass2Score {
	parse_score(text, pass2_from_value).unwrap_or_else(fallback_pass2)
}

pub fn fallback_pass1() -> Pass1Score {
	Pass1Score {
		score: FALLBACK_SCORE,
		breakdown: Pass1Breakdown::default(),
		rationale: FALLBACK_RATIONALE.to_string(),
		tier: ParseTier::Fallback,
	}
}

pub fn fallback_pass2() -> Pass2Score {
	Pass2Score {
		score: FALLBACK_SCORE,
		breakdown: Pass2Breakdown::default(),
		rationale: FALLBACK_RATIONALE.to_string(),
		relevant_count: 0,
		top_matches: Vec::new(),
		tier: ParseTier::Fallback,
	}
}

/// Key used to decide whether two queries are the same: lowercase with collapsed whitespace.
pub fn normalize_query_key(query: &str) -> String {
	query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Drops empty queries and case/whitespace-insensitive duplicates. The first occurrence wins.
pub fn dedupe_queries(queries: Vec<GeneratedQuery>) -> Vec<GeneratedQuery> {
	let mut seen = HashSet::new();
	let mut out = Vec::with_capacity(queries.len());

	for item in queries {
		let query = item.query.trim();

		if query.is_empty() {
			continue;
		}
		if seen.insert(normalize_query_key(query)) {
			out.push(GeneratedQuery {
				query: query.to_string(),
				rationale: item.rationale.trim().to_string(),
			});
		}
	}

	out
}

fn parse_score<T>(text: &str, build: fn(&Value, ParseTier) -> Option<T>) -> Option<T> {
	let candidate = json_candidate(text);

	if let Some(score) = parse_json(&candidate).and_then(|value| build(&value, ParseTier::Direct))
	{
		return Some(score);
	}

	let repaired = repair_unescaped_quotes(&candidate, RATIONALE_KEYS);

	if let Some(score) = parse_json(&repaired).and_then(|value| build(&value, ParseTier::Repaired))
	{
		return Some(score);
	}

	build(&Value::Object(extract_score_fields(text)), ParseTier::Extracted)
}

fn pass1_from_value(value: &Value, tier: ParseTier) -> Option<Pass1Score> {
	let obj = score_object(value)?;
	let breakdown_obj = field(obj, BREAKDOWN_KEYS).and_then(Value::as_object);
	let persona_fit = sub_score(obj, breakdown_obj, PERSONA_FIT_KEYS);
	let boolean_precision = sub_score(obj, breakdown_obj, BOOLEAN_PRECISION_KEYS);
	let reach = sub_score(obj, breakdown_obj, REACH_KEYS);
	let has_breakdown = persona_fit.is_some() || boolean_precision.is_some() || reach.is_some();
	let breakdown = Pass1Breakdown {
		persona_fit: persona_fit.unwrap_or(0.0),
		boolean_precision: boolean_precision.unwrap_or(0.0),
		reach: reach.unwrap_or(0.0),
	}
	.clamped();
	let total = field(obj, TOTAL_KEYS)
		.and_then(as_number)
		.or_else(|| has_breakdown.then(|| breakdown.total()))?;

	Some(Pass1Score {
		score: clamp_score(total),
		breakdown,
		rationale: string_field(obj, RATIONALE_KEYS).unwrap_or_default(),
		tier,
	})
}

fn pass2_from_value(value: &Value, tier: ParseTier) -> Option<Pass2Score> {
	let obj = score_object(value)?;
	let breakdown_obj = field(obj, BREAKDOWN_KEYS).and_then(Value::as_object);
	let result_relevance = sub_score(obj, breakdown_obj, RESULT_RELEVANCE_KEYS);
	let result_quality = sub_score(obj, breakdown_obj, RESULT_QUALITY_KEYS);
	let diversity = sub_score(obj, breakdown_obj, DIVERSITY_KEYS);
	let has_breakdown =
		result_relevance.is_some() || result_quality.is_some() || diversity.is_some();
	let breakdown = Pass2Breakdown {
		result_relevance: result_relevance.unwrap_or(0.0),
		result_quality: result_quality.unwrap_or(0.0),
		diversity: diversity.unwrap_or(0.0),
	}
	.clamped();
	let total = field(obj, TOTAL_KEYS)
		.and_then(as_number)
		.or_else(|| has_breakdown.then(|| breakdown.total()))?;
	let relevant_count = field(obj, RELEVANT_COUNT_KEYS)
		.and_then(as_number)
		.filter(|count| *count >= 0.0)
		.map(|count| count.round() as u32)
		.unwrap_or(0);
	let top_matches = field(obj, TOP_MATCH_KEYS)
		.and_then(Value::as_array)
		.map(|items| {
			items
				.iter()
				.filter_map(as_number)
				.filter(|index| *index >= 0.0)
				.map(|index| index as usize)
				.collect()
		})
		.unwrap_or_default();

	Some(Pass2Score {
		score: clamp_score(total),
		breakdown,
		rationale: string_field(obj, RATIONALE_KEYS).unwrap_or_default(),
		relevant_count,
		top_matches,
		tier,
	})
}

fn score_object(value: &Value) -> Option<&Map<String, Value>> {
	match value {
		Value::Object(obj) => Some(obj),
		Value::Array(items) => items.first().and_then(Value::as_object),
		_ => None,
	}
}

fn sub_score(
	obj: &Map<String, Value>,
	breakdown: Option<&Map<String, Value>>,
	keys: &[&str],
) -> Option<f64> {
	breakdown.and_then(|inner| field(inner, keys)).or_else(|| field(obj, keys)).and_then(as_number)
}

fn queries_from_value(value: &Value) -> Option<Vec<GeneratedQuery>> {
	let items = match value {
		Value::Array(items) => items,
		Value::Object(obj) => field(obj, LIST_KEYS).and_then(Value::as_array)?,
		_ => return None,
	};

	Some(items.iter().filter_map(generated_from_item).collect())
}

fn generated_from_item(item: &Value) -> Option<GeneratedQuery> {
	match item {
		Value::String(query) => {
			Some(GeneratedQuery { query: query.clone(), rationale: String::new() })
		},
		Value::Object(obj) => Some(GeneratedQuery {
			query: string_field(obj, QUERY_KEYS)?,
			rationale: string_field(obj, RATIONALE_KEYS).unwrap_or_default(),
		}),
		_ => None,
	}
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
	keys.iter().find_map(|key| obj.get(*key)).or_else(|| {
		obj.iter()
			.find(|(name, _)| keys.iter().any(|key| name.eq_ignore_ascii_case(key)))
			.map(|(_, value)| value)
	})
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
	field(obj, keys).and_then(Value::as_str).map(|value| value.trim().to_string())
}

fn as_number(value: &Value) -> Option<f64> {
	let number = match value {
		Value::Number(number) => number.as_f64(),
		Value::String(raw) => raw.trim().trim_end_matches('%').parse::<f64>().ok(),
		_ => None,
	};

	number.filter(|number| number.is_finite())
}

fn parse_json(candidate: &str) -> Option<Value> {
	serde_json::from_str(candidate).ok()
}

/// Fence-stripped, fragment-extracted text with trailing commas removed.
fn json_candidate(text: &str) -> String {
	let stripped = strip_markdown_fences(text);
	let fragment = extract_json_fragment(stripped).unwrap_or(stripped);

	remove_trailing_commas(fragment)
}

fn strip_markdown_fences(text: &str) -> &str {
	let trimmed = text.trim();
	let Some(open) = trimmed.find("```") else {
		return trimmed;
	};
	let after = &trimmed[open + 3..];
	// Skip a language tag such as `json` on the fence line.
	let body_start = match after.find('\n') {
		Some(newline) if after[..newline].trim().chars().all(|c| c.is_ascii_alphanumeric()) =>
			newline + 1,
		_ => 0,
	};
	let body = &after[body_start..];

	match body.find("```") {
		Some(close) => body[..close].trim(),
		None => body.trim(),
	}
}

/// First balanced `{...}` or `[...]` in `text`, ignoring delimiters inside strings.
fn extract_json_fragment(text: &str) -> Option<&str> {
	let start = text.find(['{', '['])?;
	let (open, close) = if text[start..].starts_with('{') { ('{', '}') } else { ('[', ']') };
	let mut depth = 0_usize;
	let mut in_string = false;
	let mut escape_next = false;

	for (offset, c) in text[start..].char_indices() {
		if escape_next {
			escape_next = false;

			continue;
		}
		if c == '\\' && in_string {
			escape_next = true;

			continue;
		}
		if c == '"' {
			in_string = !in_string;

			continue;
		}
		if in_string {
			continue;
		}

		if c == open {
			depth += 1;
		} else if c == close {
			depth = depth.saturating_sub(1);

			if depth == 0 {
				return Some(&text[start..start + offset + c.len_utf8()]);
			}
		}
	}

	None
}

fn remove_trailing_commas(json: &str) -> String {
	match Regex::new(r",(\s*[\]}])") {
		Ok(re) => re.replace_all(json, "$1").into_owned(),
		Err(_) => json.to_string(),
	}
}

/// Escapes quote characters that appear unescaped inside the values of `fields`, one line at a
/// time. A value ends at the first unescaped quote followed by a JSON delimiter.
fn repair_unescaped_quotes(json: &str, fields: &[&str]) -> String {
	let Some(key_re) = field_value_regex(fields) else {
		return json.to_string();
	};

	json.lines().map(|line| repair_line(line, &key_re)).collect::<Vec<_>>().join("\n")
}

fn repair_line(line: &str, key_re: &Regex) -> String {
	let mut out = String::with_capacity(line.len() + 8);
	let mut rest = line;

	while let Some(found) = key_re.find(rest) {
		let value = &rest[found.end()..];
		let body_len = closing_quote(value).unwrap_or(value.len());

		out.push_str(&rest[..found.end()]);
		out.push_str(&escape_inner_quotes(&value[..body_len]));

		rest = &value[body_len..];

		// Step over the closing quote so the next search starts after this value.
		if let Some(after_quote) = rest.strip_prefix('"') {
			out.push('"');

			rest = after_quote;
		}
	}

	out.push_str(rest);

	out
}

fn field_value_regex(fields: &[&str]) -> Option<Regex> {
	let alternatives = fields.iter().map(|field| regex::escape(field)).collect::<Vec<_>>();

	Regex::new(&format!(r#""(?:{})"\s*:\s*""#, alternatives.join("|"))).ok()
}

/// Byte offset of the quote that closes a string value starting at `value[0]`.
fn closing_quote(value: &str) -> Option<usize> {
	let mut escaped = false;

	for (index, c) in value.char_indices() {
		if escaped {
			escaped = false;

			continue;
		}

		match c {
			'\\' => escaped = true,
			'"' if is_value_terminator(&value[index + 1..]) => return Some(index),
			_ => {},
		}
	}

	None
}

fn is_value_terminator(rest: &str) -> bool {
	let rest = rest.trim_start_matches([' ', '\t', '\r']);

	if rest.is_empty() || rest.starts_with(['\n', '}', ']']) {
		return true;
	}

	let Some(after_comma) = rest.strip_prefix(',') else {
		return false;
	};
	let after_comma = after_comma.trim_start();

	after_comma.is_empty() || after_comma.starts_with(['{', '}', ']']) || starts_with_key(after_comma)
}

fn starts_with_key(text: &str) -> bool {
	let Some(inner) = text.strip_prefix('"') else {
		return false;
	};
	let Some(end) = inner.find('"') else {
		return false;
	};
	let key = &inner[..end];

	!key.is_empty()
		&& key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
		&& inner[end + 1..].trim_start().starts_with(':')
}

fn escape_inner_quotes(body: &str) -> String {
	let mut out = String::with_capacity(body.len() + 4);
	let mut escaped = false;

	for c in body.chars() {
		if escaped {
			escaped = false;
		} else if c == '\\' {
			escaped = true;
		} else if c == '"' {
			out.push('\\');
		}

		out.push(c);
	}

	out
}

/// Every value of `keys` in `text`, with its byte position.
fn extract_string_values(text: &str, keys: &[&str]) -> Vec<(usize, String)> {
	let Some(key_re) = field_value_regex(keys) else {
		return Vec::new();
	};
	let mut values = Vec::new();

	for found in key_re.find_iter(text) {
		let value = &text[found.end()..];
		let line_end = value.find('\n').unwrap_or(value.len());
		let body_len = closing_quote(value).unwrap_or(line_end).min(line_end);
		let body = value[..body_len].replace("\\\"", "\"");
		let body = body.trim();

		if !body.is_empty() {
			values.push((found.start(), body.to_string()));
		}
	}

	values
}

fn extract_queries(text: &str) -> Vec<GeneratedQuery> {
	let queries = extract_string_values(text, QUERY_KEYS);

	if queries.is_empty() {
		return extract_list_lines(text);
	}

	let rationales = extract_string_values(text, RATIONALE_KEYS);

	queries
		.iter()
		.enumerate()
		.map(|(index, (position, query))| {
			let next = queries.get(index + 1).map(|(next, _)| *next).unwrap_or(usize::MAX);
			let rationale = rationales
				.iter()
				.find(|(at, _)| *at > *position && *at < next)
				.map(|(_, rationale)| rationale.clone())
				.unwrap_or_default();

			GeneratedQuery { query: query.clone(), rationale }
		})
		.collect()
}

/// Numbered or bulleted lines, for responses that ignored the JSON instructions entirely.
fn extract_list_lines(text: &str) -> Vec<GeneratedQuery> {
	let Ok(line_re) = Regex::new(r"(?m)^\s*(?:\d+[.)]|[-*•])\s+(.+?)\s*$") else {
		return Vec::new();
	};

	line_re
		.captures_iter(text)
		.filter_map(|caps| caps.get(1))
		.map(|query| GeneratedQuery {
			query: query.as_str().trim_matches('`').to_string(),
			rationale: String::new(),
		})
		.collect()
}

fn extract_score_fields(text: &str) -> Map<String, Value> {
	let mut fields = Map::new();

	if let Ok(number_re) =
		Regex::new(r#""?([A-Za-z_][A-Za-z0-9_]*)"?\s*:\s*"?(-?\d+(?:\.\d+)?)"#)
	{
		for caps in number_re.captures_iter(text) {
			let (Some(key), Some(raw)) = (caps.get(1), caps.get(2)) else {
				continue;
			};
			let Ok(number) = raw.as_str().parse::<f64>() else {
				continue;
			};
			let key = key.as_str().to_lowercase();

			if !fields.contains_key(&key)
				&& let Some(number) = serde_json::Number::from_f64(number)
			{
				fields.insert(key, Value::Number(number));
			}
		}
	}

	let match_keys = TOP_MATCH_KEYS.iter().map(|key| regex::escape(key)).collect::<Vec<_>>();

	if let Ok(list_re) =
		Regex::new(&format!(r#""?(?:{})"?\s*:\s*\[([^\]]*)\]"#, match_keys.join("|")))
		&& let Some(list) = list_re.captures(text).and_then(|caps| caps.get(1))
	{
		let indices = list
			.as_str()
			.split(',')
			.filter_map(|raw| raw.trim().parse::<u64>().ok())
			.map(Value::from)
			.collect();

		fields.insert(TOP_MATCH_KEYS[0].to_string(), Value::Array(indices));
	}
	if let Some((_, rationale)) = extract_string_values(text, RATIONALE_KEYS).into_iter().next() {
		fields.insert(RATIONALE_KEYS[0].to_string(), Value::String(rationale));
	}

	fields
}
