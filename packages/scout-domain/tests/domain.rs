use time::macros::datetime;

use scout_domain::{
	ParseTier, PipelineState, ProtocolViolation, SearchResult, Stage,
	aggregate::ResultAggregator,
	parse::{self, FALLBACK_RATIONALE, FALLBACK_SCORE, GeneratedQuery},
	scoring::{self, ScoreWeights},
};

fn search_result(url: &str) -> SearchResult {
	SearchResult {
		url: url.to_string(),
		title: "Jane Doe - CTO".to_string(),
		description: "Fintech CTO".to_string(),
		result_type: "profile".to_string(),
		rank: 1,
	}
}

fn advance(state: &mut PipelineState, path: &[Stage]) {
	for stage in path {
		state.transition(*stage, None).expect("Path must be legal.");
	}
}

#[test]
fn composite_uses_default_weights() {
	let weights = ScoreWeights::default();

	for (pass1, pass2) in [(0.0, 0.0), (82.0, 76.0), (100.0, 0.0), (33.3, 66.6)] {
		let expected = 0.3 * pass1 + 0.7 * pass2;

		assert!((scoring::composite(pass1, pass2, weights) - expected).abs() < 1e-9);
	}
}

#[test]
fn composite_clamps_out_of_range_inputs() {
	let weights = ScoreWeights::default();

	assert!((scoring::composite(-10.0, 150.0, weights) - 70.0).abs() < 1e-9);
	assert!((scoring::composite(250.0, -1.0, weights) - 30.0).abs() < 1e-9);
}

#[test]
fn composite_normalizes_weights() {
	let composite = scoring::composite(80.0, 40.0, ScoreWeights::new(1.0, 1.0));

	assert!((composite - 60.0).abs() < 1e-9);
}

#[test]
fn aggregating_same_url_from_two_queries_unions_sources() {
	let mut aggregator = ResultAggregator::new();
	let first = datetime!(2026-03-01 12:00 UTC);

	aggregator.merge("\"CTO\" AND fintech", &[search_result("https://example.com/jane")], first);
	aggregator.merge(
		"\"Chief Technology Officer\" AND payments",
		&[search_result("https://example.com/jane")],
		datetime!(2026-03-01 12:05 UTC),
	);

	let entries = aggregator.results();

	assert_eq!(entries.len(), 1);
	assert_eq!(entries[0].source_queries.len(), 2);
	assert_eq!(entries[0].first_seen_at, first);
}

#[test]
fn generated_queries_dedupe_case_and_whitespace() {
	let deduped = parse::dedupe_queries(vec![
		GeneratedQuery { query: "\"CTO\" AND Fintech".to_string(), rationale: "first".to_string() },
		GeneratedQuery { query: "  \"cto\"   and fintech ".to_string(), rationale: "second".to_string() },
		GeneratedQuery { query: "   ".to_string(), rationale: "empty".to_string() },
	]);

	assert_eq!(deduped.len(), 1);
	assert_eq!(deduped[0].rationale, "first");
}

#[test]
fn pass2_to_generating_is_rejected_without_mutation() {
	let mut state = PipelineState::new();

	advance(&mut state, &[Stage::Generating, Stage::Pass1, Stage::Pass2]);

	let before = state.clone();
	let err = state.transition(Stage::Generating, None).expect_err("Expected violation.");

	assert_eq!(err, ProtocolViolation { from: Stage::Pass2, to: Stage::Generating });
	assert_eq!(state, before);
}

#[test]
fn aggregating_to_generating_increments_round() {
	let mut state = PipelineState::new();

	advance(
		&mut state,
		&[Stage::Generating, Stage::Pass1, Stage::Pass2, Stage::Executing, Stage::Aggregating],
	);

	assert_eq!(state.round(), 1);

	state.transition(Stage::Generating, None).expect("Expected legal transition.");

	assert_eq!(state.round(), 2);
}

#[test]
fn no_survivor_edges_lead_to_complete() {
	for stage in [Stage::Generating, Stage::Pass1, Stage::Pass2] {
		assert!(stage.can_transition_to(Stage::Complete), "{stage} must reach complete.");
	}

	assert!(!Stage::Executing.can_transition_to(Stage::Complete));
	assert!(!Stage::Idle.can_transition_to(Stage::Pass1));
}

#[test]
fn wrapped_query_list_parses_directly() {
	let text = r#"```json
{"queries": [
  {"query": "\"CTO\" AND fintech", "rationale": "Direct title match."},
  {"query": "\"VP Engineering\" AND payments", "rationale": "Adjacent role."},
]}
```"#;
	let parsed = parse::parse_generated_queries(text);

	assert_eq!(parsed.tier, ParseTier::Direct);
	assert_eq!(parsed.queries.len(), 2);
	assert_eq!(parsed.queries[0].query, "\"CTO\" AND fintech");
	assert_eq!(parsed.queries[1].rationale, "Adjacent role.");
}

#[test]
fn unescaped_quotes_in_queries_recover_through_repair() {
	let text = r#"{"queries": [
  {"query": "("CTO" OR "CIO") AND fintech", "rationale": "Covers both "C-level" titles."}
]}"#;
	let parsed = parse::parse_generated_queries(text);

	assert_eq!(parsed.tier, ParseTier::Repaired);
	assert_eq!(parsed.queries.len(), 1);
	assert_eq!(parsed.queries[0].query, "(\"CTO\" OR \"CIO\") AND fintech");
	assert_eq!(parsed.queries[0].rationale, "Covers both \"C-level\" titles.");
}

#[test]
fn unescaped_quote_score_matches_well_formed_score() {
	let well_formed = r#"{"score": 72, "breakdown": {"persona_fit": 30, "boolean_precision": 25, "reach": 17}, "rationale": "Targets \"CTO\" titles well."}"#;
	let malformed = r#"{"score": 72, "breakdown": {"persona_fit": 30, "boolean_precision": 25, "reach": 17}, "rationale": "Targets "CTO" titles well."}"#;
	let expected = parse::parse_pass1_score(well_formed);
	let recovered = parse::parse_pass1_score(malformed);

	assert_eq!(expected.tier, ParseTier::Direct);
	assert_eq!(recovered.tier, ParseTier::Repaired);
	assert_eq!(recovered.score, expected.score);
	assert_eq!(recovered.breakdown, expected.breakdown);
	assert_eq!(recovered.rationale, expected.rationale);
}

#[test]
fn truncated_score_is_extracted_by_field() {
	let text = r#"Here is my evaluation: {"score": 64, "relevant_count": 6, "top_matches": [0, 2, 5], "rationale": "Mostly on target"#;
	let score = parse::parse_pass2_score(text);

	assert_eq!(score.tier, ParseTier::Extracted);
	assert_eq!(score.score, 64.0);
	assert_eq!(score.relevant_count, 6);
	assert_eq!(score.top_matches, vec![0, 2, 5]);
	assert_eq!(score.rationale, "Mostly on target");
}

#[test]
fn unparseable_score_returns_low_confidence_default() {
	let pass1 = parse::parse_pass1_score("I cannot evaluate this query.");
	let pass2 = parse::parse_pass2_score("");

	assert_eq!(pass1.score, FALLBACK_SCORE);
	assert_eq!(pass1.rationale, FALLBACK_RATIONALE);
	assert_eq!(pass1.tier, ParseTier::Fallback);
	assert_eq!(pass2.score, FALLBACK_SCORE);
	assert_eq!(pass2.relevant_count, 0);
	assert_eq!(pass2.tier, ParseTier::Fallback);
}

#[test]
fn unparseable_query_list_is_empty() {
	let parsed = parse::parse_generated_queries("Sorry, I can't help with that.");

	assert!(parsed.queries.is_empty());
	assert_eq!(parsed.tier, ParseTier::Fallback);
}

#[test]
fn out_of_range_scores_are_clamped() {
	let score = parse::parse_pass1_score(
		r#"{"score": 140, "breakdown": {"persona_fit": 90, "boolean_precision": 35, "reach": 25}}"#,
	);

	assert_eq!(score.score, 100.0);
	assert_eq!(score.breakdown.persona_fit, 40.0);
}
