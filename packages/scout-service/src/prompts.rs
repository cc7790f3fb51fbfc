//! Prompt builders. Only the input and output contract matters to the pipeline: generation
//! answers with `{"queries": [{"query", "rationale"}]}`, scoring answers with a score object.

use scout_domain::{QueryContext, SearchResult, Session};

pub const GENERATION_SYSTEM_PROMPT: &str = "You write boolean search queries that find people \
matching a target persona. Respond with JSON only.";

const DEFAULT_SCORING_PROMPT: &str = "You evaluate boolean search queries for lead generation. \
Be strict and consistent. Respond with JSON only.";

pub fn generation_prompt(session: &Session, context: &[QueryContext]) -> String {
	let mut prompt = format!(
		"Target persona: {}\nSeed query: {}\n\nWrite up to {} distinct boolean search queries that \
		 surface this persona. Use quoted phrases, AND, OR, NOT and parentheses.\n",
		session.persona, session.seed_query, session.query_budget_per_round
	);

	if !context.is_empty() {
		prompt.push_str(
			"\nBest queries from earlier rounds (pass-1 / pass-2 / composite). Build on what worked \
			 and do not repeat them:\n",
		);

		for entry in context {
			prompt.push_str(&format!(
				"- {} ({:.0} / {:.0} / {:.1})\n",
				entry.query, entry.pass1_score, entry.pass2_score, entry.composite_score
			));
		}
	}

	prompt.push_str(
		"\nRespond with a JSON object: {\"queries\": [{\"query\": \"...\", \"rationale\": \
		 \"...\"}]}",
	);

	prompt
}

pub fn scoring_system_prompt(session: &Session) -> &str {
	let rubric = session.scoring_master_prompt.trim();

	if rubric.is_empty() { DEFAULT_SCORING_PROMPT } else { rubric }
}

pub fn pass1_prompt(session: &Session, query: &str) -> String {
	format!(
		"Target persona: {}\nQuery: {query}\n\nPredict how well this query will find the persona \
		 before running it.\nSub-scores: persona_fit 0-40, boolean_precision 0-35, reach 0-25.\n\
		 Respond with a JSON object: {{\"score\": 0-100, \"breakdown\": {{\"persona_fit\": n, \
		 \"boolean_precision\": n, \"reach\": n}}, \"rationale\": \"...\"}}",
		session.persona
	)
}

pub fn pass2_prompt(session: &Session, query: &str, sample: &[SearchResult]) -> String {
	let mut prompt = format!(
		"Target persona: {}\nQuery: {query}\n\nSample results ({}):\n",
		session.persona,
		sample.len()
	);

	for (index, result) in sample.iter().enumerate() {
		prompt.push_str(&format!(
			"[{index}] {} | {} | {}\n",
			result.title, result.url, result.description
		));
	}

	prompt.push_str(
		"\nJudge the query by these actual results.\nSub-scores: result_relevance 0-50, \
		 result_quality 0-30, diversity 0-20.\nRespond with a JSON object: {\"score\": 0-100, \
		 \"breakdown\": {\"result_relevance\": n, \"result_quality\": n, \"diversity\": n}, \
		 \"relevant_count\": n, \"top_matches\": [indices], \"rationale\": \"...\"}",
	);

	prompt
}
