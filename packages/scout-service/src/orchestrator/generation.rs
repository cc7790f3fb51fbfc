use time::OffsetDateTime;

use crate::{
	Result,
	orchestrator::{Orchestrator, StageStep},
	prompts,
};
use scout_domain::{CandidateQuery, ParseTier, Stage, parse};

impl Orchestrator {
	pub(super) async fn run_generation(&mut self) -> Result<StageStep> {
		// Queries of a failed attempt stay in history but leave the round view.
		self.attempt.clear();

		let cancel = self.control.token();
		let prompt = prompts::generation_prompt(&self.session, &self.context);
		let text = self
			.providers
			.completion
			.complete(
				&self.settings.completion,
				&prompt,
				Some(prompts::GENERATION_SYSTEM_PROMPT),
				&cancel,
			)
			.await?;
		let parsed = parse::parse_generated_queries(&text);

		if parsed.tier == ParseTier::Fallback {
			tracing::warn!(
				session_id = %self.session.session_id,
				response_len = text.len(),
				"Generation response could not be parsed."
			);
		}

		let round = self.pipeline.round();
		let budget = self.session.query_budget_per_round as usize;
		let now = OffsetDateTime::now_utc();
		let mut fresh = Vec::with_capacity(budget);
		let mut repeated = 0_usize;

		for generated in parsed.queries {
			if fresh.len() >= budget {
				break;
			}
			// Repeats of any earlier round are dropped, not only repeats within this response.
			if !self.seen_queries.insert(parse::normalize_query_key(&generated.query)) {
				repeated += 1;

				continue;
			}

			fresh.push(CandidateQuery::new(
				self.session.session_id,
				round,
				generated.query,
				generated.rationale,
				now,
			));
		}

		tracing::info!(
			session_id = %self.session.session_id,
			round,
			generated = fresh.len(),
			repeated,
			tier = parsed.tier.as_str(),
			"Generated candidate queries."
		);

		if fresh.is_empty() {
			return Ok(StageStep::NoSurvivors);
		}

		self.observe("insert_queries", self.store.insert_queries(&fresh)).await;

		let ids = fresh.iter().map(|query| query.query_id).collect::<Vec<_>>();

		self.push_queries(fresh);
		self.pipeline.enqueue(Stage::Pass1, ids);

		Ok(StageStep::Advance(Stage::Pass1))
	}
}
