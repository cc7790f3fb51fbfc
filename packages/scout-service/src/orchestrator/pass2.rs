use time::OffsetDateTime;

use crate::{
	Error, Result, batch,
	orchestrator::{Orchestrator, StageFailures, StageStep},
	prompts,
};
use scout_domain::{
	ItemStatus, ParseTier, Pass2Breakdown, Pass2Score, SearchRequest, Stage, parse, scoring,
};

impl Orchestrator {
	/// Grades each Pass-1 survivor against a small live sample of its results.
	pub(super) async fn run_pass2(&mut self) -> Result<StageStep> {
		let items = self.pending_items(Stage::Pass2, |query| query.query.clone());
		let ids = items.iter().map(|(id, _)| *id).collect::<Vec<_>>();
		let cancel = self.control.token();
		let report = {
			let completion = self.providers.completion.as_ref();
			let search = self.providers.search.as_ref();
			let completion_cfg = &self.settings.completion;
			let search_cfg = &self.settings.search;
			let sample_results = self.settings.sample_results;
			let session = &self.session;
			let system = prompts::scoring_system_prompt(session);
			let cancel = &cancel;

			batch::run_batched(items, session.concurrency_limit, &self.control, |text: String| {
				async move {
					let request = SearchRequest {
						query: text.clone(),
						country: session.country.clone(),
						language: session.language.clone(),
						max_results: sample_results,
					};
					let sample = search.search(search_cfg, &request, cancel).await?;
					let prompt = prompts::pass2_prompt(session, &text, &sample.results);
					let response =
						completion.complete(completion_cfg, &prompt, Some(system), cancel).await?;

					Ok::<_, Error>((sample.results, parse::parse_pass2_score(&response)))
				}
			})
			.await
		};
		let threshold = self.session.pass2_threshold;
		let weights = self.settings.weights;
		let now = OffsetDateTime::now_utc();
		let mut results = report.results;
		let mut failures = StageFailures::default();

		for id in ids {
			let Some(outcome) = results.remove(&id) else {
				continue;
			};
			let (sample, score, passed) = match outcome {
				Ok((sample, score)) => {
					if score.tier == ParseTier::Fallback {
						tracing::warn!(query_id = %id, "Pass-2 response could not be parsed.");
					}

					let passed = scoring::passes(score.score, threshold);

					(sample, score, passed)
				},
				Err(failure) => {
					let err = failure.into_error();

					if err.is_cancelled() {
						continue;
					}

					tracing::warn!(query_id = %id, error = %err, "Pass-2 scoring failed.");

					let score = failed_score(&err);

					failures.record(err);

					(Vec::new(), score, false)
				},
			};

			if let Some(query) = self.query_mut(id) {
				let pass1 = query.pass1_score().unwrap_or_default();

				query.composite_score = Some(scoring::composite(pass1, score.score, weights));
				query.sample_results = sample;
				query.pass2 = Some(score);
				query.pass2_status = if passed { ItemStatus::Passed } else { ItemStatus::Failed };
				query.timestamps.pass2_at = Some(now);
			}

			self.pipeline.mark_completed(Stage::Pass2, id);
			self.persist_query(id, Stage::Pass2).await;
		}

		if let Some(err) = failures.take_auth() {
			return Err(err);
		}
		if let Some(halt) = self.halted_with_pending(Stage::Pass2, report.halted) {
			return Ok(StageStep::Halted(halt));
		}
		if let Some(err) = failures.exhausted(self.pipeline.completed(Stage::Pass2).len()) {
			return Err(err);
		}

		let survivors =
			self.survivors(Stage::Pass2, |query| query.pass2_status == ItemStatus::Passed);

		tracing::info!(
			session_id = %self.session.session_id,
			round = self.pipeline.round(),
			scored = self.pipeline.completed(Stage::Pass2).len(),
			failures = report.failures,
			survivors = survivors.len(),
			threshold,
			"Pass-2 scoring finished."
		);

		if survivors.is_empty() {
			return Ok(StageStep::NoSurvivors);
		}

		self.pipeline.enqueue(Stage::Executing, survivors);

		Ok(StageStep::Advance(Stage::Executing))
	}
}

fn failed_score(err: &Error) -> Pass2Score {
	Pass2Score {
		score: 0.0,
		breakdown: Pass2Breakdown::default(),
		rationale: format!("Scoring failed: {err}"),
		relevant_count: 0,
		top_matches: Vec::new(),
		tier: ParseTier::Fallback,
	}
}
