use time::OffsetDateTime;

use crate::{
	Error, Result, batch,
	orchestrator::{Orchestrator, StageFailures, StageStep},
	prompts,
};
use scout_domain::{ItemStatus, ParseTier, Pass1Breakdown, Pass1Score, Stage, parse, scoring};

impl Orchestrator {
	/// Scores each pending query on its text alone.
	pub(super) async fn run_pass1(&mut self) -> Result<StageStep> {
		let items = self.pending_items(Stage::Pass1, |query| query.query.clone());
		let ids = items.iter().map(|(id, _)| *id).collect::<Vec<_>>();
		let cancel = self.control.token();
		let report = {
			let completion = self.providers.completion.as_ref();
			let cfg = &self.settings.completion;
			let session = &self.session;
			let system = prompts::scoring_system_prompt(session);
			let cancel = &cancel;

			batch::run_batched(items, session.concurrency_limit, &self.control, |text: String| {
				async move {
					let prompt = prompts::pass1_prompt(session, &text);
					let response = completion.complete(cfg, &prompt, Some(system), cancel).await?;

					Ok::<_, Error>(parse::parse_pass1_score(&response))
				}
			})
			.await
		};
		let threshold = self.session.pass1_threshold;
		let now = OffsetDateTime::now_utc();
		let mut results = report.results;
		let mut failures = StageFailures::default();

		for id in ids {
			let Some(outcome) = results.remove(&id) else {
				continue;
			};
			let (score, passed) = match outcome {
				Ok(score) => {
					if score.tier == ParseTier::Fallback {
						tracing::warn!(query_id = %id, "Pass-1 response could not be parsed.");
					}

					let passed = scoring::passes(score.score, threshold);

					(score, passed)
				},
				Err(failure) => {
					let err = failure.into_error();

					if err.is_cancelled() {
						continue;
					}

					tracing::warn!(query_id = %id, error = %err, "Pass-1 scoring failed.");

					let score = failed_score(&err);

					failures.record(err);

					(score, false)
				},
			};

			if let Some(query) = self.query_mut(id) {
				query.pass1 = Some(score);
				query.pass1_status = if passed { ItemStatus::Passed } else { ItemStatus::Failed };
				query.timestamps.pass1_at = Some(now);
			}

			self.pipeline.mark_completed(Stage::Pass1, id);
			self.persist_query(id, Stage::Pass1).await;
		}

		if let Some(err) = failures.take_auth() {
			return Err(err);
		}
		if let Some(halt) = self.halted_with_pending(Stage::Pass1, report.halted) {
			return Ok(StageStep::Halted(halt));
		}
		if let Some(err) = failures.exhausted(self.pipeline.completed(Stage::Pass1).len()) {
			return Err(err);
		}

		let survivors =
			self.survivors(Stage::Pass1, |query| query.pass1_status == ItemStatus::Passed);

		tracing::info!(
			session_id = %self.session.session_id,
			round = self.pipeline.round(),
			scored = self.pipeline.completed(Stage::Pass1).len(),
			failures = report.failures,
			survivors = survivors.len(),
			threshold,
			"Pass-1 scoring finished."
		);

		if survivors.is_empty() {
			return Ok(StageStep::NoSurvivors);
		}

		self.pipeline.enqueue(Stage::Pass2, survivors);

		Ok(StageStep::Advance(Stage::Pass2))
	}
}

fn failed_score(err: &Error) -> Pass1Score {
	Pass1Score {
		score: 0.0,
		breakdown: Pass1Breakdown::default(),
		rationale: format!("Scoring failed: {err}"),
		tier: ParseTier::Fallback,
	}
}
