use time::OffsetDateTime;

use crate::{
	Error, Result, batch,
	orchestrator::{Orchestrator, StageFailures, StageStep},
};
use scout_domain::{ExecutionStatus, SearchRequest, Stage};

impl Orchestrator {
	/// Runs every Pass-2 survivor at full depth.
	pub(super) async fn run_execution(&mut self) -> Result<StageStep> {
		let items = self.pending_items(Stage::Executing, |query| query.query.clone());
		let ids = items.iter().map(|(id, _)| *id).collect::<Vec<_>>();
		let cancel = self.control.token();
		let report = {
			let search = self.providers.search.as_ref();
			let cfg = &self.settings.search;
			let session = &self.session;
			let cancel = &cancel;

			batch::run_batched(items, session.concurrency_limit, &self.control, |text: String| {
				async move {
					let request = SearchRequest {
						query: text,
						country: session.country.clone(),
						language: session.language.clone(),
						max_results: session.max_results_per_query,
					};

					Ok::<_, Error>(search.search(cfg, &request, cancel).await?)
				}
			})
			.await
		};
		let now = OffsetDateTime::now_utc();
		let mut results = report.results;
		let mut failures = StageFailures::default();

		for id in ids {
			let Some(outcome) = results.remove(&id) else {
				continue;
			};
			let response = match outcome {
				Ok(response) => Some(response),
				Err(failure) => {
					let err = failure.into_error();

					if err.is_cancelled() {
						continue;
					}

					tracing::warn!(query_id = %id, error = %err, "Query execution failed.");

					failures.record(err);

					None
				},
			};

			if let Some(query) = self.query_mut(id) {
				match response {
					Some(response) => {
						query.result_count = u32::try_from(response.results.len()).unwrap_or(u32::MAX);
						query.results = response.results;
						query.execution_status = ExecutionStatus::Completed;
					},
					None => query.execution_status = ExecutionStatus::Failed,
				}

				query.timestamps.executed_at = Some(now);
			}

			self.pipeline.mark_completed(Stage::Executing, id);
			self.persist_query(id, Stage::Executing).await;
		}

		if let Some(err) = failures.take_auth() {
			return Err(err);
		}
		if let Some(halt) = self.halted_with_pending(Stage::Executing, report.halted) {
			return Ok(StageStep::Halted(halt));
		}
		if let Some(err) = failures.exhausted(self.pipeline.completed(Stage::Executing).len()) {
			return Err(err);
		}

		let executed = self.survivors(Stage::Executing, |query| {
			query.execution_status == ExecutionStatus::Completed
		});

		tracing::info!(
			session_id = %self.session.session_id,
			round = self.pipeline.round(),
			executed = executed.len(),
			failures = report.failures,
			"Query execution finished."
		);

		self.pipeline.enqueue(Stage::Aggregating, executed);

		Ok(StageStep::Advance(Stage::Aggregating))
	}
}
