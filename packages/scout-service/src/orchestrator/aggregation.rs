use time::OffsetDateTime;

use crate::{
	Result,
	orchestrator::{Orchestrator, StageStep},
};
use scout_domain::{MergeStats, Stage, select_context};

impl Orchestrator {
	pub(super) fn run_aggregation(&mut self) -> Result<StageStep> {
		let now = OffsetDateTime::now_utc();
		let pending = self.pipeline.pending(Stage::Aggregating).to_vec();
		let mut stats = MergeStats::default();

		for id in pending {
			if let Some(index) = self.query_index.get(&id).copied() {
				let query = &self.queries[index];
				let merged = self.aggregate.merge(&query.query, &query.results, now);

				stats.inserted += merged.inserted;
				stats.merged += merged.merged;
			}

			self.pipeline.mark_completed(Stage::Aggregating, id);
		}

		let context = select_context(self.round_queries(), self.settings.context_top_k);

		// A round with no eligible queries keeps the previous context.
		if !context.is_empty() {
			self.context = context;
		}

		tracing::info!(
			session_id = %self.session.session_id,
			round = self.pipeline.round(),
			inserted = stats.inserted,
			merged = stats.merged,
			total = self.aggregate.len(),
			context = self.context.len(),
			"Aggregated round results."
		);

		Ok(StageStep::RoundComplete)
	}
}
