//! Drives one session through generation, two scoring passes, execution, and aggregation.
//!
//! Stage handlers live in the child modules and report a [`StageStep`]; the driver owns every
//! transition, every session status change, and the round history.

mod aggregation;
mod execution;
mod generation;
mod pass1;
mod pass2;

use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	BoxFuture, Error, Providers, Result,
	control::{Halt, RunControl},
	store::SessionStore,
};
use scout_config::{Config, LlmProviderConfig, SearchProviderConfig};
use scout_domain::{
	AggregatedResult, CandidateQuery, ExecutionStatus, ItemStatus, PipelineState, QueryContext,
	ResultAggregator, RoundOutcome, RoundSummary, ScoreWeights, Session, SessionStatus, Stage,
};

/// Provider endpoints and scoring knobs shared by every round of a session.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
	pub completion: LlmProviderConfig,
	pub search: SearchProviderConfig,
	pub weights: ScoreWeights,
	/// Results fetched per query for Pass-2 grading.
	pub sample_results: u32,
	/// Queries carried into the next round's generation prompt.
	pub context_top_k: usize,
}
impl PipelineSettings {
	pub fn from_config(cfg: &Config) -> Self {
		Self {
			completion: cfg.providers.completion.clone(),
			search: cfg.providers.search.clone(),
			weights: ScoreWeights::from(&cfg.pipeline),
			sample_results: cfg.pipeline.sample_results,
			context_top_k: cfg.pipeline.context_top_k,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
	Completed,
	NoSurvivors { stage: Stage },
	Paused { stage: Stage },
	Stopped { stage: Stage },
	Failed { message: String },
	AlreadyRunning,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
	pub round: u32,
	pub outcome: RunOutcome,
	pub generated: usize,
	pub pass1_survivors: usize,
	pub pass2_survivors: usize,
	pub executed: usize,
	/// Size of the session-wide aggregate, not just this round's contribution.
	pub aggregated_results: usize,
}

/// What a stage handler asks the driver to do next.
enum StageStep {
	Advance(Stage),
	NoSurvivors,
	RoundComplete,
	Halted(Halt),
}

#[derive(Clone, Copy, Debug, Default)]
struct RoundCounts {
	generated: usize,
	pass1_survivors: usize,
	pass2_survivors: usize,
	executed: usize,
}

/// Per-item failures collected while applying one stage batch.
#[derive(Default)]
struct StageFailures {
	count: usize,
	first: Option<Error>,
	auth: Option<Error>,
}
impl StageFailures {
	fn record(&mut self, err: Error) {
		self.count += 1;

		let slot = if err.is_auth() { &mut self.auth } else { &mut self.first };

		if slot.is_none() {
			*slot = Some(err);
		}
	}

	fn take_auth(&mut self) -> Option<Error> {
		self.auth.take()
	}

	/// The first failure, when every completed item of the stage failed.
	fn exhausted(self, completed: usize) -> Option<Error> {
		if completed > 0 && self.count >= completed { self.first } else { None }
	}
}

pub struct Orchestrator {
	session: Session,
	pipeline: PipelineState,
	/// Every query of every round, in generation order.
	queries: Vec<CandidateQuery>,
	query_index: HashMap<Uuid, usize>,
	/// Queries of the current generation attempt. A retry after `error` starts a new attempt
	/// within the same round.
	attempt: Vec<Uuid>,
	seen_queries: HashSet<String>,
	aggregate: ResultAggregator,
	context: Vec<QueryContext>,
	providers: Providers,
	store: Arc<dyn SessionStore>,
	settings: PipelineSettings,
	control: RunControl,
	round_started_at: OffsetDateTime,
}
impl Orchestrator {
	pub fn new(
		session: Session,
		providers: Providers,
		store: Arc<dyn SessionStore>,
		settings: PipelineSettings,
	) -> Self {
		Self {
			session,
			pipeline: PipelineState::new(),
			queries: Vec::new(),
			query_index: HashMap::new(),
			attempt: Vec::new(),
			seen_queries: HashSet::new(),
			aggregate: ResultAggregator::new(),
			context: Vec::new(),
			providers,
			store,
			settings,
			control: RunControl::new(),
			round_started_at: OffsetDateTime::now_utc(),
		}
	}

	/// Handle for pausing or stopping a run from another task.
	pub fn handle(&self) -> RunControl {
		self.control.clone()
	}

	pub fn session(&self) -> &Session {
		&self.session
	}

	pub fn pipeline(&self) -> &PipelineState {
		&self.pipeline
	}

	pub fn queries(&self) -> &[CandidateQuery] {
		&self.queries
	}

	pub fn results(&self) -> &[AggregatedResult] {
		self.aggregate.results()
	}

	pub fn context(&self) -> &[QueryContext] {
		&self.context
	}

	pub fn pause(&self) {
		self.control.pause();
	}

	pub fn stop(&self) {
		self.control.stop();
	}

	/// Starts a fresh session run at round 1, discarding any in-memory progress.
	pub async fn start(&mut self) -> RoundReport {
		self.begin(false).await
	}

	/// Continues a paused or stopped run from the queued items of its current stage.
	pub async fn resume(&mut self) -> Result<RoundReport> {
		let Some(_run) = self.control.begin_run() else {
			return Ok(self.report(RunOutcome::AlreadyRunning));
		};
		let stage = self.pipeline.stage();

		if !matches!(self.session.status, SessionStatus::Paused | SessionStatus::Stopped)
			|| !stage.is_active()
		{
			return Err(Error::InvalidRequest {
				message: format!(
					"Nothing to resume; session is {} at stage {stage}.",
					self.session.status.as_str()
				),
			});
		}

		self.control.rearm();
		self.session.status = SessionStatus::Running;
		self.persist_status().await;

		tracing::info!(
			session_id = %self.session.session_id,
			round = self.pipeline.round(),
			stage = %stage,
			pending = self.pipeline.pending(stage).len(),
			"Resuming pipeline."
		);

		Ok(self.drive().await)
	}

	/// Opens the next round, seeding generation with the best queries seen so far.
	pub async fn generate_more(&mut self) -> Result<RoundReport> {
		if self.pipeline.stage() == Stage::Idle {
			return Ok(self.begin(true).await);
		}

		let Some(_run) = self.control.begin_run() else {
			return Ok(self.report(RunOutcome::AlreadyRunning));
		};
		let from = self.pipeline.stage();

		if !from.can_transition_to(Stage::Generating) {
			return Err(Error::Protocol(scout_domain::ProtocolViolation {
				from,
				to: Stage::Generating,
			}));
		}

		self.control.rearm();

		if self.context.is_empty() {
			self.load_stored_context().await;
		}

		self.session.status = SessionStatus::Running;
		self.session.error = None;
		self.round_started_at = OffsetDateTime::now_utc();

		if let Err(err) = self.enter(Stage::Generating).await {
			return Ok(self.fail_round(err).await);
		}

		Ok(self.drive().await)
	}

	async fn begin(&mut self, keep_context: bool) -> RoundReport {
		let Some(_run) = self.control.begin_run() else {
			return self.report(RunOutcome::AlreadyRunning);
		};

		self.control.rearm();
		self.pipeline = PipelineState::new();
		self.queries.clear();
		self.query_index.clear();
		self.attempt.clear();
		self.seen_queries.clear();
		self.aggregate = ResultAggregator::new();

		if keep_context {
			if self.context.is_empty() {
				self.load_stored_context().await;
			}
		} else {
			self.context.clear();
		}

		self.session.status = SessionStatus::Running;
		self.session.error = None;
		self.session.history.clear();
		self.session.current_round = self.pipeline.round();
		self.round_started_at = OffsetDateTime::now_utc();
		self.observe("save_session", self.store.save_session(&self.session, Stage::Idle)).await;

		tracing::info!(
			session_id = %self.session.session_id,
			seed_query = %self.session.seed_query,
			context = self.context.len(),
			"Starting pipeline run."
		);

		if let Err(err) = self.enter(Stage::Generating).await {
			return self.fail_round(err).await;
		}

		self.drive().await
	}

	async fn drive(&mut self) -> RoundReport {
		loop {
			if let Some(halt) = self.control.halt() {
				return self.halt_round(halt).await;
			}

			let stage = self.pipeline.stage();
			let step = match stage {
				Stage::Generating => self.run_generation().await,
				Stage::Pass1 => self.run_pass1().await,
				Stage::Pass2 => self.run_pass2().await,
				Stage::Executing => self.run_execution().await,
				Stage::Aggregating => self.run_aggregation(),
				Stage::Idle | Stage::Complete | Stage::Error => Err(Error::InvalidRequest {
					message: format!("Stage {stage} has no handler."),
				}),
			};

			match step {
				Ok(StageStep::Advance(next)) =>
					if let Err(err) = self.enter(next).await {
						return self.fail_round(err).await;
					},
				Ok(StageStep::NoSurvivors) =>
					return self.finish_round(RunOutcome::NoSurvivors { stage }).await,
				Ok(StageStep::RoundComplete) => return self.finish_round(RunOutcome::Completed).await,
				Ok(StageStep::Halted(halt)) => return self.halt_round(halt).await,
				Err(err) => return self.fail_round(err).await,
			}
		}
	}

	async fn enter(&mut self, target: Stage) -> Result<()> {
		let from = self.pipeline.stage();

		self.pipeline.transition(target, None)?;
		self.session.current_round = self.pipeline.round();

		tracing::info!(
			session_id = %self.session.session_id,
			round = self.pipeline.round(),
			from = %from,
			to = %target,
			"Pipeline stage changed."
		);

		self.persist_status().await;

		Ok(())
	}

	async fn finish_round(&mut self, outcome: RunOutcome) -> RoundReport {
		let summary = match &outcome {
			RunOutcome::NoSurvivors { stage } => RoundOutcome::NoSurvivors { stage: *stage },
			_ => RoundOutcome::Completed,
		};

		self.session.status = SessionStatus::Completed;
		self.record_round(summary);

		if let Err(err) = self.enter(Stage::Complete).await {
			return self.fail_round(err).await;
		}

		let report = self.report(outcome);

		tracing::info!(
			session_id = %self.session.session_id,
			round = report.round,
			generated = report.generated,
			pass1_survivors = report.pass1_survivors,
			pass2_survivors = report.pass2_survivors,
			executed = report.executed,
			aggregated_results = report.aggregated_results,
			"Round finished."
		);

		report
	}

	async fn halt_round(&mut self, halt: Halt) -> RoundReport {
		let stage = self.pipeline.stage();
		let outcome = match halt {
			Halt::Paused => {
				self.session.status = SessionStatus::Paused;

				RunOutcome::Paused { stage }
			},
			Halt::Stopped => {
				self.session.status = SessionStatus::Stopped;
				self.record_round(RoundOutcome::Stopped { stage });

				RunOutcome::Stopped { stage }
			},
		};

		self.persist_status().await;

		tracing::info!(
			session_id = %self.session.session_id,
			round = self.pipeline.round(),
			stage = %stage,
			pending = self.pipeline.pending(stage).len(),
			halt = ?halt,
			"Pipeline halted."
		);

		self.report(outcome)
	}

	async fn fail_round(&mut self, err: Error) -> RoundReport {
		if err.is_cancelled() {
			return self.halt_round(Halt::Stopped).await;
		}

		let message = err.to_string();
		let stage = self.pipeline.stage();

		tracing::error!(
			session_id = %self.session.session_id,
			round = self.pipeline.round(),
			stage = %stage,
			error = %err,
			"Pipeline round failed."
		);

		if let Err(violation) = self.pipeline.transition(Stage::Error, Some(&message)) {
			tracing::warn!(error = %violation, "Failed to move pipeline into the error stage.");
		}

		self.session.status = SessionStatus::Failed;
		self.session.error = Some(message.clone());
		self.record_round(RoundOutcome::Failed { message: message.clone() });
		self.persist_status().await;

		self.report(RunOutcome::Failed { message })
	}

	async fn load_stored_context(&mut self) {
		match self.store.top_queries(self.session.session_id, self.settings.context_top_k).await {
			Ok(context) => self.context = context,
			Err(err) => tracing::warn!(
				session_id = %self.session.session_id,
				error = %err,
				"Failed to load stored query context."
			),
		}
	}

	/// Persistence failures are logged and never abort the round.
	async fn observe(&self, operation: &'static str, write: BoxFuture<'_, Result<()>>) {
		if let Err(err) = write.await {
			tracing::warn!(
				session_id = %self.session.session_id,
				operation,
				error = %err,
				"Failed to persist pipeline state."
			);
		}
	}

	async fn persist_status(&self) {
		self.observe(
			"update_session_status",
			self.store.update_session_status(&self.session, self.pipeline.stage()),
		)
		.await;
	}

	async fn persist_query(&self, id: Uuid, stage: Stage) {
		if let Some(query) = self.query(id) {
			self.observe("update_query", self.store.update_query(query, stage)).await;
		}
	}

	fn record_round(&mut self, outcome: RoundOutcome) {
		let counts = self.round_counts();

		self.session.history.push(RoundSummary {
			round: self.pipeline.round(),
			outcome,
			generated: counts.generated,
			pass1_survivors: counts.pass1_survivors,
			pass2_survivors: counts.pass2_survivors,
			executed: counts.executed,
			aggregated_results: self.aggregate.len(),
			started_at: self.round_started_at,
			finished_at: OffsetDateTime::now_utc(),
		});
	}

	fn report(&self, outcome: RunOutcome) -> RoundReport {
		let counts = self.round_counts();

		RoundReport {
			round: self.pipeline.round(),
			outcome,
			generated: counts.generated,
			pass1_survivors: counts.pass1_survivors,
			pass2_survivors: counts.pass2_survivors,
			executed: counts.executed,
			aggregated_results: self.aggregate.len(),
		}
	}

	fn round_counts(&self) -> RoundCounts {
		self.round_queries().fold(RoundCounts::default(), |mut counts, query| {
			counts.generated += 1;

			if query.pass1_status == ItemStatus::Passed {
				counts.pass1_survivors += 1;
			}
			if query.pass2_status == ItemStatus::Passed {
				counts.pass2_survivors += 1;
			}
			if query.execution_status == ExecutionStatus::Completed {
				counts.executed += 1;
			}

			counts
		})
	}

	fn round_queries(&self) -> impl Iterator<Item = &CandidateQuery> {
		self.attempt.iter().filter_map(|id| self.query(*id))
	}

	/// Completed items of `stage` that satisfy `passed`, in completion order.
	fn survivors(&self, stage: Stage, passed: impl Fn(&CandidateQuery) -> bool) -> Vec<Uuid> {
		self.pipeline
			.completed(stage)
			.iter()
			.filter(|id| self.query(**id).is_some_and(&passed))
			.copied()
			.collect()
	}

	fn query(&self, id: Uuid) -> Option<&CandidateQuery> {
		self.query_index.get(&id).map(|index| &self.queries[*index])
	}

	fn query_mut(&mut self, id: Uuid) -> Option<&mut CandidateQuery> {
		self.query_index.get(&id).map(|index| &mut self.queries[*index])
	}

	fn push_queries(&mut self, queries: Vec<CandidateQuery>) {
		for query in queries {
			self.query_index.insert(query.query_id, self.queries.len());
			self.attempt.push(query.query_id);
			self.queries.push(query);
		}
	}

	/// Pending ids of `stage` paired with the input the stage needs for each.
	fn pending_items<T>(&self, stage: Stage, input: impl Fn(&CandidateQuery) -> T) -> Vec<(Uuid, T)> {
		self.pipeline
			.pending(stage)
			.iter()
			.filter_map(|id| self.query(*id).map(|query| (*id, input(query))))
			.collect()
	}

	/// Items still pending after a batch mean the batch stopped early.
	fn halted_with_pending(&self, stage: Stage, halted: Option<Halt>) -> Option<Halt> {
		if self.pipeline.pending(stage).is_empty() {
			return None;
		}

		Some(halted.or_else(|| self.control.halt()).unwrap_or(Halt::Stopped))
	}
}
