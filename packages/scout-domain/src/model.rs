use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::pipeline::Stage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
	Idle,
	Running,
	Paused,
	Stopped,
	Completed,
	Failed,
}
impl SessionStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Idle => "idle",
			Self::Running => "running",
			Self::Paused => "paused",
			Self::Stopped => "stopped",
			Self::Completed => "completed",
			Self::Failed => "failed",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundOutcome {
	Completed,
	NoSurvivors { stage: Stage },
	Failed { message: String },
	Stopped { stage: Stage },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundSummary {
	pub round: u32,
	pub outcome: RoundOutcome,
	pub generated: usize,
	pub pass1_survivors: usize,
	pub pass2_survivors: usize,
	pub executed: usize,
	pub aggregated_results: usize,
	#[serde(with = "time::serde::rfc3339")]
	pub started_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub finished_at: OffsetDateTime,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
	pub session_id: Uuid,
	pub persona: String,
	pub seed_query: String,
	pub scoring_master_prompt: String,
	pub pass1_threshold: f64,
	pub pass2_threshold: f64,
	pub query_budget_per_round: u32,
	pub concurrency_limit: usize,
	pub max_results_per_query: u32,
	pub country: String,
	pub language: String,
	pub current_round: u32,
	pub status: SessionStatus,
	pub error: Option<String>,
	pub history: Vec<RoundSummary>,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}
impl Session {
	pub fn from_settings(settings: &scout_config::SessionSettings, now: OffsetDateTime) -> Self {
		Self {
			session_id: Uuid::new_v4(),
			persona: settings.persona.clone(),
			seed_query: settings.seed_query.clone(),
			scoring_master_prompt: settings.scoring_master_prompt.clone(),
			pass1_threshold: settings.pass1_threshold,
			pass2_threshold: settings.pass2_threshold,
			query_budget_per_round: settings.query_budget_per_round,
			concurrency_limit: settings.concurrency_limit,
			max_results_per_query: settings.max_results_per_query,
			country: settings.country.clone(),
			language: settings.language.clone(),
			current_round: 0,
			status: SessionStatus::Idle,
			error: None,
			history: Vec::new(),
			created_at: now,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
	Pending,
	Passed,
	Failed,
}
impl ItemStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Passed => "passed",
			Self::Failed => "failed",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
	Pending,
	Completed,
	Failed,
}
impl ExecutionStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Completed => "completed",
			Self::Failed => "failed",
		}
	}
}

/// Which parser tier produced a score record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseTier {
	Direct,
	Repaired,
	Extracted,
	Fallback,
}
impl ParseTier {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Direct => "direct",
			Self::Repaired => "repaired",
			Self::Extracted => "extracted",
			Self::Fallback => "fallback",
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pass1Breakdown {
	/// 0-40.
	pub persona_fit: f64,
	/// 0-35.
	pub boolean_precision: f64,
	/// 0-25.
	pub reach: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pass2Breakdown {
	/// 0-50.
	pub result_relevance: f64,
	/// 0-30.
	pub result_quality: f64,
	/// 0-20.
	pub diversity: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pass1Score {
	pub score: f64,
	pub breakdown: Pass1Breakdown,
	pub rationale: String,
	pub tier: ParseTier,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pass2Score {
	pub score: f64,
	pub breakdown: Pass2Breakdown,
	pub rationale: String,
	pub relevant_count: u32,
	pub top_matches: Vec<usize>,
	pub tier: ParseTier,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
	pub url: String,
	pub title: String,
	pub description: String,
	#[serde(rename = "type")]
	pub result_type: String,
	pub rank: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	pub country: String,
	pub language: String,
	pub max_results: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResponse {
	pub results: Vec<SearchResult>,
	pub total_results: u64,
	pub metadata: serde_json::Value,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StageTimestamps {
	#[serde(with = "time::serde::rfc3339::option")]
	pub generated_at: Option<OffsetDateTime>,
	#[serde(with = "time::serde::rfc3339::option")]
	pub pass1_at: Option<OffsetDateTime>,
	#[serde(with = "time::serde::rfc3339::option")]
	pub pass2_at: Option<OffsetDateTime>,
	#[serde(with = "time::serde::rfc3339::option")]
	pub executed_at: Option<OffsetDateTime>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CandidateQuery {
	pub query_id: Uuid,
	pub session_id: Uuid,
	pub round: u32,
	pub query: String,
	pub rationale: String,
	pub pass1: Option<Pass1Score>,
	pub pass1_status: ItemStatus,
	pub pass2: Option<Pass2Score>,
	pub pass2_status: ItemStatus,
	pub sample_results: Vec<SearchResult>,
	pub composite_score: Option<f64>,
	pub execution_status: ExecutionStatus,
	pub results: Vec<SearchResult>,
	pub result_count: u32,
	pub timestamps: StageTimestamps,
}
impl CandidateQuery {
	pub fn new(
		session_id: Uuid,
		round: u32,
		query: impl Into<String>,
		rationale: impl Into<String>,
		now: OffsetDateTime,
	) -> Self {
		Self {
			query_id: Uuid::new_v4(),
			session_id,
			round,
			query: query.into(),
			rationale: rationale.into(),
			pass1: None,
			pass1_status: ItemStatus::Pending,
			pass2: None,
			pass2_status: ItemStatus::Pending,
			sample_results: Vec::new(),
			composite_score: None,
			execution_status: ExecutionStatus::Pending,
			results: Vec::new(),
			result_count: 0,
			timestamps: StageTimestamps { generated_at: Some(now), ..Default::default() },
		}
	}

	pub fn pass1_score(&self) -> Option<f64> {
		self.pass1.as_ref().map(|score| score.score)
	}

	pub fn pass2_score(&self) -> Option<f64> {
		self.pass2.as_ref().map(|score| score.score)
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
	pub url: String,
	pub title: String,
	pub description: String,
	#[serde(rename = "type")]
	pub result_type: String,
	pub rank: u32,
	pub source_queries: Vec<String>,
	#[serde(with = "time::serde::rfc3339")]
	pub first_seen_at: OffsetDateTime,
}

/// Prompt-sized projection of a scored query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
	pub query: String,
	pub pass1_score: f64,
	pub pass2_score: f64,
	pub composite_score: f64,
}
