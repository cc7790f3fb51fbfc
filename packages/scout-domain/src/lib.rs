//! Synchronous core of the Scout lead-query pipeline: data model, stage state machine, scoring,
//! response parsing, result aggregation, and context selection.

pub mod aggregate;
pub mod context;
pub mod model;
pub mod parse;
pub mod pipeline;
pub mod scoring;

pub use aggregate::{MergeStats, ResultAggregator};
pub use context::select_context;
pub use model::{
	AggregatedResult, CandidateQuery, ExecutionStatus, ItemStatus, Pass1Breakdown, Pass1Score,
	Pass2Breakdown, Pass2Score, ParseTier, QueryContext, RoundOutcome, RoundSummary,
	SearchRequest, SearchResponse, SearchResult, Session, SessionStatus, StageTimestamps,
};
pub use parse::{GeneratedQuery, ParsedQueries};
pub use pipeline::{PipelineState, ProtocolViolation, Stage, StageQueue};
pub use scoring::ScoreWeights;
