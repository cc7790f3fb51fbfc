use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, Result,
	db::Db,
	models::{QueryRow, SessionRow, TopQueryRow},
};
use scout_domain::{CandidateQuery, QueryContext, RoundSummary, Session, SessionStatus, Stage};

/// Inserts the session row or refreshes its mutable columns.
pub async fn upsert_session(db: &Db, session: &Session, stage: Stage) -> Result<()> {
	let now = OffsetDateTime::now_utc();

	sqlx::query(
		"\
INSERT INTO scout_sessions (
	session_id,
	persona,
	seed_query,
	scoring_master_prompt,
	pass1_threshold,
	pass2_threshold,
	query_budget_per_round,
	concurrency_limit,
	max_results_per_query,
	country,
	language,
	status,
	stage,
	current_round,
	error,
	history,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
ON CONFLICT (session_id) DO UPDATE
SET
	status = EXCLUDED.status,
	stage = EXCLUDED.stage,
	current_round = EXCLUDED.current_round,
	error = EXCLUDED.error,
	history = EXCLUDED.history,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(session.session_id)
	.bind(session.persona.as_str())
	.bind(session.seed_query.as_str())
	.bind(session.scoring_master_prompt.as_str())
	.bind(session.pass1_threshold)
	.bind(session.pass2_threshold)
	.bind(to_i32(session.query_budget_per_round))
	.bind(to_i32(session.concurrency_limit))
	.bind(to_i32(session.max_results_per_query))
	.bind(session.country.as_str())
	.bind(session.language.as_str())
	.bind(session.status.as_str())
	.bind(stage.as_str())
	.bind(to_i32(session.current_round))
	.bind(session.error.as_deref())
	.bind(Json(&session.history))
	.bind(session.created_at)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn update_session_status(
	db: &Db,
	session_id: Uuid,
	status: SessionStatus,
	stage: Stage,
	round: u32,
	error: Option<&str>,
	history: &[RoundSummary],
) -> Result<()> {
	let result = sqlx::query(
		"\
UPDATE scout_sessions
SET
	status = $1,
	stage = $2,
	current_round = $3,
	error = $4,
	history = $5,
	updated_at = $6
WHERE session_id = $7",
	)
	.bind(status.as_str())
	.bind(stage.as_str())
	.bind(to_i32(round))
	.bind(error)
	.bind(Json(history))
	.bind(OffsetDateTime::now_utc())
	.bind(session_id)
	.execute(&db.pool)
	.await?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound(format!("Session {session_id}.")));
	}

	Ok(())
}

/// Inserts one round's freshly generated queries in a single transaction. Existing ids are kept.
pub async fn insert_queries(db: &Db, queries: &[CandidateQuery]) -> Result<()> {
	if queries.is_empty() {
		return Ok(());
	}

	let mut tx = db.pool.begin().await?;

	for query in queries {
		sqlx::query(
			"\
INSERT INTO scout_queries (
	query_id,
	session_id,
	round,
	query,
	rationale,
	pass1_status,
	pass2_status,
	execution_status,
	generated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
ON CONFLICT (query_id) DO NOTHING",
		)
		.bind(query.query_id)
		.bind(query.session_id)
		.bind(to_i32(query.round))
		.bind(query.query.as_str())
		.bind(query.rationale.as_str())
		.bind(query.pass1_status.as_str())
		.bind(query.pass2_status.as_str())
		.bind(query.execution_status.as_str())
		.bind(query.timestamps.generated_at)
		.execute(&mut *tx)
		.await?;
	}

	tx.commit().await?;

	Ok(())
}

pub async fn update_query_pass1(db: &Db, query: &CandidateQuery) -> Result<()> {
	let Some(score) = query.pass1.as_ref() else {
		return Err(Error::InvalidArgument(format!("Query {} has no pass-1 score.", query.query_id)));
	};
	let result = sqlx::query(
		"\
UPDATE scout_queries
SET
	pass1_score = $1,
	pass1_breakdown = $2,
	pass1_rationale = $3,
	pass1_tier = $4,
	pass1_status = $5,
	pass1_at = $6
WHERE query_id = $7",
	)
	.bind(score.score)
	.bind(Json(&score.breakdown))
	.bind(score.rationale.as_str())
	.bind(score.tier.as_str())
	.bind(query.pass1_status.as_str())
	.bind(query.timestamps.pass1_at)
	.bind(query.query_id)
	.execute(&db.pool)
	.await?;

	ensure_updated(result.rows_affected(), query.query_id)
}

pub async fn update_query_pass2(db: &Db, query: &CandidateQuery) -> Result<()> {
	let Some(score) = query.pass2.as_ref() else {
		return Err(Error::InvalidArgument(format!("Query {} has no pass-2 score.", query.query_id)));
	};
	let result = sqlx::query(
		"\
UPDATE scout_queries
SET
	pass2_score = $1,
	pass2_breakdown = $2,
	pass2_rationale = $3,
	pass2_tier = $4,
	pass2_status = $5,
	relevant_count = $6,
	top_matches = $7,
	sample_results = $8,
	composite_score = $9,
	pass2_at = $10
WHERE query_id = $11",
	)
	.bind(score.score)
	.bind(Json(&score.breakdown))
	.bind(score.rationale.as_str())
	.bind(score.tier.as_str())
	.bind(query.pass2_status.as_str())
	.bind(to_i32(score.relevant_count))
	.bind(Json(&score.top_matches))
	.bind(Json(&query.sample_results))
	.bind(query.composite_score)
	.bind(query.timestamps.pass2_at)
	.bind(query.query_id)
	.execute(&db.pool)
	.await?;

	ensure_updated(result.rows_affected(), query.query_id)
}

pub async fn update_query_execution(db: &Db, query: &CandidateQuery) -> Result<()> {
	let result = sqlx::query(
		"\
UPDATE scout_queries
SET
	execution_status = $1,
	results = $2,
	result_count = $3,
	executed_at = $4
WHERE query_id = $5",
	)
	.bind(query.execution_status.as_str())
	.bind(Json(&query.results))
	.bind(to_i32(query.result_count))
	.bind(query.timestamps.executed_at)
	.bind(query.query_id)
	.execute(&db.pool)
	.await?;

	ensure_updated(result.rows_affected(), query.query_id)
}

/// Best queries of a session: passed Pass-2 with every score present, composite descending.
pub async fn top_queries(db: &Db, session_id: Uuid, limit: usize) -> Result<Vec<QueryContext>> {
	let rows: Vec<TopQueryRow> = sqlx::query_as(
		"\
SELECT query, pass1_score, pass2_score, composite_score
FROM scout_queries
WHERE session_id = $1
	AND pass2_status = 'passed'
	AND pass1_score IS NOT NULL
	AND pass2_score IS NOT NULL
	AND composite_score IS NOT NULL
ORDER BY composite_score DESC, generated_at ASC
LIMIT $2",
	)
	.bind(session_id)
	.bind(i64::try_from(limit).unwrap_or(i64::MAX))
	.fetch_all(&db.pool)
	.await?;

	Ok(rows.into_iter().map(QueryContext::from).collect())
}

pub async fn fetch_session(db: &Db, session_id: Uuid) -> Result<SessionRow> {
	sqlx::query_as(
		"\
SELECT session_id, status, stage, current_round, error, updated_at
FROM scout_sessions
WHERE session_id = $1",
	)
	.bind(session_id)
	.fetch_optional(&db.pool)
	.await?
	.ok_or_else(|| Error::NotFound(format!("Session {session_id}.")))
}

pub async fn list_queries(db: &Db, session_id: Uuid, round: u32) -> Result<Vec<QueryRow>> {
	let rows = sqlx::query_as(
		"\
SELECT
	query_id,
	session_id,
	round,
	query,
	pass1_score,
	pass1_status,
	pass2_score,
	pass2_status,
	composite_score,
	execution_status,
	result_count
FROM scout_queries
WHERE session_id = $1 AND round = $2
ORDER BY generated_at ASC",
	)
	.bind(session_id)
	.bind(to_i32(round))
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

fn ensure_updated(rows_affected: u64, query_id: Uuid) -> Result<()> {
	if rows_affected == 0 {
		return Err(Error::NotFound(format!("Query {query_id}.")));
	}

	Ok(())
}

fn to_i32<T>(value: T) -> i32
where
	T: TryInto<i32>,
{
	value.try_into().unwrap_or(i32::MAX)
}
