use time::OffsetDateTime;
use uuid::Uuid;

use scout_domain::QueryContext;

#[derive(Debug, sqlx::FromRow)]
pub struct SessionRow {
	pub session_id: Uuid,
	pub status: String,
	pub stage: String,
	pub current_round: i32,
	pub error: Option<String>,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct QueryRow {
	pub query_id: Uuid,
	pub session_id: Uuid,
	pub round: i32,
	pub query: String,
	pub pass1_score: Option<f64>,
	pub pass1_status: String,
	pub pass2_score: Option<f64>,
	pub pass2_status: String,
	pub composite_score: Option<f64>,
	pub execution_status: String,
	pub result_count: i32,
}

#[derive(Debug, sqlx::FromRow)]
pub struct TopQueryRow {
	pub query: String,
	pub pass1_score: f64,
	pub pass2_score: f64,
	pub composite_score: f64,
}
impl From<TopQueryRow> for QueryContext {
	fn from(row: TopQueryRow) -> Self {
		Self {
			query: row.query,
			pass1_score: row.pass1_score,
			pass2_score: row.pass2_score,
			composite_score: row.composite_score,
		}
	}
}
