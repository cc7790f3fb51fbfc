//! Best-effort persistence seam. The orchestrator never depends on a store call succeeding.

use uuid::Uuid;

use crate::{BoxFuture, Result};
use scout_domain::{CandidateQuery, QueryContext, Session, Stage};
use scout_storage::{db::Db, queries};

pub trait SessionStore
where
	Self: Send + Sync,
{
	fn save_session<'a>(&'a self, session: &'a Session, stage: Stage) -> BoxFuture<'a, Result<()>>;

	fn update_session_status<'a>(
		&'a self,
		session: &'a Session,
		stage: Stage,
	) -> BoxFuture<'a, Result<()>>;

	fn insert_queries<'a>(&'a self, queries: &'a [CandidateQuery]) -> BoxFuture<'a, Result<()>>;

	/// Writes the fields `stage` produced for `query`.
	fn update_query<'a>(
		&'a self,
		query: &'a CandidateQuery,
		stage: Stage,
	) -> BoxFuture<'a, Result<()>>;

	fn top_queries<'a>(
		&'a self,
		session_id: Uuid,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<QueryContext>>>;
}

/// Discards every write and has no history to read back.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStore;

impl SessionStore for NoopStore {
	fn save_session<'a>(&'a self, _: &'a Session, _: Stage) -> BoxFuture<'a, Result<()>> {
		Box::pin(async { Ok(()) })
	}

	fn update_session_status<'a>(&'a self, _: &'a Session, _: Stage) -> BoxFuture<'a, Result<()>> {
		Box::pin(async { Ok(()) })
	}

	fn insert_queries<'a>(&'a self, _: &'a [CandidateQuery]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async { Ok(()) })
	}

	fn update_query<'a>(&'a self, _: &'a CandidateQuery, _: Stage) -> BoxFuture<'a, Result<()>> {
		Box::pin(async { Ok(()) })
	}

	fn top_queries<'a>(&'a self, _: Uuid, _: usize) -> BoxFuture<'a, Result<Vec<QueryContext>>> {
		Box::pin(async { Ok(Vec::new()) })
	}
}

pub struct PgSessionStore {
	db: Db,
}
impl PgSessionStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}

impl SessionStore for PgSessionStore {
	fn save_session<'a>(&'a self, session: &'a Session, stage: Stage) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(queries::upsert_session(&self.db, session, stage).await?) })
	}

	fn update_session_status<'a>(
		&'a self,
		session: &'a Session,
		stage: Stage,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			queries::update_session_status(
				&self.db,
				session.session_id,
				session.status,
				stage,
				session.current_round,
				session.error.as_deref(),
				&session.history,
			)
			.await?;

			Ok(())
		})
	}

	fn insert_queries<'a>(&'a self, batch: &'a [CandidateQuery]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(queries::insert_queries(&self.db, batch).await?) })
	}

	fn update_query<'a>(
		&'a self,
		query: &'a CandidateQuery,
		stage: Stage,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			match stage {
				Stage::Pass1 => queries::update_query_pass1(&self.db, query).await?,
				Stage::Pass2 => queries::update_query_pass2(&self.db, query).await?,
				Stage::Executing => queries::update_query_execution(&self.db, query).await?,
				Stage::Idle
				| Stage::Generating
				| Stage::Aggregating
				| Stage::Complete
				| Stage::Error => {},
			}

			Ok(())
		})
	}

	fn top_queries<'a>(
		&'a self,
		session_id: Uuid,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<QueryContext>>> {
		Box::pin(async move { Ok(queries::top_queries(&self.db, session_id, limit).await?) })
	}
}
