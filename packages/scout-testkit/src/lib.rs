//! Throwaway Postgres databases for storage tests.

mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::runtime::Builder;
use uuid::Uuid;

/// Database the test databases are created from and dropped through.
const MAINTENANCE_DB: &str = "postgres";

/// A uniquely named database, dropped by [`TestDatabase::cleanup`] or on `Drop`.
pub struct TestDatabase {
	dsn: String,
	maintenance: PgConnectOptions,
	// `None` once the database has been dropped.
	name: Option<String>,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Invalid SCOUT_PG_DSN: {err}.")))?;
		let maintenance = base.clone().database(MAINTENANCE_DB);
		let name = format!("scout_test_{}", Uuid::new_v4().simple());
		let mut conn = PgConnection::connect_with(&maintenance).await?;

		sqlx::query(&format!(r#"CREATE DATABASE "{name}""#)).execute(&mut conn).await?;
		conn.close().await?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { dsn, maintenance, name: Some(name) })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub async fn cleanup(mut self) -> Result<()> {
		match self.name.take() {
			Some(name) => drop_database(&self.maintenance, &name).await,
			None => Ok(()),
		}
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		let Some(name) = self.name.take() else {
			return;
		};
		let maintenance = self.maintenance.clone();
		// The caller may still be inside a runtime.
		let worker = thread::spawn(move || {
			let dropped = Builder::new_current_thread()
				.enable_all()
				.build()
				.map_err(|err| Error::Message(err.to_string()))
				.and_then(|runtime| runtime.block_on(drop_database(&maintenance, &name)));

			if let Err(err) = dropped {
				eprintln!("Failed to drop test database {name}: {err}.");
			}
		});

		let _ = worker.join();
	}
}

pub fn env_dsn() -> Option<String> {
	env::var("SCOUT_PG_DSN").ok().filter(|dsn| !dsn.trim().is_empty())
}

async fn drop_database(maintenance: &PgConnectOptions, name: &str) -> Result<()> {
	let mut conn = PgConnection::connect_with(maintenance).await?;

	sqlx::query(
		"\
SELECT pg_terminate_backend(pid)
FROM pg_stat_activity
WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.execute(&mut conn)
	.await?;
	sqlx::query(&format!(r#"DROP DATABASE IF EXISTS "{name}""#)).execute(&mut conn).await?;
	conn.close().await?;

	Ok(())
}
