use std::{fs, path::PathBuf, sync::Arc};

use clap::{
	Parser,
	builder::{
		Styles,
		styling::{AnsiColor, Effects},
	},
};
use color_eyre::eyre;
use serde::Serialize;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use scout_config::Config;
use scout_domain::{AggregatedResult, CandidateQuery, QueryContext, Session};
use scout_service::{
	NoopStore, Orchestrator, PgSessionStore, PipelineSettings, Providers, RoundReport,
	RunOutcome, SessionStore,
};
use scout_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = env!("CARGO_PKG_VERSION"),
	rename_all = "kebab",
	styles = styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Rounds to run. Later rounds are seeded with the best queries of earlier ones.
	#[arg(long, short = 'r', default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
	pub rounds: u32,
	/// Where to write the JSON report. Defaults to stdout.
	#[arg(long, short = 'o', value_name = "FILE")]
	pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
	pub session: &'a Session,
	pub rounds: &'a [RoundReport],
	pub queries: &'a [CandidateQuery],
	pub results: &'a [AggregatedResult],
	/// Queries the next round would be seeded with.
	pub context: &'a [QueryContext],
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = scout_config::load(&args.config)?;
	init_tracing(&config)?;
	let store = open_store(&config).await?;
	let session = Session::from_settings(&config.session, OffsetDateTime::now_utc());
	let settings = PipelineSettings::from_config(&config);
	let mut orchestrator = Orchestrator::new(session, Providers::default(), store, settings);
	let control = orchestrator.handle();
	let interrupt = tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			tracing::warn!("Interrupt received. Stopping the pipeline.");
			control.stop();
		}
	});

	let rounds = run_rounds(&mut orchestrator, args.rounds).await;
	interrupt.abort();
	let rounds = rounds?;

	let report = RunReport {
		session: orchestrator.session(),
		rounds: &rounds,
		queries: orchestrator.queries(),
		results: orchestrator.results(),
		context: orchestrator.context(),
	};
	let json = serde_json::to_string_pretty(&report)?;

	match args.output.as_ref() {
		Some(path) => {
			fs::write(path, json)?;
			tracing::info!(path = %path.display(), results = report.results.len(), "Report written.");
		},
		None => println!("{json}"),
	}

	if let Some(RunOutcome::Failed { message }) = rounds.last().map(|round| &round.outcome) {
		return Err(eyre::eyre!("Pipeline failed: {message}"));
	}

	Ok(())
}

/// Whether a finished round allows the next one to start.
pub fn continues(outcome: &RunOutcome) -> bool {
	matches!(outcome, RunOutcome::Completed | RunOutcome::NoSurvivors { .. })
}

async fn run_rounds(
	orchestrator: &mut Orchestrator,
	rounds: u32,
) -> color_eyre::Result<Vec<RoundReport>> {
	let mut reports = vec![orchestrator.start().await];

	while reports.len() < rounds as usize
		&& reports.last().is_some_and(|report| continues(&report.outcome))
	{
		reports.push(orchestrator.generate_more().await?);
	}

	Ok(reports)
}

async fn open_store(config: &Config) -> color_eyre::Result<Arc<dyn SessionStore>> {
	let Some(postgres) = config.storage.postgres.as_ref() else {
		tracing::info!("No Postgres DSN configured. Session state stays in memory.");

		return Ok(Arc::new(NoopStore));
	};
	let db = Db::connect(postgres).await?;

	db.ensure_schema().await?;

	Ok(Arc::new(PgSessionStore::new(db)))
}

fn init_tracing(config: &Config) -> color_eyre::Result<()> {
	let filter = log_filter(&config.service.log_level)?;

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	Ok(())
}

fn log_filter(directives: &str) -> color_eyre::Result<EnvFilter> {
	EnvFilter::try_new(directives)
		.map_err(|err| eyre::eyre!("Invalid service.log_level {directives:?}: {err}."))
}

fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Red.on_default() | Effects::BOLD)
		.usage(AnsiColor::Red.on_default() | Effects::BOLD)
		.literal(AnsiColor::Blue.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
}

#[cfg(test)]
mod tests {
	use scout_domain::Stage;

	use super::*;

	#[test]
	fn rounds_default_to_one() {
		let args = Args::try_parse_from(["scout", "--config", "scout.toml"]).expect("Valid args.");

		assert_eq!(args.rounds, 1);
		assert!(args.output.is_none());
	}

	#[test]
	fn zero_rounds_are_rejected() {
		assert!(Args::try_parse_from(["scout", "-c", "scout.toml", "--rounds", "0"]).is_err());
	}

	#[test]
	fn log_level_directives_are_parsed() {
		assert!(log_filter("info,scout_service=debug").is_ok());
	}

	#[test]
	fn malformed_log_level_is_an_error() {
		let err = log_filter("scout_service=loud").expect_err("Expected a filter error.");

		assert!(err.to_string().contains("service.log_level"));
	}

	#[test]
	fn only_finished_rounds_continue() {
		assert!(continues(&RunOutcome::Completed));
		assert!(continues(&RunOutcome::NoSurvivors { stage: Stage::Pass1 }));
		assert!(!continues(&RunOutcome::Stopped { stage: Stage::Pass2 }));
		assert!(!continues(&RunOutcome::Failed { message: "boom".to_string() }));
		assert!(!continues(&RunOutcome::AlreadyRunning));
	}
}
