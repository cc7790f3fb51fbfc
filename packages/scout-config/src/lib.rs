mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, LlmProviderConfig, Pipeline, Postgres, Providers, Retry, SearchProviderConfig,
	Service, SessionSettings, Storage,
};

use std::{fs, path::Path};

use serde_json::{Map, Value};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}

	validate_session(&cfg.session)?;
	validate_pipeline(&cfg.pipeline)?;

	let completion = &cfg.providers.completion;
	let search = &cfg.providers.search;

	for (label, api_base, api_key, headers, retry) in [
		(
			"completion",
			&completion.api_base,
			&completion.api_key,
			&completion.default_headers,
			&completion.retry,
		),
		("search", &search.api_base, &search.api_key, &search.default_headers, &search.retry),
	] {
		if api_base.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("providers.{label}.api_base must be non-empty."),
			});
		}
		if api_key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("providers.{label}.api_key must be non-empty."),
			});
		}
		if !headers_are_strings(headers) {
			return Err(Error::Validation {
				message: format!("providers.{label}.default_headers values must be strings."),
			});
		}
		if retry.max_backoff_ms < retry.base_backoff_ms {
			return Err(Error::Validation {
				message: format!(
					"providers.{label}.retry.max_backoff_ms must be greater than or equal to base_backoff_ms."
				),
			});
		}
	}

	if !completion.temperature.is_finite() || completion.temperature < 0.0 {
		return Err(Error::Validation {
			message: "providers.completion.temperature must be a finite number, zero or greater."
				.to_string(),
		});
	}

	if let Some(postgres) = cfg.storage.postgres.as_ref()
		&& postgres.pool_max_conns == 0
	{
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_session(session: &SessionSettings) -> Result<()> {
	for (label, value) in
		[("session.persona", &session.persona), ("session.seed_query", &session.seed_query)]
	{
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}
	for (label, value) in [
		("session.pass1_threshold", session.pass1_threshold),
		("session.pass2_threshold", session.pass2_threshold),
	] {
		if !value.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if !(0.0..=100.0).contains(&value) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0-100."),
			});
		}
	}

	if session.query_budget_per_round == 0 {
		return Err(Error::Validation {
			message: "session.query_budget_per_round must be greater than zero.".to_string(),
		});
	}
	if session.concurrency_limit == 0 {
		return Err(Error::Validation {
			message: "session.concurrency_limit must be greater than zero.".to_string(),
		});
	}
	if session.max_results_per_query == 0 {
		return Err(Error::Validation {
			message: "session.max_results_per_query must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_pipeline(pipeline: &Pipeline) -> Result<()> {
	for (label, weight) in [
		("pipeline.pass1_weight", pipeline.pass1_weight),
		("pipeline.pass2_weight", pipeline.pass2_weight),
	] {
		if !weight.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if weight < 0.0 {
			return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
		}
	}

	if pipeline.pass1_weight + pipeline.pass2_weight <= 0.0 {
		return Err(Error::Validation {
			message: "pipeline.pass1_weight and pipeline.pass2_weight must not both be zero."
				.to_string(),
		});
	}
	if pipeline.sample_results == 0 {
		return Err(Error::Validation {
			message: "pipeline.sample_results must be greater than zero.".to_string(),
		});
	}
	if pipeline.context_top_k == 0 {
		return Err(Error::Validation {
			message: "pipeline.context_top_k must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn headers_are_strings(headers: &Map<String, Value>) -> bool {
	headers.values().all(Value::is_string)
}

fn normalize(cfg: &mut Config) {
	if cfg.storage.postgres.as_ref().map(|pg| pg.dsn.trim().is_empty()).unwrap_or(false) {
		cfg.storage.postgres = None;
	}

	let session = &mut cfg.session;

	session.persona = session.persona.trim().to_string();
	session.seed_query = session.seed_query.trim().to_string();
	session.country = session.country.trim().to_lowercase();
	session.language = session.language.trim().to_lowercase();
}
