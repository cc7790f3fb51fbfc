use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use scout_config::{Config, Error};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_toml() -> String {
	SAMPLE_CONFIG_TEMPLATE_TOML.to_string()
}

fn sample_toml_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");
	let mut table = root.as_table_mut().expect("Template config must be a table.");

	for part in section.split('.') {
		table = table
			.get_mut(part)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Template config must include [{section}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("scout_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_payload(payload: String) -> scout_config::Result<Config> {
	let path = write_temp_config(payload);
	let result = scout_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn base_config() -> Config {
	toml::from_str(&sample_toml()).expect("Failed to parse test config.")
}

fn expect_validation(payload: String, expected: &str) {
	let err = load_payload(payload).expect_err("Expected validation error.");

	assert!(matches!(err, Error::Validation { .. }), "Unexpected error kind: {err:?}");

	let message = err.to_string();

	assert!(message.contains(expected), "Unexpected error message: {message}");
}

#[test]
fn sample_config_loads_with_defaults() {
	let cfg = load_payload(sample_toml()).expect("Expected sample config to load.");

	assert_eq!(cfg.session.pass1_threshold, 60.0);
	assert_eq!(cfg.session.pass2_threshold, 50.0);
	assert_eq!(cfg.session.query_budget_per_round, 10);
	assert_eq!(cfg.pipeline.context_top_k, 5);
	assert_eq!(cfg.providers.completion.retry.max_retries, 3);
	assert_eq!(cfg.providers.search.retry.base_backoff_ms, 500);
}

#[test]
fn empty_postgres_dsn_disables_storage() {
	let cfg = load_payload(sample_toml()).expect("Expected sample config to load.");

	assert!(cfg.storage.postgres.is_none());

	let payload = sample_toml_with(
		"storage.postgres",
		"dsn",
		Value::String("postgres://scout@localhost/scout".to_string()),
	);
	let cfg = load_payload(payload).expect("Expected config with DSN to load.");

	assert!(cfg.storage.postgres.is_some());
}

#[test]
fn session_thresholds_must_be_in_range() {
	expect_validation(
		sample_toml_with("session", "pass1_threshold", Value::Float(120.0)),
		"session.pass1_threshold must be in the range 0-100.",
	);
	expect_validation(
		sample_toml_with("session", "pass2_threshold", Value::Float(-1.0)),
		"session.pass2_threshold must be in the range 0-100.",
	);
}

#[test]
fn session_limits_must_be_positive() {
	expect_validation(
		sample_toml_with("session", "concurrency_limit", Value::Integer(0)),
		"session.concurrency_limit must be greater than zero.",
	);
	expect_validation(
		sample_toml_with("session", "query_budget_per_round", Value::Integer(0)),
		"session.query_budget_per_round must be greater than zero.",
	);
	expect_validation(
		sample_toml_with("session", "max_results_per_query", Value::Integer(0)),
		"session.max_results_per_query must be greater than zero.",
	);
}

#[test]
fn session_persona_is_required() {
	expect_validation(
		sample_toml_with("session", "persona", Value::String("   ".to_string())),
		"session.persona must be non-empty.",
	);
}

#[test]
fn pipeline_weights_cannot_both_be_zero() {
	let mut cfg = base_config();

	cfg.pipeline.pass1_weight = 0.0;
	cfg.pipeline.pass2_weight = 0.0;

	let err = scout_config::validate(&cfg).expect_err("Expected weight validation error.");

	assert!(
		err.to_string().contains("must not both be zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn pipeline_weights_must_be_non_negative() {
	let mut cfg = base_config();

	cfg.pipeline.pass1_weight = -0.1;

	let err = scout_config::validate(&cfg).expect_err("Expected weight validation error.");

	assert!(
		err.to_string().contains("pipeline.pass1_weight must be zero or greater."),
		"Unexpected error: {err}"
	);
}

#[test]
fn provider_api_key_is_required() {
	expect_validation(
		sample_toml_with("providers.completion", "api_key", Value::String(String::new())),
		"providers.completion.api_key must be non-empty.",
	);
}

#[test]
fn retry_backoff_bounds_must_be_ordered() {
	let mut cfg = base_config();

	cfg.providers.search.retry.base_backoff_ms = 5_000;
	cfg.providers.search.retry.max_backoff_ms = 1_000;

	let err = scout_config::validate(&cfg).expect_err("Expected retry validation error.");

	assert!(
		err.to_string().contains("providers.search.retry.max_backoff_ms"),
		"Unexpected error: {err}"
	);
}

#[test]
fn default_headers_must_be_strings() {
	let mut cfg = base_config();

	cfg.providers.completion.default_headers.insert("X-Retries".to_string(), 3.into());

	let err = scout_config::validate(&cfg).expect_err("Expected header validation error.");

	assert!(
		err.to_string().contains("providers.completion.default_headers values must be strings."),
		"Unexpected error: {err}"
	);
}

#[test]
fn missing_file_reports_read_error() {
	let err = scout_config::load(&PathBuf::from("/nonexistent/scout.toml"))
		.expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }));
}

#[test]
fn scout_example_toml_is_valid() {
	let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));

	path.push("../../scout.example.toml");

	scout_config::load(&path).expect("Expected scout.example.toml to be a valid config.");
}
