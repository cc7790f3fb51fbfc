use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub providers: Providers,
	#[serde(default)]
	pub storage: Storage,
	#[serde(default)]
	pub pipeline: Pipeline,
	pub session: SessionSettings,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub completion: LlmProviderConfig,
	pub search: SearchProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	#[serde(default)]
	pub retry: Retry,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SearchProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	#[serde(default)]
	pub retry: Retry,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct Retry {
	/// Attempts after the first request. Zero disables retries.
	pub max_retries: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
}
impl Default for Retry {
	fn default() -> Self {
		Self { max_retries: 3, base_backoff_ms: 500, max_backoff_ms: 30_000 }
	}
}

#[derive(Debug, Default, Deserialize)]
pub struct Storage {
	/// Optional. Without it the pipeline runs against a no-op store.
	pub postgres: Option<Postgres>,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct Pipeline {
	pub pass1_weight: f64,
	pub pass2_weight: f64,
	/// Result cap for the Pass-2 sample search.
	pub sample_results: u32,
	/// Number of top queries carried into the next round's generation prompt.
	pub context_top_k: usize,
}
impl Default for Pipeline {
	fn default() -> Self {
		Self { pass1_weight: 0.3, pass2_weight: 0.7, sample_results: 10, context_top_k: 5 }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionSettings {
	pub persona: String,
	pub seed_query: String,
	#[serde(default)]
	pub scoring_master_prompt: String,
	#[serde(default = "default_pass1_threshold")]
	pub pass1_threshold: f64,
	#[serde(default = "default_pass2_threshold")]
	pub pass2_threshold: f64,
	#[serde(default = "default_query_budget")]
	pub query_budget_per_round: u32,
	#[serde(default = "default_concurrency_limit")]
	pub concurrency_limit: usize,
	#[serde(default = "default_max_results")]
	pub max_results_per_query: u32,
	#[serde(default = "default_country")]
	pub country: String,
	#[serde(default = "default_language")]
	pub language: String,
}

fn default_pass1_threshold() -> f64 {
	60.0
}

fn default_pass2_threshold() -> f64 {
	50.0
}

fn default_query_budget() -> u32 {
	10
}

fn default_concurrency_limit() -> usize {
	3
}

fn default_max_results() -> u32 {
	50
}

fn default_country() -> String {
	"us".to_string()
}

fn default_language() -> String {
	"en".to_string()
}
