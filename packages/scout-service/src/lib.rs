pub mod batch;
pub mod control;
pub mod orchestrator;
pub mod prompts;
pub mod store;

mod error;

pub use control::{Halt, RunControl};
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, PipelineSettings, RoundReport, RunOutcome};
pub use store::{NoopStore, PgSessionStore, SessionStore};

use std::{future::Future, pin::Pin, sync::Arc};

use tokio_util::sync::CancellationToken;

use scout_config::{LlmProviderConfig, SearchProviderConfig};
use scout_domain::{SearchRequest, SearchResponse};
use scout_providers::{completion, search};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait CompletionProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		prompt: &'a str,
		system_prompt: Option<&'a str>,
		cancel: &'a CancellationToken,
	) -> BoxFuture<'a, Result<String>>;
}

pub trait SearchProvider
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		cfg: &'a SearchProviderConfig,
		request: &'a SearchRequest,
		cancel: &'a CancellationToken,
	) -> BoxFuture<'a, Result<SearchResponse>>;
}

#[derive(Clone)]
pub struct Providers {
	pub completion: Arc<dyn CompletionProvider>,
	pub search: Arc<dyn SearchProvider>,
}
impl Providers {
	pub fn new(completion: Arc<dyn CompletionProvider>, search: Arc<dyn SearchProvider>) -> Self {
		Self { completion, search }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { completion: provider.clone(), search: provider }
	}
}

struct DefaultProviders;

impl CompletionProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		prompt: &'a str,
		system_prompt: Option<&'a str>,
		cancel: &'a CancellationToken,
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move { Ok(completion::complete(cfg, prompt, system_prompt, cancel).await?) })
	}
}

impl SearchProvider for DefaultProviders {
	fn search<'a>(
		&'a self,
		cfg: &'a SearchProviderConfig,
		request: &'a SearchRequest,
		cancel: &'a CancellationToken,
	) -> BoxFuture<'a, Result<SearchResponse>> {
		Box::pin(async move { Ok(search::search(cfg, request, cancel).await?) })
	}
}
