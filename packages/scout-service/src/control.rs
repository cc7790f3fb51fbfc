//! Cooperative pause and stop signals shared between the orchestrator and its callers.

use std::sync::{
	Arc, Mutex,
	atomic::{AtomicBool, Ordering},
};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Halt {
	Paused,
	Stopped,
}

/// Clonable handle. Pausing is a flag read at batch-group boundaries; stopping also cancels
/// the token passed to every in-flight provider call.
#[derive(Clone, Debug, Default)]
pub struct RunControl {
	inner: Arc<Inner>,
}
impl RunControl {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn pause(&self) {
		self.inner.paused.store(true, Ordering::SeqCst);
	}

	pub fn clear_pause(&self) {
		self.inner.paused.store(false, Ordering::SeqCst);
	}

	pub fn is_paused(&self) -> bool {
		self.inner.paused.load(Ordering::SeqCst)
	}

	pub fn stop(&self) {
		self.token().cancel();
	}

	pub fn is_stopped(&self) -> bool {
		self.token().is_cancelled()
	}

	pub fn is_running(&self) -> bool {
		self.inner.running.load(Ordering::SeqCst)
	}

	pub fn token(&self) -> CancellationToken {
		self.inner.token.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	/// Stop wins over pause.
	pub fn halt(&self) -> Option<Halt> {
		if self.is_stopped() {
			Some(Halt::Stopped)
		} else if self.is_paused() {
			Some(Halt::Paused)
		} else {
			None
		}
	}

	/// Clears both signals before a run. A cancelled token cannot be reset, so it is replaced.
	pub(crate) fn rearm(&self) {
		let mut token = self.inner.token.lock().unwrap_or_else(|err| err.into_inner());

		if token.is_cancelled() {
			*token = CancellationToken::new();
		}

		self.clear_pause();
	}

	pub(crate) fn begin_run(&self) -> Option<RunGuard> {
		self.inner
			.running
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.ok()
			.map(|_| RunGuard { control: self.clone() })
	}
}

/// Clears the running flag when the run future completes or is dropped.
pub(crate) struct RunGuard {
	control: RunControl,
}
impl Drop for RunGuard {
	fn drop(&mut self) {
		self.control.inner.running.store(false, Ordering::SeqCst);
	}
}

#[derive(Debug, Default)]
struct Inner {
	paused: AtomicBool,
	running: AtomicBool,
	token: Mutex<CancellationToken>,
}
