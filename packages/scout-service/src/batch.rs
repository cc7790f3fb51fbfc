//! Group-synchronous fan-out with per-item failure isolation.
//!
//! Items run in sequential groups of `limit`; a group is awaited in full before the next one
//! starts, so throughput is bounded by the slowest item of each group.

use std::{any::Any, collections::HashMap, future::Future, hash::Hash, panic::AssertUnwindSafe};

use futures::{FutureExt, future};

use crate::{Error, control::{Halt, RunControl}};

#[derive(Debug)]
pub enum ItemFailure<E> {
	Failed(E),
	Panicked(String),
}
impl ItemFailure<Error> {
	pub fn into_error(self) -> Error {
		match self {
			Self::Failed(err) => err,
			Self::Panicked(message) => Error::Panicked { message },
		}
	}
}

#[derive(Debug)]
pub struct BatchReport<K, R, E> {
	pub results: HashMap<K, Result<R, ItemFailure<E>>>,
	pub failures: usize,
	/// Keys never dispatched because the run halted, in input order.
	pub pending: Vec<K>,
	pub halted: Option<Halt>,
}

/// Runs `op` over `items` in groups of `limit` (zero is treated as one). The halt signal is
/// read before each group; once set, the remaining keys are reported as pending.
pub async fn run_batched<K, T, R, E, F, Fut>(
	items: Vec<(K, T)>,
	limit: usize,
	control: &RunControl,
	op: F,
) -> BatchReport<K, R, E>
where
	K: Eq + Hash + Clone,
	F: Fn(T) -> Fut,
	Fut: Future<Output = Result<R, E>>,
{
	let limit = limit.max(1);
	let mut report = BatchReport {
		results: HashMap::with_capacity(items.len()),
		failures: 0,
		pending: Vec::new(),
		halted: None,
	};
	let mut remaining = items.into_iter();

	loop {
		let group = remaining.by_ref().take(limit).collect::<Vec<_>>();

		if group.is_empty() {
			break;
		}
		if let Some(halt) = control.halt() {
			report.halted = Some(halt);
			report.pending.extend(group.into_iter().map(|(key, _)| key));
			report.pending.extend(remaining.by_ref().map(|(key, _)| key));

			break;
		}

		let calls = group.into_iter().map(|(key, item)| {
			let call = AssertUnwindSafe(op(item)).catch_unwind();

			async move { (key, call.await) }
		});

		for (key, outcome) in future::join_all(calls).await {
			let result = match outcome {
				Ok(Ok(value)) => Ok(value),
				Ok(Err(err)) => Err(ItemFailure::Failed(err)),
				Err(payload) => Err(ItemFailure::Panicked(panic_message(payload))),
			};

			if result.is_err() {
				report.failures += 1;
			}

			report.results.insert(key, result);
		}
	}

	report
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		return (*message).to_string();
	}
	if let Some(message) = payload.downcast_ref::<String>() {
		return message.clone();
	}

	"Unknown panic payload.".to_string()
}
