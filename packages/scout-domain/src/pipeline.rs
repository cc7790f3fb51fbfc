use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Idle,
	Generating,
	Pass1,
	Pass2,
	Executing,
	Aggregating,
	Complete,
	Error,
}
impl Stage {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Idle => "idle",
			Self::Generating => "generating",
			Self::Pass1 => "pass1",
			Self::Pass2 => "pass2",
			Self::Executing => "executing",
			Self::Aggregating => "aggregating",
			Self::Complete => "complete",
			Self::Error => "error",
		}
	}

	pub fn allowed_targets(self) -> &'static [Stage] {
		match self {
			Self::Idle => &[Self::Generating, Self::Error],
			Self::Generating => &[Self::Pass1, Self::Complete, Self::Error],
			Self::Pass1 => &[Self::Pass2, Self::Complete, Self::Error],
			Self::Pass2 => &[Self::Executing, Self::Complete, Self::Error],
			Self::Executing => &[Self::Aggregating, Self::Error],
			Self::Aggregating => &[Self::Complete, Self::Generating, Self::Error],
			Self::Complete => &[Self::Generating, Self::Idle],
			Self::Error => &[Self::Idle, Self::Generating],
		}
	}

	pub fn can_transition_to(self, target: Stage) -> bool {
		self.allowed_targets().contains(&target)
	}

	/// Stages that do work inside a round.
	pub fn is_active(self) -> bool {
		matches!(
			self,
			Self::Generating | Self::Pass1 | Self::Pass2 | Self::Executing | Self::Aggregating
		)
	}
}
impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Illegal pipeline transition from {from} to {to}.")]
pub struct ProtocolViolation {
	pub from: Stage,
	pub to: Stage,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageQueue {
	pub pending: Vec<Uuid>,
	pub completed: Vec<Uuid>,
}

/// Stage and round bookkeeping for one session. Every stage change goes through
/// [`PipelineState::transition`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
	stage: Stage,
	round: u32,
	queues: BTreeMap<Stage, StageQueue>,
	error: Option<String>,
}
impl PipelineState {
	pub fn new() -> Self {
		Self { stage: Stage::Idle, round: 1, queues: BTreeMap::new(), error: None }
	}

	pub fn stage(&self) -> Stage {
		self.stage
	}

	pub fn round(&self) -> u32 {
		self.round
	}

	pub fn error(&self) -> Option<&str> {
		self.error.as_deref()
	}

	pub fn is_active(&self) -> bool {
		self.stage.is_active()
	}

	pub fn transition(
		&mut self,
		target: Stage,
		error_message: Option<&str>,
	) -> Result<(), ProtocolViolation> {
		let from = self.stage;

		if !from.can_transition_to(target) {
			return Err(ProtocolViolation { from, to: target });
		}

		if target == Stage::Generating
			&& matches!(from, Stage::Aggregating | Stage::Complete | Stage::Error)
		{
			self.queues.clear();

			if matches!(from, Stage::Aggregating | Stage::Complete) {
				self.round += 1;
			}
		}

		if target == Stage::Error {
			self.error = Some(error_message.unwrap_or("Unknown pipeline error.").to_string());
		} else if from == Stage::Error {
			self.error = None;
		}

		self.stage = target;

		Ok(())
	}

	pub fn enqueue(&mut self, stage: Stage, ids: impl IntoIterator<Item = Uuid>) {
		let queue = self.queues.entry(stage).or_default();

		for id in ids {
			if !queue.pending.contains(&id) && !queue.completed.contains(&id) {
				queue.pending.push(id);
			}
		}
	}

	/// Moves `id` from pending to completed. Returns false if it was not pending.
	pub fn mark_completed(&mut self, stage: Stage, id: Uuid) -> bool {
		let Some(queue) = self.queues.get_mut(&stage) else {
			return false;
		};
		let Some(position) = queue.pending.iter().position(|pending| *pending == id) else {
			return false;
		};

		queue.pending.remove(position);
		queue.completed.push(id);

		true
	}

	pub fn pending(&self, stage: Stage) -> &[Uuid] {
		self.queues.get(&stage).map(|queue| queue.pending.as_slice()).unwrap_or(&[])
	}

	pub fn completed(&self, stage: Stage) -> &[Uuid] {
		self.queues.get(&stage).map(|queue| queue.completed.as_slice()).unwrap_or(&[])
	}
}
impl Default for PipelineState {
	fn default() -> Self {
		Self::new()
	}
}
