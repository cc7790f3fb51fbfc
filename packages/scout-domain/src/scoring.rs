use serde::{Deserialize, Serialize};

use crate::model::{Pass1Breakdown, Pass2Breakdown};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

const WEIGHT_TOLERANCE: f64 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
	pub pass1: f64,
	pub pass2: f64,
}
impl ScoreWeights {
	pub fn new(pass1: f64, pass2: f64) -> Self {
		Self { pass1, pass2 }
	}

	/// Rescales the weights to sum to 1.0 when they drift beyond tolerance. Unusable weights
	/// (non-finite, negative, or summing to zero) fall back to the defaults.
	pub fn normalized(self) -> Self {
		let usable = self.pass1.is_finite()
			&& self.pass2.is_finite()
			&& self.pass1 >= 0.0
			&& self.pass2 >= 0.0;
		let sum = self.pass1 + self.pass2;

		if !usable || sum <= 0.0 {
			return Self::default();
		}
		if (sum - 1.0).abs() <= WEIGHT_TOLERANCE {
			return self;
		}

		Self { pass1: self.pass1 / sum, pass2: self.pass2 / sum }
	}
}
impl Default for ScoreWeights {
	fn default() -> Self {
		Self { pass1: 0.3, pass2: 0.7 }
	}
}
impl From<&scout_config::Pipeline> for ScoreWeights {
	fn from(cfg: &scout_config::Pipeline) -> Self {
		Self::new(cfg.pass1_weight, cfg.pass2_weight)
	}
}

pub fn clamp_score(score: f64) -> f64 {
	if score.is_nan() {
		return MIN_SCORE;
	}

	score.clamp(MIN_SCORE, MAX_SCORE)
}

pub fn composite(pass1: f64, pass2: f64, weights: ScoreWeights) -> f64 {
	let weights = weights.normalized();

	clamp_score(pass1) * weights.pass1 + clamp_score(pass2) * weights.pass2
}

/// Threshold check on a single stage score. The composite never decides survival.
pub fn passes(score: f64, threshold: f64) -> bool {
	score >= threshold
}

fn clamp_to(value: f64, max: f64) -> f64 {
	if value.is_nan() {
		return 0.0;
	}

	value.clamp(0.0, max)
}

impl Pass1Breakdown {
	pub const PERSONA_FIT_MAX: f64 = 40.0;
	pub const BOOLEAN_PRECISION_MAX: f64 = 35.0;
	pub const REACH_MAX: f64 = 25.0;

	pub fn clamped(self) -> Self {
		Self {
			persona_fit: clamp_to(self.persona_fit, Self::PERSONA_FIT_MAX),
			boolean_precision: clamp_to(self.boolean_precision, Self::BOOLEAN_PRECISION_MAX),
			reach: clamp_to(self.reach, Self::REACH_MAX),
		}
	}

	pub fn total(&self) -> f64 {
		self.persona_fit + self.boolean_precision + self.reach
	}
}

impl Pass2Breakdown {
	pub const RESULT_RELEVANCE_MAX: f64 = 50.0;
	pub const RESULT_QUALITY_MAX: f64 = 30.0;
	pub const DIVERSITY_MAX: f64 = 20.0;

	pub fn clamped(self) -> Self {
		Self {
			result_relevance: clamp_to(self.result_relevance, Self::RESULT_RELEVANCE_MAX),
			result_quality: clamp_to(self.result_quality, Self::RESULT_QUALITY_MAX),
			diversity: clamp_to(self.diversity, Self::DIVERSITY_MAX),
		}
	}

	pub fn total(&self) -> f64 {
		self.result_relevance + self.result_quality + self.diversity
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn approx(a: f64, b: f64) -> bool {
		(a - b).abs() < 1e-9
	}

	#[test]
	fn default_weights_favor_pass2() {
		assert!(approx(composite(82.0, 76.0, ScoreWeights::default()), 77.8));
	}

	#[test]
	fn out_of_range_scores_are_clamped_before_weighting() {
		let weights = ScoreWeights::default();

		assert!(approx(composite(-10.0, 150.0, weights), composite(0.0, 100.0, weights)));
		assert!(approx(composite(-10.0, 150.0, weights), 70.0));
	}

	#[test]
	fn drifting_weights_are_rescaled() {
		let normalized = ScoreWeights::new(3.0, 7.0).normalized();

		assert!(approx(normalized.pass1, 0.3));
		assert!(approx(normalized.pass2, 0.7));
		assert!(approx(composite(82.0, 76.0, ScoreWeights::new(3.0, 7.0)), 77.8));
	}

	#[test]
	fn weights_within_tolerance_are_kept() {
		let weights = ScoreWeights::new(0.3005, 0.7);

		assert_eq!(weights.normalized(), weights);
	}

	#[test]
	fn unusable_weights_fall_back_to_defaults() {
		assert_eq!(ScoreWeights::new(0.0, 0.0).normalized(), ScoreWeights::default());
		assert_eq!(ScoreWeights::new(f64::NAN, 1.0).normalized(), ScoreWeights::default());
	}

	#[test]
	fn threshold_is_inclusive() {
		assert!(passes(60.0, 60.0));
		assert!(!passes(59.9, 60.0));
	}

	#[test]
	fn breakdowns_clamp_to_their_bounds() {
		let pass1 =
			Pass1Breakdown { persona_fit: 55.0, boolean_precision: -3.0, reach: 10.0 }.clamped();

		assert_eq!(pass1, Pass1Breakdown { persona_fit: 40.0, boolean_precision: 0.0, reach: 10.0 });

		let pass2 =
			Pass2Breakdown { result_relevance: 51.0, result_quality: 31.0, diversity: 21.0 }
				.clamped();

		assert!(approx(pass2.total(), 100.0));
	}
}
