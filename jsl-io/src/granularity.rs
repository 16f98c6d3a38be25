//! Granularity estimation
//!
//! Maps [`ShapeStats`] to an advisory chunk size in KB:
//!
//! ```text
//! score          = w_depth·depth + w_arrays·container_density
//!                + w_len·length_variance + w_kb·density_per_kb
//! recommendation = clamp(numerator / max(score, epsilon), 1000, 10000)
//! ```
//!
//! The weights and numerator form a tunable [`GranularityPolicy`]; the
//! bounds are fixed. Deeper, more array-heavy, more irregular samples get
//! smaller chunks.

use crate::profile::ShapeStats;
use jsl_format::constants::{
    GRANULARITY_NUMERATOR, MAX_GRANULARITY_KB, MIN_GRANULARITY_KB, SCORE_EPSILON,
    WEIGHT_CONTAINER_DENSITY, WEIGHT_DENSITY_PER_KB, WEIGHT_DEPTH, WEIGHT_LENGTH_VARIANCE,
};
use jsl_format::{JslError, Result};
use serde::{Deserialize, Serialize};

/// Per-feature weights of the complexity score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityWeights {
    /// Weight of structural depth
    pub depth: f64,
    /// Weight of container density
    pub container_density: f64,
    /// Weight of serialized-length standard deviation
    pub length_variance: f64,
    /// Weight of records per KB
    pub density_per_kb: f64,
}

impl Default for ComplexityWeights {
    fn default() -> Self {
        Self {
            depth: WEIGHT_DEPTH,
            container_density: WEIGHT_CONTAINER_DENSITY,
            length_variance: WEIGHT_LENGTH_VARIANCE,
            density_per_kb: WEIGHT_DENSITY_PER_KB,
        }
    }
}

/// Tunable scoring policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GranularityPolicy {
    /// Feature weights
    pub weights: ComplexityWeights,
    /// Divided by the score to get the unclamped recommendation
    pub numerator: f64,
    /// Floor applied to the score before dividing
    pub epsilon: f64,
}

impl Default for GranularityPolicy {
    fn default() -> Self {
        Self {
            weights: ComplexityWeights::default(),
            numerator: GRANULARITY_NUMERATOR,
            epsilon: SCORE_EPSILON,
        }
    }
}

impl GranularityPolicy {
    /// Reject policies that would break the bounds or monotonicity guarantees
    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        let all = [
            ("weights.depth", w.depth),
            ("weights.container_density", w.container_density),
            ("weights.length_variance", w.length_variance),
            ("weights.density_per_kb", w.density_per_kb),
            ("numerator", self.numerator),
            ("epsilon", self.epsilon),
        ];
        for (name, value) in all {
            if !value.is_finite() || value < 0.0 {
                return Err(JslError::InvalidConfig(format!(
                    "{} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        if w.depth <= 0.0 {
            return Err(JslError::InvalidConfig(
                "weights.depth must be positive".to_string(),
            ));
        }
        if self.numerator <= 0.0 || self.epsilon <= 0.0 {
            return Err(JslError::InvalidConfig(
                "numerator and epsilon must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Weighted complexity score; non-negative for any stats
    pub fn score(&self, stats: &ShapeStats) -> f64 {
        let w = &self.weights;
        w.depth * stats.depth as f64
            + w.container_density * stats.container_density
            + w.length_variance * stats.length_variance
            + w.density_per_kb * stats.density_per_kb
    }

    /// Clamped recommendation in KB for a score
    pub fn recommend_for_score(&self, score: f64) -> u32 {
        let score = if score.is_nan() { self.epsilon } else { score };
        let raw = self.numerator / score.max(self.epsilon);
        // NaN never reaches here; infinities saturate in the cast
        (raw.trunc() as u64).clamp(MIN_GRANULARITY_KB as u64, MAX_GRANULARITY_KB as u64) as u32
    }

    /// Score the stats and produce a full estimate
    pub fn estimate(&self, stats: ShapeStats) -> GranularityEstimate {
        let score = self.score(&stats);
        GranularityEstimate {
            recommendation_kb: self.recommend_for_score(score),
            score,
            stats,
        }
    }
}

/// Result of one estimation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GranularityEstimate {
    /// Advisory chunk size in KB, always within [1000, 10000]
    pub recommendation_kb: u32,
    /// Complexity score the recommendation was derived from
    pub score: f64,
    /// Sample statistics the score was computed from
    pub stats: ShapeStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stats(depth: usize, density: f64, variance: f64, per_kb: f64) -> ShapeStats {
        ShapeStats {
            sample_len: 10,
            depth,
            container_density: density,
            length_variance: variance,
            density_per_kb: per_kb,
        }
    }

    #[test]
    fn default_policy_is_valid() {
        assert!(GranularityPolicy::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_policies() {
        let mut policy = GranularityPolicy::default();
        policy.weights.depth = 0.0;
        assert!(policy.validate().is_err());

        let mut policy = GranularityPolicy::default();
        policy.weights.length_variance = -0.1;
        assert!(policy.validate().is_err());

        let mut policy = GranularityPolicy::default();
        policy.numerator = f64::INFINITY;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn weighted_score() {
        let policy = GranularityPolicy::default();
        let score = policy.score(&stats(2, 0.5, 10.0, 4.0));
        assert!((score - (0.6 + 0.2 + 2.0 + 0.4)).abs() < 1e-12);
    }

    #[test]
    fn clamps_both_ends() {
        let policy = GranularityPolicy::default();
        assert_eq!(policy.recommend_for_score(0.0), MAX_GRANULARITY_KB);
        assert_eq!(policy.recommend_for_score(1e-300), MAX_GRANULARITY_KB);
        assert_eq!(policy.recommend_for_score(1e9), MIN_GRANULARITY_KB);
        assert_eq!(policy.recommend_for_score(f64::INFINITY), MIN_GRANULARITY_KB);
        assert_eq!(policy.recommend_for_score(f64::NAN), MAX_GRANULARITY_KB);
        // 20000 / 4 = 5000 sits inside the band
        assert_eq!(policy.recommend_for_score(4.0), 5_000);
    }

    #[test]
    fn empty_sample_recommends_upper_bound() {
        let policy = GranularityPolicy::default();
        let estimate = policy.estimate(ShapeStats::empty());
        // 0.4 + 0.2 + 0.1 = 0.7 → 28571 → clamped
        assert_eq!(estimate.recommendation_kb, MAX_GRANULARITY_KB);
    }

    proptest! {
        #[test]
        fn recommendation_always_in_bounds(
            depth in 0usize..10_000,
            density in 0.0f64..1.0,
            variance in 0.0f64..1e9,
            per_kb in 0.0f64..1e9,
        ) {
            let kb = GranularityPolicy::default()
                .estimate(stats(depth, density, variance, per_kb))
                .recommendation_kb;
            prop_assert!((MIN_GRANULARITY_KB..=MAX_GRANULARITY_KB).contains(&kb));
        }

        #[test]
        fn deeper_samples_never_get_larger_chunks(
            depth in 0usize..200,
            density in 0.0f64..1.0,
            variance in 1.0f64..50.0,
            per_kb in 0.0f64..10.0,
        ) {
            let policy = GranularityPolicy::default();
            let shallow = policy.estimate(stats(depth, density, variance, per_kb));
            let deeper = policy.estimate(stats(depth + 1, density, variance, per_kb));
            prop_assert!(deeper.score > shallow.score);
            prop_assert!(deeper.recommendation_kb <= shallow.recommendation_kb);
        }
    }

    #[test]
    fn strictly_decreasing_between_clamps() {
        let policy = GranularityPolicy::default();
        // 20000/score spans (1000, 10000) for score in (2, 20)
        let mut previous = policy.recommend_for_score(2.5);
        for step in 1..=34 {
            let score = 2.5 + step as f64 * 0.5;
            let current = policy.recommend_for_score(score);
            assert!(current < previous, "score {score}: {current} !< {previous}");
            previous = current;
        }
    }
}
