//! Match decision for a pair of document faces.
//!
//! Turns a similarity score and two quality scores into a match verdict, a
//! confidence level, and a manual-review flag. The similarity threshold adapts
//! to image quality: a pair with one sharp, large face and one weaker face is
//! judged against the lower threshold.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Thresholds of the decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionPolicy {
    /// Pairs whose weaker face scores below this are rejected.
    pub min_quality: u32,
    /// Stronger face must reach this for the lower threshold to apply.
    pub high_quality: u32,
    /// Weaker face must stay below this for the lower threshold to apply.
    pub low_quality: u32,
    pub high_similarity_threshold: f32,
    pub default_similarity_threshold: f32,
    /// At or above this similarity the match is HIGH confidence.
    pub high_confidence_threshold: f32,
    /// Margin below the threshold that still matches, pending manual review.
    pub tolerance_band: f32,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            min_quality: 25,
            high_quality: 60,
            low_quality: 70,
            high_similarity_threshold: 0.33,
            default_similarity_threshold: 0.45,
            high_confidence_threshold: 0.60,
            tolerance_band: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    NoMatch,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("Face quality too low (minimum quality: {0}). Please provide clearer images.")]
    LowQuality(u32),
}

/// Outcome of [`DecisionPolicy::decide`].
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub matched: bool,
    pub level: ConfidenceLevel,
    pub requires_manual_review: bool,
    /// Similarity threshold that was applied.
    pub threshold: f32,
}

impl DecisionPolicy {
    /// Threshold for a pair with the given quality scores.
    pub fn threshold_for(&self, quality_1: u32, quality_2: u32) -> f32 {
        let low_q = quality_1.min(quality_2);
        let high_q = quality_1.max(quality_2);
        if high_q >= self.high_quality && low_q < self.low_quality {
            self.high_similarity_threshold
        } else {
            self.default_similarity_threshold
        }
    }

    pub fn decide(&self, similarity: f32, quality_1: u32, quality_2: u32) -> Result<Decision, Rejection> {
        let low_q = quality_1.min(quality_2);
        if low_q < self.min_quality {
            return Err(Rejection::LowQuality(low_q));
        }

        let threshold = self.threshold_for(quality_1, quality_2);

        let (matched, level, requires_manual_review) = if similarity >= self.high_confidence_threshold {
            (true, ConfidenceLevel::High, false)
        } else if similarity >= threshold {
            (true, ConfidenceLevel::Medium, false)
        } else if similarity >= threshold - self.tolerance_band {
            (true, ConfidenceLevel::Low, true)
        } else {
            (false, ConfidenceLevel::NoMatch, false)
        };

        Ok(Decision {
            matched,
            level,
            requires_manual_review,
            threshold,
        })
    }
}

/// How the reported confidence percentage is derived.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfidenceScorer {
    /// Similarity expressed as a percentage.
    Similarity,
    /// Uniformly random within a range depending on the verdict. Testing aid only.
    Random {
        matched: (f64, f64),
        unmatched: (f64, f64),
    },
}

impl ConfidenceScorer {
    /// Confidence percentage, rounded to 2 decimal places.
    pub fn score(&self, similarity: f32, matched: bool) -> f64 {
        match self {
            ConfidenceScorer::Similarity => round_to(similarity as f64 * 100.0, 2),
            ConfidenceScorer::Random { matched: m, unmatched: u } => {
                let (lo, hi) = if matched { *m } else { *u };
                if hi <= lo {
                    return round_to(lo, 2);
                }
                round_to(rand::thread_rng().gen_range(lo..hi), 2)
            }
        }
    }
}

/// Round half away from zero to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
