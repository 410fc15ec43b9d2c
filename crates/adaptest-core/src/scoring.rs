//! Reported score scales.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a final theta is mapped onto the reported scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreScale {
    /// `clamp(base/2 + θ·multiplier, 0, base)`.
    #[default]
    Linear,
    /// Unbounded IQ-style scale `base + θ·multiplier`.
    Iq,
}

impl fmt::Display for ScoreScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreScale::Linear => write!(f, "linear"),
            ScoreScale::Iq => write!(f, "iq"),
        }
    }
}

impl FromStr for ScoreScale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(ScoreScale::Linear),
            "iq" => Ok(ScoreScale::Iq),
            other => Err(format!("unknown score scale: {other}")),
        }
    }
}

/// Maps a final theta estimate to a reported score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scorer {
    pub base_score: f64,
    pub theta_multiplier: f64,
    pub scale: ScoreScale,
}

impl Default for Scorer {
    fn default() -> Self {
        Self {
            base_score: 100.0,
            theta_multiplier: 15.0,
            scale: ScoreScale::Linear,
        }
    }
}

impl Scorer {
    pub fn new(base_score: f64, theta_multiplier: f64, scale: ScoreScale) -> Self {
        Self {
            base_score,
            theta_multiplier,
            scale,
        }
    }

    /// Score a theta. Total: never fails, never returns NaN for finite input.
    pub fn score(&self, theta: f64) -> f64 {
        match self.scale {
            ScoreScale::Linear => (self.base_score / 2.0 + theta * self.theta_multiplier)
                .clamp(0.0, self.base_score),
            ScoreScale::Iq => self.base_score + theta * self.theta_multiplier,
        }
    }
}
