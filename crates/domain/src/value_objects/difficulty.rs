//! Difficulty classes for checks, including the plausibility transform used
//! when freeform input cannot be classified with confidence.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A d20 difficulty class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DifficultyClass(u8);

impl DifficultyClass {
    /// Easiest class the plausibility transform produces.
    pub const TRIVIAL: Self = Self(5);
    /// Class for an ordinary check.
    pub const STANDARD: Self = Self(12);
    /// Hardest class the plausibility transform produces.
    pub const NEAR_IMPOSSIBLE: Self = Self(40);

    pub fn new(value: u8) -> Self {
        Self(value)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Map a plausibility score (0-100) onto a difficulty class.
    ///
    /// Logarithmic in the plausibility fraction: `DC = 5 - 8.33 * ln(p)` with
    /// `p` floored at 0.001, clamped to `[5, 40]`. Score 100 is trivial, score 0
    /// is near impossible, and the mapping never increases as the score rises.
    pub fn from_plausibility(score: u8) -> Self {
        let p = (f64::from(score.min(100)) / 100.0).max(0.001);
        let dc = (5.0 - 8.33 * p.ln()).round();
        let clamped = dc.clamp(
            f64::from(Self::TRIVIAL.0),
            f64::from(Self::NEAR_IMPOSSIBLE.0),
        );
        Self(clamped as u8)
    }
}

impl fmt::Display for DifficultyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DC {}", self.0)
    }
}
