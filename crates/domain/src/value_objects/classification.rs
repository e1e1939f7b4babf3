//! Output of the input classification cascade

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ActionDescriptor, ActionType, DifficultyClass};

/// Which stage of the cascade produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Pattern,
    Fallback,
    Plausibility,
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern => f.write_str("pattern"),
            Self::Fallback => f.write_str("fallback"),
            Self::Plausibility => f.write_str("plausibility"),
        }
    }
}

/// A resolved player input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub action: ActionDescriptor,
    /// Always within `[0, 1]`
    pub confidence: f32,
    pub source: ClassificationSource,
    /// Set when the result was escalated to the plausibility stage
    pub difficulty: Option<DifficultyClass>,
    /// Raw plausibility score (0-100) behind `difficulty`
    pub plausibility: Option<u8>,
    /// True when an external call timed out or failed and a fallback value
    /// stands in for its answer
    #[serde(default)]
    pub degraded: bool,
}

impl ClassificationResult {
    /// A pattern match is certain.
    pub fn from_pattern(action: ActionDescriptor) -> Self {
        Self {
            action,
            confidence: 1.0,
            source: ClassificationSource::Pattern,
            difficulty: None,
            plausibility: None,
            degraded: false,
        }
    }

    pub fn from_fallback(action: ActionDescriptor, confidence: f32) -> Self {
        Self {
            action,
            confidence: clamp_confidence(confidence),
            source: ClassificationSource::Fallback,
            difficulty: None,
            plausibility: None,
            degraded: false,
        }
    }

    /// Low-confidence input turned into a creative attempt at a difficulty
    /// derived from its plausibility score.
    pub fn escalated(action: ActionDescriptor, confidence: f32, plausibility: u8) -> Self {
        Self {
            action,
            confidence: clamp_confidence(confidence),
            source: ClassificationSource::Plausibility,
            difficulty: Some(DifficultyClass::from_plausibility(plausibility)),
            plausibility: Some(plausibility.min(100)),
            degraded: false,
        }
    }

    /// The generic attempt used when the cascade ran out of time or the
    /// external services failed.
    pub fn degraded_attempt(raw_input: &str, plausibility: u8) -> Self {
        Self {
            action: ActionDescriptor::new(ActionType::Attempt, raw_input),
            confidence: 0.0,
            source: ClassificationSource::Plausibility,
            difficulty: Some(DifficultyClass::from_plausibility(plausibility)),
            plausibility: Some(plausibility.min(100)),
            degraded: true,
        }
    }

    pub fn mark_degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    pub fn is_escalated(&self) -> bool {
        self.difficulty.is_some()
    }
}

/// Clamp an externally supplied confidence into `[0, 1]`. NaN counts as no
/// confidence at all.
pub fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(clamp_confidence(f32::NAN), 0.0);
        assert_eq!(clamp_confidence(-3.0), 0.0);
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(0.25), 0.25);
    }

    #[test]
    fn escalation_attaches_a_difficulty() {
        let action = ActionDescriptor::new(ActionType::Attempt, "asdlkfj");
        let result = ClassificationResult::escalated(action, 0.1, 5);
        assert_eq!(result.source, ClassificationSource::Plausibility);
        assert!(result.difficulty.expect("difficulty") > DifficultyClass::STANDARD);
        assert!(!result.degraded);
    }

    #[test]
    fn degraded_attempt_has_lowest_confidence() {
        let result = ClassificationResult::degraded_attempt("dance with the moon", 50);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.action.action, ActionType::Attempt);
        assert!(result.degraded);
    }
}
