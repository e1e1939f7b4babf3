//! Status conditions that gate what an entity can do

use serde::{Deserialize, Serialize};
use std::fmt;

/// A status condition. Unknown names survive as `Custom` so content authors
/// can add their own without a code change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Condition {
    Unconscious,
    Paralyzed,
    Stunned,
    Incapacitated,
    Frightened,
    Poisoned,
    Prone,
    Hidden,
    Dodging,
    Custom(String),
}

impl Condition {
    /// Conditions under which no action can be taken at all.
    pub fn is_incapacitating(&self) -> bool {
        matches!(
            self,
            Self::Unconscious | Self::Paralyzed | Self::Stunned | Self::Incapacitated
        )
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Unconscious => "unconscious",
            Self::Paralyzed => "paralyzed",
            Self::Stunned => "stunned",
            Self::Incapacitated => "incapacitated",
            Self::Frightened => "frightened",
            Self::Poisoned => "poisoned",
            Self::Prone => "prone",
            Self::Hidden => "hidden",
            Self::Dodging => "dodging",
            Self::Custom(name) => name,
        }
    }
}

impl From<Condition> for String {
    fn from(condition: Condition) -> Self {
        condition.name().to_string()
    }
}

impl From<String> for Condition {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "unconscious" => Self::Unconscious,
            "paralyzed" => Self::Paralyzed,
            "stunned" => Self::Stunned,
            "incapacitated" => Self::Incapacitated,
            "frightened" => Self::Frightened,
            "poisoned" => Self::Poisoned,
            "prone" => Self::Prone,
            "hidden" => Self::Hidden,
            "dodging" => Self::Dodging,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for Condition {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
