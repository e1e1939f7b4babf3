//! Bounded numeric resources (HP, gold, spell slots).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which resource pool a value belongs to.
///
/// Serialized as a plain string so it can key a JSON map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ResourceKind {
    Hp,
    Gold,
    SpellSlots,
    Custom(String),
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Hp => "hp".to_string(),
            ResourceKind::Gold => "gold".to_string(),
            ResourceKind::SpellSlots => "spell_slots".to_string(),
            ResourceKind::Custom(name) => name,
        }
    }
}

impl From<String> for ResourceKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "hp" => Self::Hp,
            "gold" => Self::Gold,
            "spell_slots" => Self::SpellSlots,
            _ => Self::Custom(value),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hp => f.write_str("HP"),
            Self::Gold => f.write_str("gold"),
            Self::SpellSlots => f.write_str("spell slots"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// A value that can never leave `[min, max]`.
///
/// Fields are private so the only way to change `current` is through the
/// clamping setters. Deserialization goes through the same clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawBoundedResource")]
pub struct BoundedResource {
    current: i64,
    min: i64,
    max: i64,
}

#[derive(Deserialize)]
struct RawBoundedResource {
    current: i64,
    min: i64,
    max: i64,
}

impl From<RawBoundedResource> for BoundedResource {
    fn from(raw: RawBoundedResource) -> Self {
        Self::new(raw.current, raw.min, raw.max)
    }
}

impl BoundedResource {
    /// Create a resource, clamping `current` into range. `max < min` collapses
    /// the range onto `min`.
    pub fn new(current: i64, min: i64, max: i64) -> Self {
        let max = max.max(min);
        Self {
            current: current.clamp(min, max),
            min,
            max,
        }
    }

    /// A full pool in `[0, max]`.
    pub fn full(max: i64) -> Self {
        Self::new(max, 0, max)
    }

    pub fn current(&self) -> i64 {
        self.current
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn is_depleted(&self) -> bool {
        self.current <= self.min
    }

    /// Set to `value`, clamped. Returns the value actually stored.
    pub fn set(&mut self, value: i64) -> i64 {
        self.current = value.clamp(self.min, self.max);
        self.current
    }

    /// Add `amount` (negative to spend), clamped. Returns the change actually
    /// applied, which differs from `amount` when the bound was hit.
    pub fn adjust(&mut self, amount: i64) -> i64 {
        let before = self.current;
        self.set(before.saturating_add(amount));
        self.current - before
    }

    pub fn restore_full(&mut self) -> i64 {
        let before = self.current;
        self.current = self.max;
        self.current - before
    }
}

impl fmt::Display for BoundedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.current, self.max)
    }
}
