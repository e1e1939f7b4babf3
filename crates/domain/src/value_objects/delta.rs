//! State deltas - the only currency in which world state changes

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ResourceKind;
use crate::entities::{Condition, Entity};
use crate::ids::{EntityId, LocationId};

/// One atomic change to world state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StateChange {
    AdjustResource {
        entity: EntityId,
        resource: ResourceKind,
        amount: i64,
    },
    SetResource {
        entity: EntityId,
        resource: ResourceKind,
        value: i64,
    },
    AddCondition {
        entity: EntityId,
        condition: Condition,
    },
    RemoveCondition {
        entity: EntityId,
        condition: Condition,
    },
    AddItem {
        entity: EntityId,
        item: String,
        quantity: u32,
    },
    RemoveItem {
        entity: EntityId,
        item: String,
        quantity: u32,
    },
    Equip {
        entity: EntityId,
        item: String,
    },
    Unequip {
        entity: EntityId,
        item: String,
    },
    MoveEntity {
        entity: EntityId,
        to: LocationId,
    },
    SetFlag {
        key: String,
        value: String,
    },
    SpawnEntity {
        entity: Box<Entity>,
    },
    SetAlive {
        entity: EntityId,
        alive: bool,
    },
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdjustResource {
                entity,
                resource,
                amount,
            } => write!(f, "{} {} {:+}", entity, resource, amount),
            Self::SetResource {
                entity,
                resource,
                value,
            } => write!(f, "{} {} = {}", entity, resource, value),
            Self::AddCondition { entity, condition } => write!(f, "{} is {}", entity, condition),
            Self::RemoveCondition { entity, condition } => {
                write!(f, "{} is no longer {}", entity, condition)
            }
            Self::AddItem {
                entity,
                item,
                quantity,
            } => write!(f, "{} gains {} x{}", entity, item, quantity),
            Self::RemoveItem {
                entity,
                item,
                quantity,
            } => write!(f, "{} loses {} x{}", entity, item, quantity),
            Self::Equip { entity, item } => write!(f, "{} equips {}", entity, item),
            Self::Unequip { entity, item } => write!(f, "{} unequips {}", entity, item),
            Self::MoveEntity { entity, to } => write!(f, "{} moves to {}", entity, to),
            Self::SetFlag { key, value } => write!(f, "flag {} = {}", key, value),
            Self::SpawnEntity { entity } => write!(f, "{} appears", entity.name),
            Self::SetAlive { entity, alive } => {
                if *alive {
                    write!(f, "{} lives", entity)
                } else {
                    write!(f, "{} dies", entity)
                }
            }
        }
    }
}

/// An ordered list of changes applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDelta {
    changes: Vec<StateChange>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: StateChange) {
        self.changes.push(change);
    }

    pub fn with(mut self, change: StateChange) -> Self {
        self.changes.push(change);
        self
    }

    pub fn extend(&mut self, other: StateDelta) {
        self.changes.extend(other.changes);
    }

    pub fn changes(&self) -> &[StateChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StateChange> {
        self.changes.iter()
    }
}

impl From<Vec<StateChange>> for StateDelta {
    fn from(changes: Vec<StateChange>) -> Self {
        Self { changes }
    }
}

impl FromIterator<StateChange> for StateDelta {
    fn from_iter<T: IntoIterator<Item = StateChange>>(iter: T) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}

/// A resource change that hit a bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClampNote {
    pub entity: EntityId,
    pub resource: ResourceKind,
    pub requested: i64,
    pub applied: i64,
}

impl fmt::Display for ClampNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} change clamped from {:+} to {:+}",
            self.entity, self.resource, self.requested, self.applied
        )
    }
}

/// What actually happened when a delta was applied: the post-clamp changes
/// (replaying them reproduces the same state), the clamps, and any deaths
/// the changes caused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDelta {
    pub delta: StateDelta,
    pub clamps: Vec<ClampNote>,
    pub deaths: Vec<EntityId>,
}

impl AppliedDelta {
    /// Flags set to a terminal quest value (`quest:*` = completed | failed).
    pub fn resolved_quests(&self) -> impl Iterator<Item = (&str, &str)> {
        self.delta.iter().filter_map(|change| match change {
            StateChange::SetFlag { key, value }
                if key.starts_with("quest:") && (value == "completed" || value == "failed") =>
            {
                Some((key.as_str(), value.as_str()))
            }
            _ => None,
        })
    }
}
