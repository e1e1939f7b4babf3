use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Lineage;
use crate::ids::{EntityId, SessionId, SnapshotId};
use crate::value_objects::{ActionDescriptor, DifficultyClass, RuleSystem, StateDelta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The outcome of a player action
    Turn,
    /// Content spawned by the director in the same logical turn
    DirectorSpawn,
    /// A rewind marker; replay resets to the referenced snapshot here
    Fork,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Turn => f.write_str("turn"),
            Self::DirectorSpawn => f.write_str("director_spawn"),
            Self::Fork => f.write_str("fork"),
        }
    }
}

/// Where a fork returned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkMarker {
    pub snapshot_id: SnapshotId,
    /// Event ledger offset recorded on the snapshot
    pub event_offset: u64,
    pub turn: u32,
    /// How many rewinds this session has been through, this one included
    pub loop_count: u32,
    /// Lineage as it stood when the snapshot was taken
    #[serde(default)]
    pub timeline: Lineage,
}

/// An event before the ledger has assigned it a sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEvent {
    pub turn: u32,
    pub actor: EntityId,
    pub kind: EventKind,
    pub action: Option<ActionDescriptor>,
    pub delta: StateDelta,
    pub status: EventStatus,
    /// Seed the rule calculator drew its dice from
    pub rng_seed: Option<u64>,
    /// Difficulty a freeform attempt was rolled against
    #[serde(default)]
    pub difficulty: Option<DifficultyClass>,
    pub rejection_reason: Option<String>,
    pub description: String,
    pub fork: Option<ForkMarker>,
    /// Director trigger that produced a spawn
    pub trigger: Option<String>,
}

impl PendingEvent {
    pub fn accepted(
        turn: u32,
        actor: EntityId,
        action: ActionDescriptor,
        delta: StateDelta,
        rng_seed: u64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            turn,
            actor,
            kind: EventKind::Turn,
            action: Some(action),
            delta,
            status: EventStatus::Accepted,
            rng_seed: Some(rng_seed),
            difficulty: None,
            rejection_reason: None,
            description: description.into(),
            fork: None,
            trigger: None,
        }
    }

    /// A refused action. The delta is always empty.
    pub fn rejected(
        turn: u32,
        actor: EntityId,
        action: ActionDescriptor,
        reason: impl Into<String>,
        rng_seed: Option<u64>,
    ) -> Self {
        let reason = reason.into();
        Self {
            turn,
            actor,
            kind: EventKind::Turn,
            action: Some(action),
            delta: StateDelta::new(),
            status: EventStatus::Rejected,
            rng_seed,
            difficulty: None,
            description: reason.clone(),
            rejection_reason: Some(reason),
            fork: None,
            trigger: None,
        }
    }

    pub fn director_spawn(
        turn: u32,
        actor: EntityId,
        trigger: impl Into<String>,
        delta: StateDelta,
        description: impl Into<String>,
    ) -> Self {
        Self {
            turn,
            actor,
            kind: EventKind::DirectorSpawn,
            action: None,
            delta,
            status: EventStatus::Accepted,
            rng_seed: None,
            difficulty: None,
            rejection_reason: None,
            description: description.into(),
            fork: None,
            trigger: Some(trigger.into()),
        }
    }

    pub fn fork(actor: EntityId, marker: ForkMarker) -> Self {
        Self {
            turn: marker.turn,
            actor,
            kind: EventKind::Fork,
            action: None,
            delta: StateDelta::new(),
            status: EventStatus::Accepted,
            rng_seed: None,
            difficulty: None,
            rejection_reason: None,
            description: format!(
                "Rewound to turn {} (loop {})",
                marker.turn, marker.loop_count
            ),
            fork: Some(marker),
            trigger: None,
        }
    }

    pub fn with_difficulty(mut self, difficulty: Option<DifficultyClass>) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn into_entry(
        self,
        session_id: SessionId,
        sequence: u64,
        timestamp: DateTime<Utc>,
    ) -> EventLedgerEntry {
        EventLedgerEntry {
            sequence,
            session_id,
            timestamp,
            turn: self.turn,
            actor: self.actor,
            kind: self.kind,
            action: self.action,
            delta: self.delta,
            status: self.status,
            rng_seed: self.rng_seed,
            difficulty: self.difficulty,
            rejection_reason: self.rejection_reason,
            description: self.description,
            fork: self.fork,
            trigger: self.trigger,
        }
    }
}

/// An immutable entry in the event ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLedgerEntry {
    /// Monotonic and gap-free, starting at 1
    pub sequence: u64,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub turn: u32,
    pub actor: EntityId,
    pub kind: EventKind,
    pub action: Option<ActionDescriptor>,
    pub delta: StateDelta,
    pub status: EventStatus,
    pub rng_seed: Option<u64>,
    #[serde(default)]
    pub difficulty: Option<DifficultyClass>,
    pub rejection_reason: Option<String>,
    pub description: String,
    pub fork: Option<ForkMarker>,
    pub trigger: Option<String>,
}

impl EventLedgerEntry {
    pub fn is_accepted(&self) -> bool {
        self.status == EventStatus::Accepted
    }

    pub fn is_combat(&self) -> bool {
        self.kind == EventKind::Turn
            && self
                .action
                .as_ref()
                .is_some_and(|a| a.rule_system() == RuleSystem::Combat)
    }
}
