use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::aggregates::WorldState;
use crate::ids::{SessionId, SnapshotId};

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    Genesis,
    LongRest,
    RegionChange,
    Interval,
    Manual,
}

impl SnapshotReason {
    /// Automatic snapshots are taken at most once per turn.
    pub fn is_automatic(&self) -> bool {
        !matches!(self, Self::Manual)
    }
}

impl fmt::Display for SnapshotReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Genesis => f.write_str("genesis"),
            Self::LongRest => f.write_str("long rest"),
            Self::RegionChange => f.write_str("region change"),
            Self::Interval => f.write_str("interval"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

/// A self-contained, immutable copy of world state and the ledger offsets it
/// corresponds to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub session_id: SessionId,
    pub turn: u32,
    pub reason: SnapshotReason,
    /// Sequence of the last event included in `state` (0 before any event)
    pub event_offset: u64,
    /// Sequence of the last canon entry at capture time
    pub canon_offset: u64,
    pub created_at: DateTime<Utc>,
    pub state: WorldState,
}

impl Snapshot {
    pub fn capture(
        session_id: SessionId,
        reason: SnapshotReason,
        state: &WorldState,
        event_offset: u64,
        canon_offset: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SnapshotId::new(),
            session_id,
            turn: state.turn(),
            reason,
            event_offset,
            canon_offset,
            created_at,
            state: state.clone(),
        }
    }

    /// Short human label, e.g. "turn 20 (interval)".
    pub fn label(&self) -> String {
        format!("turn {} ({})", self.turn, self.reason)
    }
}
