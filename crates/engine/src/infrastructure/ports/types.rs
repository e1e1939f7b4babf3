//! Records exchanged with the durable store that are not domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chronicle_domain::{SessionId, Snapshot, SnapshotId, SnapshotReason};

/// A save slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// The last canon entry known to verify, so a reload can skip re-hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCheckpoint {
    pub sequence: u64,
    pub hash: String,
    pub verified_at: DateTime<Utc>,
}

/// Snapshot metadata without the state blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: SnapshotId,
    pub turn: u32,
    pub reason: SnapshotReason,
    pub event_offset: u64,
    pub canon_offset: u64,
    pub created_at: DateTime<Utc>,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            id: snapshot.id,
            turn: snapshot.turn,
            reason: snapshot.reason,
            event_offset: snapshot.event_offset,
            canon_offset: snapshot.canon_offset,
            created_at: snapshot.created_at,
        }
    }
}

/// A ranked piece of retrieved lore or history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnippet {
    pub source: String,
    pub text: String,
    pub score: f32,
}
