use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::SessionId;

/// Hash the first canon entry chains from: 64 hex zeros.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonKind {
    Death,
    QuestResolved,
    Fork,
    Milestone,
}

impl fmt::Display for CanonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Death => f.write_str("death"),
            Self::QuestResolved => f.write_str("quest_resolved"),
            Self::Fork => f.write_str("fork"),
            Self::Milestone => f.write_str("milestone"),
        }
    }
}

/// A milestone waiting to be chained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonRecord {
    pub kind: CanonKind,
    pub turn: u32,
    /// JSON body describing the milestone
    pub content: String,
}

impl CanonRecord {
    pub fn new(kind: CanonKind, turn: u32, content: impl Into<String>) -> Self {
        Self {
            kind,
            turn,
            content: content.into(),
        }
    }

    /// The exact bytes the content digest is taken over. Kind and turn are
    /// included so neither can be edited without breaking the chain.
    pub fn digest_input(&self) -> String {
        canonical_input(self.kind, self.turn, &self.content)
    }
}

fn canonical_input(kind: CanonKind, turn: u32, content: &str) -> String {
    format!("{}|{}|{}", kind, turn, content)
}

/// An immutable link in the canon chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonLedgerEntry {
    pub sequence: u64,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub kind: CanonKind,
    pub turn: u32,
    pub content: String,
    /// Hex digest of [`CanonLedgerEntry::digest_input`]
    pub content_digest: String,
    pub prev_hash: String,
    /// Hex `H(prev_hash || content_digest)`
    pub hash: String,
}

impl CanonLedgerEntry {
    pub fn from_record(
        record: CanonRecord,
        session_id: SessionId,
        sequence: u64,
        timestamp: DateTime<Utc>,
        content_digest: String,
        prev_hash: String,
        hash: String,
    ) -> Self {
        Self {
            sequence,
            session_id,
            timestamp,
            kind: record.kind,
            turn: record.turn,
            content: record.content,
            content_digest,
            prev_hash,
            hash,
        }
    }

    pub fn digest_input(&self) -> String {
        canonical_input(self.kind, self.turn, &self.content)
    }
}
