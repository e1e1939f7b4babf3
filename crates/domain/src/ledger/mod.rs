//! Ledger records
//!
//! Three kinds of durable record back a session: the append-only event
//! ledger (one entry per turn outcome), the hash-chained canon ledger
//! (milestones and forks), and snapshots (rewind targets). None of them is
//! ever edited after it is written.

mod canon;
mod event;
mod lineage;
mod snapshot;

pub use canon::{CanonKind, CanonLedgerEntry, CanonRecord, GENESIS_HASH};
pub use event::{EventKind, EventLedgerEntry, EventStatus, ForkMarker, PendingEvent};
pub use lineage::Lineage;
pub use snapshot::{Snapshot, SnapshotReason};
