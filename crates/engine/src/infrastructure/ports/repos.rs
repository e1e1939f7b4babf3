//! Repository port traits for the ledger store.
//!
//! Every append is a single-record atomic write keyed by
//! `(session_id, sequence)`; a second write at the same key must fail with
//! [`RepoError::ConstraintViolation`].

use async_trait::async_trait;

use chronicle_domain::{CanonLedgerEntry, EventLedgerEntry, SessionId, Snapshot, SnapshotId};

use super::error::RepoError;
use super::types::{ChainCheckpoint, SessionRecord, SnapshotSummary};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn create(&self, session: &SessionRecord) -> Result<(), RepoError>;
    async fn get(&self, id: SessionId) -> Result<Option<SessionRecord>, RepoError>;
    async fn list(&self) -> Result<Vec<SessionRecord>, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventRepo: Send + Sync {
    async fn append(&self, entry: &EventLedgerEntry) -> Result<(), RepoError>;
    /// Highest stored sequence, 0 when empty.
    async fn head(&self, session_id: SessionId) -> Result<u64, RepoError>;
    /// Entries with `from <= sequence <= to`, ascending.
    async fn range(
        &self,
        session_id: SessionId,
        from: u64,
        to: u64,
    ) -> Result<Vec<EventLedgerEntry>, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CanonRepo: Send + Sync {
    async fn append(&self, entry: &CanonLedgerEntry) -> Result<(), RepoError>;
    async fn head(&self, session_id: SessionId) -> Result<Option<CanonLedgerEntry>, RepoError>;
    /// Entries with `from <= sequence <= to`, ascending.
    async fn range(
        &self,
        session_id: SessionId,
        from: u64,
        to: u64,
    ) -> Result<Vec<CanonLedgerEntry>, RepoError>;
    async fn save_checkpoint(
        &self,
        session_id: SessionId,
        checkpoint: &ChainCheckpoint,
    ) -> Result<(), RepoError>;
    async fn load_checkpoint(
        &self,
        session_id: SessionId,
    ) -> Result<Option<ChainCheckpoint>, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotRepo: Send + Sync {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), RepoError>;
    async fn get(
        &self,
        session_id: SessionId,
        id: SnapshotId,
    ) -> Result<Option<Snapshot>, RepoError>;
    /// Oldest first.
    async fn list(&self, session_id: SessionId) -> Result<Vec<SnapshotSummary>, RepoError>;
}
