//! In-memory ledger store for tests and throwaway sessions.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use chronicle_domain::{CanonLedgerEntry, EventLedgerEntry, SessionId, Snapshot, SnapshotId};

use crate::infrastructure::ports::{
    CanonRepo, ChainCheckpoint, EventRepo, RepoError, SessionRecord, SessionRepo, SnapshotRepo,
    SnapshotSummary,
};

/// Same contract as the SQLite store, including duplicate-sequence rejection.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    sessions: DashMap<SessionId, SessionRecord>,
    events: DashMap<SessionId, BTreeMap<u64, EventLedgerEntry>>,
    canon: DashMap<SessionId, BTreeMap<u64, CanonLedgerEntry>>,
    snapshots: DashMap<SessionId, Vec<Snapshot>>,
    checkpoints: DashMap<SessionId, ChainCheckpoint>,
    /// Store calls that will fail with a database error before they succeed again
    failing_writes: AtomicU32,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` ledger appends or session listings fail with a
    /// transient error.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    fn injected_failure(&self, operation: &'static str) -> Result<(), RepoError> {
        let remaining = self.failing_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_writes.store(remaining - 1, Ordering::SeqCst);
            return Err(RepoError::database(operation, "injected failure"));
        }
        Ok(())
    }

    /// Overwrite a stored canon entry, bypassing the chain. For tamper tests.
    pub fn tamper_canon(&self, session_id: SessionId, sequence: u64, content: &str) -> bool {
        self.canon
            .get_mut(&session_id)
            .and_then(|mut entries| {
                entries
                    .get_mut(&sequence)
                    .map(|entry| entry.content = content.to_string())
            })
            .is_some()
    }
}

#[async_trait]
impl SessionRepo for InMemoryLedgerStore {
    async fn create(&self, session: &SessionRecord) -> Result<(), RepoError> {
        if self.sessions.contains_key(&session.id) {
            return Err(RepoError::constraint(format!("session {} exists", session.id)));
        }
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get(&self, id: SessionId) -> Result<Option<SessionRecord>, RepoError> {
        Ok(self.sessions.get(&id).map(|s| s.clone()))
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, RepoError> {
        self.injected_failure("list_sessions")?;
        let mut sessions: Vec<SessionRecord> =
            self.sessions.iter().map(|s| s.value().clone()).collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }
}

#[async_trait]
impl EventRepo for InMemoryLedgerStore {
    async fn append(&self, entry: &EventLedgerEntry) -> Result<(), RepoError> {
        self.injected_failure("append_event")?;
        let mut events = self.events.entry(entry.session_id).or_default();
        if events.contains_key(&entry.sequence) {
            return Err(RepoError::constraint(format!(
                "event sequence {} already stored",
                entry.sequence
            )));
        }
        events.insert(entry.sequence, entry.clone());
        Ok(())
    }

    async fn head(&self, session_id: SessionId) -> Result<u64, RepoError> {
        Ok(self
            .events
            .get(&session_id)
            .and_then(|events| events.keys().next_back().copied())
            .unwrap_or(0))
    }

    async fn range(
        &self,
        session_id: SessionId,
        from: u64,
        to: u64,
    ) -> Result<Vec<EventLedgerEntry>, RepoError> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self
            .events
            .get(&session_id)
            .map(|events| events.range(from..=to).map(|(_, e)| e.clone()).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl CanonRepo for InMemoryLedgerStore {
    async fn append(&self, entry: &CanonLedgerEntry) -> Result<(), RepoError> {
        self.injected_failure("append_canon")?;
        let mut entries = self.canon.entry(entry.session_id).or_default();
        if entries.contains_key(&entry.sequence) {
            return Err(RepoError::constraint(format!(
                "canon sequence {} already stored",
                entry.sequence
            )));
        }
        entries.insert(entry.sequence, entry.clone());
        Ok(())
    }

    async fn head(&self, session_id: SessionId) -> Result<Option<CanonLedgerEntry>, RepoError> {
        Ok(self
            .canon
            .get(&session_id)
            .and_then(|entries| entries.values().next_back().cloned()))
    }

    async fn range(
        &self,
        session_id: SessionId,
        from: u64,
        to: u64,
    ) -> Result<Vec<CanonLedgerEntry>, RepoError> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self
            .canon
            .get(&session_id)
            .map(|entries| entries.range(from..=to).map(|(_, e)| e.clone()).collect())
            .unwrap_or_default())
    }

    async fn save_checkpoint(
        &self,
        session_id: SessionId,
        checkpoint: &ChainCheckpoint,
    ) -> Result<(), RepoError> {
        self.checkpoints.insert(session_id, checkpoint.clone());
        Ok(())
    }

    async fn load_checkpoint(
        &self,
        session_id: SessionId,
    ) -> Result<Option<ChainCheckpoint>, RepoError> {
        Ok(self.checkpoints.get(&session_id).map(|c| c.clone()))
    }
}

#[async_trait]
impl SnapshotRepo for InMemoryLedgerStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), RepoError> {
        self.injected_failure("save_snapshot")?;
        self.snapshots
            .entry(snapshot.session_id)
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    async fn get(
        &self,
        session_id: SessionId,
        id: SnapshotId,
    ) -> Result<Option<Snapshot>, RepoError> {
        Ok(self
            .snapshots
            .get(&session_id)
            .and_then(|snapshots| snapshots.iter().find(|s| s.id == id).cloned()))
    }

    async fn list(&self, session_id: SessionId) -> Result<Vec<SnapshotSummary>, RepoError> {
        Ok(self
            .snapshots
            .get(&session_id)
            .map(|snapshots| snapshots.iter().map(SnapshotSummary::from).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use chronicle_domain::{ActionDescriptor, ActionType, EntityId, PendingEvent};

    fn event(session_id: SessionId, sequence: u64) -> EventLedgerEntry {
        PendingEvent::rejected(
            1,
            EntityId::new("hero"),
            ActionDescriptor::new(ActionType::Attack, "attack ghost"),
            "no such target",
            None,
        )
        .into_entry(session_id, sequence, Utc::now())
    }

    #[tokio::test]
    async fn rejects_duplicate_sequences() {
        let store = InMemoryLedgerStore::new();
        let session = SessionId::new();
        EventRepo::append(&store, &event(session, 1)).await.expect("append");
        let err = EventRepo::append(&store, &event(session, 1)).await.expect_err("dup");
        assert!(matches!(err, RepoError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn injected_failures_are_transient_and_run_out() {
        let store = InMemoryLedgerStore::new();
        let session = SessionId::new();
        store.fail_next_writes(2);

        for _ in 0..2 {
            let err = EventRepo::append(&store, &event(session, 1)).await.expect_err("fail");
            assert!(err.is_transient());
        }
        EventRepo::append(&store, &event(session, 1)).await.expect("append");
        assert_eq!(EventRepo::head(&store, session).await.expect("head"), 1);
    }

    #[tokio::test]
    async fn sessions_do_not_share_ledgers() {
        let store = InMemoryLedgerStore::new();
        let (a, b) = (SessionId::new(), SessionId::new());
        EventRepo::append(&store, &event(a, 1)).await.expect("append");
        EventRepo::append(&store, &event(b, 1)).await.expect("append");
        EventRepo::append(&store, &event(b, 2)).await.expect("append");
        assert_eq!(EventRepo::head(&store, a).await.expect("head"), 1);
        assert_eq!(EventRepo::range(&store, b, 1, 10).await.expect("range").len(), 2);
    }
}
