//! Ledger & snapshot engine.
//!
//! One [`LedgerEngine`] per open session. It owns the write cursor for the
//! event ledger and the canon chain, the session's lineage, and the snapshot
//! bookkeeping. Both ledgers are append-only: a rewind adds fork markers and
//! moves the lineage, it never deletes anything.

use std::collections::HashMap;
use std::sync::Arc;

use chronicle_domain::{
    CanonKind, CanonLedgerEntry, CanonRecord, EntityId, EventKind, EventLedgerEntry, EventStatus,
    ForkMarker, Lineage, PendingEvent, SessionId, Snapshot, SnapshotId, SnapshotReason,
    WorldState, GENESIS_HASH,
};

use crate::infrastructure::config::{ChainVerification, EngineConfig};
use crate::infrastructure::ports::{
    CanonRepo, ChainCheckpoint, ClockPort, EventRepo, RepoError, SessionRecord, SessionRepo,
    SnapshotRepo, SnapshotSummary,
};

use super::canon_chain;
use super::retry::StorageRetry;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The store kept failing; the session cannot continue safely
    #[error("Storage failure in {operation} after {attempts} attempt(s): {source}")]
    Storage {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: RepoError,
    },

    /// The stored canon head is not the head this engine last wrote
    #[error("Canon chain head mismatch: expected {expected}, store has {found}")]
    ChainIntegrity { expected: String, found: String },

    #[error("{ledger} ledger corrupt at sequence {sequence}: {reason}")]
    Corruption {
        ledger: &'static str,
        sequence: u64,
        reason: String,
    },

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(SnapshotId),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),
}

impl LedgerError {
    /// Errors after which the session must stop taking turns.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::ChainIntegrity { .. } | Self::Corruption { .. }
        )
    }

    fn corruption(ledger: &'static str, sequence: u64, reason: impl Into<String>) -> Self {
        Self::Corruption {
            ledger,
            sequence,
            reason: reason.into(),
        }
    }
}

/// The four store ports, usually all backed by one adapter.
#[derive(Clone)]
pub struct LedgerStores {
    pub sessions: Arc<dyn SessionRepo>,
    pub events: Arc<dyn EventRepo>,
    pub canon: Arc<dyn CanonRepo>,
    pub snapshots: Arc<dyn SnapshotRepo>,
}

impl LedgerStores {
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: SessionRepo + EventRepo + CanonRepo + SnapshotRepo + 'static,
    {
        Self {
            sessions: store.clone(),
            events: store.clone(),
            canon: store.clone(),
            snapshots: store,
        }
    }
}

/// Per-session ledger cursor.
pub struct LedgerEngine {
    session_id: SessionId,
    stores: LedgerStores,
    clock: Arc<dyn ClockPort>,
    retry: StorageRetry,
    verification: ChainVerification,
    event_head: u64,
    canon_head: (u64, String),
    verified: Option<ChainCheckpoint>,
    lineage: Lineage,
    genesis: SnapshotId,
    loop_count: u32,
    /// Last automatic snapshot, for per-turn idempotence
    last_automatic: Option<Snapshot>,
}

impl LedgerEngine {
    /// Start a new session: record it and write the genesis snapshot.
    pub async fn create(
        stores: LedgerStores,
        clock: Arc<dyn ClockPort>,
        config: &EngineConfig,
        title: &str,
        world: &WorldState,
    ) -> Result<(Self, Snapshot), LedgerError> {
        let retry = StorageRetry::new(&config.storage_retry);
        let now = clock.now();
        let record = SessionRecord {
            id: SessionId::new(),
            title: title.to_string(),
            created_at: now,
        };
        retry
            .run("create_session", || stores.sessions.create(&record))
            .await?;

        let genesis = Snapshot::capture(record.id, SnapshotReason::Genesis, world, 0, 0, now);
        retry
            .run("save_snapshot", || stores.snapshots.save(&genesis))
            .await?;

        tracing::info!(session_id = %record.id, title, "Session created");

        let engine = Self {
            session_id: record.id,
            stores,
            clock,
            retry,
            verification: config.chain_verification,
            event_head: 0,
            canon_head: (0, GENESIS_HASH.to_string()),
            verified: None,
            lineage: Lineage::new(),
            genesis: genesis.id,
            loop_count: 0,
            last_automatic: Some(genesis.clone()),
        };
        Ok((engine, genesis))
    }

    /// Reopen a stored session: verify the canon chain, check the event
    /// ledger for gaps, rebuild the lineage and replay to the head.
    pub async fn open(
        stores: LedgerStores,
        clock: Arc<dyn ClockPort>,
        config: &EngineConfig,
        session_id: SessionId,
    ) -> Result<(Self, WorldState), LedgerError> {
        let retry = StorageRetry::new(&config.storage_retry);

        retry
            .run("get_session", || stores.sessions.get(session_id))
            .await?
            .ok_or(LedgerError::SessionNotFound(session_id))?;

        let snapshots = retry
            .run("list_snapshots", || stores.snapshots.list(session_id))
            .await?;
        let genesis = snapshots
            .iter()
            .find(|s| s.reason == SnapshotReason::Genesis)
            .map(|s| s.id)
            .ok_or_else(|| LedgerError::corruption("snapshot", 0, "no genesis snapshot"))?;

        let canon_head = match retry
            .run("canon_head", || stores.canon.head(session_id))
            .await?
        {
            Some(entry) => (entry.sequence, entry.hash),
            None => (0, GENESIS_HASH.to_string()),
        };

        let mut engine = Self {
            session_id,
            stores,
            clock,
            retry,
            verification: config.chain_verification,
            event_head: 0,
            canon_head,
            verified: None,
            lineage: Lineage::new(),
            genesis,
            loop_count: 0,
            last_automatic: None,
        };

        match engine.verification {
            ChainVerification::Full => {
                engine.verify_chain().await?;
            }
            ChainVerification::Incremental => {
                engine.verify_incremental().await?;
            }
        }

        let head = engine
            .retry
            .run("event_head", || engine.stores.events.head(session_id))
            .await?;
        let events = engine.events_range(1, head).await?;
        for (expected, event) in (1..).zip(&events) {
            if event.sequence != expected {
                return Err(LedgerError::corruption(
                    "event",
                    expected,
                    format!("found sequence {}", event.sequence),
                ));
            }
        }
        if events.len() as u64 != head {
            return Err(LedgerError::corruption(
                "event",
                events.len() as u64 + 1,
                "entries missing before the head",
            ));
        }

        engine.event_head = head;
        engine.lineage = Lineage::rebuild(&events);
        engine.loop_count = events
            .iter()
            .filter_map(|e| e.fork.as_ref().map(|f| f.loop_count))
            .max()
            .unwrap_or(0);

        let state = engine.replay_events(&events).await?;

        tracing::info!(
            session_id = %session_id,
            events = head,
            canon = engine.canon_head.0,
            turn = state.turn(),
            "Session opened"
        );
        Ok((engine, state))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn event_head(&self) -> u64 {
        self.event_head
    }

    pub fn canon_head(&self) -> (u64, &str) {
        (self.canon_head.0, &self.canon_head.1)
    }

    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn genesis_snapshot(&self) -> SnapshotId {
        self.genesis
    }

    pub fn last_verified(&self) -> Option<&ChainCheckpoint> {
        self.verified.as_ref()
    }

    // =========================================================================
    // Appends
    // =========================================================================

    pub async fn append_event(
        &mut self,
        pending: PendingEvent,
    ) -> Result<EventLedgerEntry, LedgerError> {
        let sequence = self.event_head + 1;
        let entry = pending.into_entry(self.session_id, sequence, self.clock.now());
        self.retry
            .run("append_event", || self.stores.events.append(&entry))
            .await?;

        self.event_head = sequence;
        self.lineage.record(&entry);
        tracing::debug!(
            session_id = %self.session_id,
            sequence,
            kind = %entry.kind,
            turn = entry.turn,
            "Event appended"
        );
        Ok(entry)
    }

    pub async fn append_canon(
        &mut self,
        record: CanonRecord,
    ) -> Result<CanonLedgerEntry, LedgerError> {
        let stored = self
            .retry
            .run("canon_head", || self.stores.canon.head(self.session_id))
            .await?;
        let (stored_sequence, stored_hash) = match &stored {
            Some(entry) => (entry.sequence, entry.hash.as_str()),
            None => (0, GENESIS_HASH),
        };
        if stored_sequence != self.canon_head.0 || stored_hash != self.canon_head.1 {
            tracing::error!(
                session_id = %self.session_id,
                expected = %self.canon_head.1,
                found = %stored_hash,
                "Canon head moved underneath the session"
            );
            return Err(LedgerError::ChainIntegrity {
                expected: format!("{}@{}", self.canon_head.0, self.canon_head.1),
                found: format!("{}@{}", stored_sequence, stored_hash),
            });
        }

        let sequence = self.canon_head.0 + 1;
        let entry = canon_chain::seal(
            record,
            self.session_id,
            sequence,
            self.clock.now(),
            &self.canon_head.1,
        );
        self.retry
            .run("append_canon", || self.stores.canon.append(&entry))
            .await?;

        self.canon_head = (sequence, entry.hash.clone());
        tracing::info!(
            session_id = %self.session_id,
            sequence,
            kind = %entry.kind,
            turn = entry.turn,
            "Canon entry sealed"
        );
        Ok(entry)
    }

    // =========================================================================
    // Snapshots and rewind
    // =========================================================================

    /// Capture `state`. Automatic reasons are idempotent per turn: a second
    /// automatic request in the same turn returns the first snapshot.
    pub async fn take_snapshot(
        &mut self,
        reason: SnapshotReason,
        state: &WorldState,
    ) -> Result<Snapshot, LedgerError> {
        if reason.is_automatic() {
            if let Some(existing) = &self.last_automatic {
                if existing.turn == state.turn() && existing.event_offset == self.event_head {
                    return Ok(existing.clone());
                }
            }
        }

        let snapshot = Snapshot::capture(
            self.session_id,
            reason,
            state,
            self.event_head,
            self.canon_head.0,
            self.clock.now(),
        );
        self.retry
            .run("save_snapshot", || self.stores.snapshots.save(&snapshot))
            .await?;

        if reason.is_automatic() {
            self.last_automatic = Some(snapshot.clone());
        }
        tracing::info!(
            session_id = %self.session_id,
            snapshot_id = %snapshot.id,
            turn = snapshot.turn,
            reason = %reason,
            event_offset = snapshot.event_offset,
            "Snapshot taken"
        );
        Ok(snapshot)
    }

    pub async fn get_snapshot(&self, id: SnapshotId) -> Result<Snapshot, LedgerError> {
        self.retry
            .run("get_snapshot", || self.stores.snapshots.get(self.session_id, id))
            .await?
            .ok_or(LedgerError::SnapshotNotFound(id))
    }

    /// Return to `snapshot_id`. Appends a fork event and a fork canon entry,
    /// cuts the lineage back, and hands back the snapshot whose state becomes
    /// the live state.
    pub async fn rewind(
        &mut self,
        snapshot_id: SnapshotId,
        actor: EntityId,
    ) -> Result<Snapshot, LedgerError> {
        let snapshot = self.get_snapshot(snapshot_id).await?;
        let timeline = self.timeline_at(snapshot.event_offset).await?;
        let loop_count = self.loop_count + 1;
        let marker = ForkMarker {
            snapshot_id,
            event_offset: snapshot.event_offset,
            turn: snapshot.turn,
            loop_count,
            timeline,
        };

        let fork = self.append_event(PendingEvent::fork(actor, marker)).await?;
        let content = serde_json::json!({
            "snapshot_id": snapshot_id,
            "turn": snapshot.turn,
            "loop_count": loop_count,
            "fork_sequence": fork.sequence,
        });
        self.append_canon(CanonRecord::new(
            CanonKind::Fork,
            snapshot.turn,
            content.to_string(),
        ))
        .await?;

        self.loop_count = loop_count;
        self.last_automatic = None;
        tracing::info!(
            session_id = %self.session_id,
            snapshot_id = %snapshot_id,
            turn = snapshot.turn,
            loop_count,
            "Rewound"
        );
        Ok(snapshot)
    }

    /// The lineage as it stood when the event ledger's head was `offset`.
    async fn timeline_at(&self, offset: u64) -> Result<Lineage, LedgerError> {
        if offset == 0 {
            return Ok(Lineage::new());
        }
        if self.lineage.contains(offset) {
            let mut timeline = self.lineage.clone();
            timeline.cut_to(offset);
            return Ok(timeline);
        }
        let prefix = self.events_range(1, offset).await?;
        let timeline = Lineage::rebuild(&prefix);
        if timeline.head() != Some(offset) {
            return Err(LedgerError::corruption(
                "event",
                offset,
                "snapshot offset is not on any recorded timeline",
            ));
        }
        Ok(timeline)
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Re-hash the whole canon chain from genesis.
    pub async fn verify_chain(&mut self) -> Result<ChainCheckpoint, LedgerError> {
        let entries = self.canon_entries().await?;
        self.verify_from(&entries, 0, GENESIS_HASH.to_string()).await
    }

    /// Re-hash only what follows the persisted checkpoint, after confirming
    /// the checkpoint entry still carries the recorded hash.
    pub async fn verify_incremental(&mut self) -> Result<ChainCheckpoint, LedgerError> {
        let checkpoint = self
            .retry
            .run("load_checkpoint", || {
                self.stores.canon.load_checkpoint(self.session_id)
            })
            .await?;

        let Some(checkpoint) = checkpoint.filter(|c| c.sequence > 0) else {
            return self.verify_chain().await;
        };

        let anchor = self
            .retry
            .run("canon_range", || {
                self.stores
                    .canon
                    .range(self.session_id, checkpoint.sequence, checkpoint.sequence)
            })
            .await?;
        match anchor.first() {
            Some(entry) if entry.hash == checkpoint.hash => {}
            _ => {
                return Err(LedgerError::corruption(
                    "canon",
                    checkpoint.sequence,
                    "checkpoint entry no longer matches its recorded hash",
                ))
            }
        }

        let rest = self
            .retry
            .run("canon_range", || {
                self.stores
                    .canon
                    .range(self.session_id, checkpoint.sequence + 1, u64::MAX)
            })
            .await?;
        self.verify_from(&rest, checkpoint.sequence, checkpoint.hash)
            .await
    }

    async fn verify_from(
        &mut self,
        entries: &[CanonLedgerEntry],
        after_sequence: u64,
        after_hash: String,
    ) -> Result<ChainCheckpoint, LedgerError> {
        let (sequence, hash) =
            canon_chain::verify(entries, after_sequence, &after_hash).map_err(|b| {
                tracing::error!(
                    session_id = %self.session_id,
                    sequence = b.sequence,
                    reason = %b.reason,
                    "Canon chain verification failed"
                );
                LedgerError::corruption("canon", b.sequence, b.reason)
            })?;

        if sequence != self.canon_head.0 || hash != self.canon_head.1 {
            return Err(LedgerError::corruption(
                "canon",
                sequence + 1,
                format!("chain ends at {sequence} but the head is {}", self.canon_head.0),
            ));
        }

        let checkpoint = ChainCheckpoint {
            sequence,
            hash,
            verified_at: self.clock.now(),
        };
        self.retry
            .run("save_checkpoint", || {
                self.stores.canon.save_checkpoint(self.session_id, &checkpoint)
            })
            .await?;
        self.verified = Some(checkpoint.clone());
        tracing::debug!(session_id = %self.session_id, sequence, "Canon chain verified");
        Ok(checkpoint)
    }

    // =========================================================================
    // Replay and reads
    // =========================================================================

    /// Rebuild world state from the genesis snapshot and events `1..=upto`.
    pub async fn replay(&self, upto: u64) -> Result<WorldState, LedgerError> {
        let events = self.events_range(1, upto.min(self.event_head)).await?;
        self.replay_events(&events).await
    }

    async fn replay_events(&self, events: &[EventLedgerEntry]) -> Result<WorldState, LedgerError> {
        let mut snapshots: HashMap<SnapshotId, WorldState> = HashMap::new();
        let mut state = self.get_snapshot(self.genesis).await?.state;

        for event in events {
            match (event.kind, event.status) {
                (EventKind::Fork, _) => {
                    let marker = event.fork.as_ref().ok_or_else(|| {
                        LedgerError::corruption("event", event.sequence, "fork without a marker")
                    })?;
                    state = match snapshots.get(&marker.snapshot_id) {
                        Some(cached) => cached.clone(),
                        None => {
                            let restored = self.get_snapshot(marker.snapshot_id).await?.state;
                            snapshots.insert(marker.snapshot_id, restored.clone());
                            restored
                        }
                    };
                }
                (_, EventStatus::Rejected) => {}
                (EventKind::Turn, EventStatus::Accepted) => {
                    state = state
                        .apply_turn(&event.delta)
                        .map_err(|e| corrupt_event(event, e))?
                        .0;
                }
                (EventKind::DirectorSpawn, EventStatus::Accepted) => {
                    state = state
                        .apply_delta(&event.delta)
                        .map_err(|e| corrupt_event(event, e))?
                        .0;
                }
            }
        }
        Ok(state)
    }

    /// The last `n` events on the current timeline, oldest first.
    pub async fn recent_events(&self, n: usize) -> Result<Vec<EventLedgerEntry>, LedgerError> {
        let sequences = self.lineage.recent(n);
        let (Some(&first), Some(&last)) = (sequences.first(), sequences.last()) else {
            return Ok(Vec::new());
        };
        let events = self.events_range(first, last).await?;
        Ok(events
            .into_iter()
            .filter(|e| self.lineage.contains(e.sequence))
            .collect())
    }

    pub async fn events_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<EventLedgerEntry>, LedgerError> {
        self.retry
            .run("event_range", || {
                self.stores.events.range(self.session_id, from, to)
            })
            .await
    }

    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotSummary>, LedgerError> {
        self.retry
            .run("list_snapshots", || self.stores.snapshots.list(self.session_id))
            .await
    }

    /// Snapshots reachable on the current timeline, oldest first.
    pub async fn timeline_snapshots(&self) -> Result<Vec<SnapshotSummary>, LedgerError> {
        Ok(self
            .list_snapshots()
            .await?
            .into_iter()
            .filter(|s| s.event_offset == 0 || self.lineage.contains(s.event_offset))
            .collect())
    }

    pub async fn canon_entries(&self) -> Result<Vec<CanonLedgerEntry>, LedgerError> {
        self.retry
            .run("canon_range", || {
                self.stores.canon.range(self.session_id, 1, u64::MAX)
            })
            .await
    }
}

fn corrupt_event(event: &EventLedgerEntry, err: impl std::fmt::Display) -> LedgerError {
    LedgerError::corruption("event", event.sequence, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use crate::infrastructure::clock::{FixedClock, SystemClock};
    use crate::infrastructure::persistence::InMemoryLedgerStore;
    use chronicle_domain::{
        ActionDescriptor, ActionType, Entity, EntityKind, Location, LocationKind, ResourceKind,
        StateChange, StateDelta,
    };

    fn world() -> WorldState {
        let hero = Entity::new("hero", "Hero", EntityKind::Player, "square").with_hp(10);
        WorldState::new(
            hero,
            vec![Location::new("square", "Town Square", "vale", LocationKind::Settlement)],
        )
        .expect("world")
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.storage_retry.base_delay_ms = 1;
        config.storage_retry.max_delay_ms = 2;
        config
    }

    async fn engine() -> (Arc<InMemoryLedgerStore>, LedgerEngine, WorldState) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let state = world();
        let (engine, _) = LedgerEngine::create(
            LedgerStores::from_store(store.clone()),
            Arc::new(SystemClock::new()),
            &config(),
            "test",
            &state,
        )
        .await
        .expect("create");
        (store, engine, state)
    }

    fn hurt(amount: i64) -> StateDelta {
        StateDelta::new().with(StateChange::AdjustResource {
            entity: EntityId::new("hero"),
            resource: ResourceKind::Hp,
            amount: -amount,
        })
    }

    async fn play(engine: &mut LedgerEngine, state: &WorldState, delta: StateDelta) -> WorldState {
        let (next, applied) = state.apply_turn(&delta).expect("apply");
        let action = ActionDescriptor::new(ActionType::Rest, "rest");
        engine
            .append_event(PendingEvent::accepted(
                state.turn(),
                EntityId::new("hero"),
                action,
                applied.delta,
                1,
                "",
            ))
            .await
            .expect("append");
        next
    }

    #[tokio::test]
    async fn replay_matches_the_live_state() {
        let (_store, mut engine, mut state) = engine().await;
        for amount in [1, 2, 3] {
            state = play(&mut engine, &state, hurt(amount)).await;
        }
        let replayed = engine.replay(engine.event_head()).await.expect("replay");
        assert_eq!(replayed, state);
        assert_eq!(replayed.turn(), 3);

        let partial = engine.replay(1).await.expect("replay");
        assert_eq!(partial.player().expect("player").hp().map(|h| h.current()), Some(9));
    }

    #[tokio::test]
    async fn automatic_snapshots_are_idempotent_per_turn() {
        let (_store, mut engine, state) = engine().await;
        let state = play(&mut engine, &state, hurt(1)).await;
        let first = engine
            .take_snapshot(SnapshotReason::LongRest, &state)
            .await
            .expect("snapshot");
        let second = engine
            .take_snapshot(SnapshotReason::Interval, &state)
            .await
            .expect("snapshot");
        assert_eq!(first.id, second.id);

        let manual = engine
            .take_snapshot(SnapshotReason::Manual, &state)
            .await
            .expect("snapshot");
        assert_ne!(manual.id, first.id);
        assert_eq!(engine.list_snapshots().await.expect("list").len(), 3);
    }

    #[tokio::test]
    async fn rewind_marks_both_ledgers_and_cuts_the_lineage() {
        let (_store, mut engine, mut state) = engine().await;
        state = play(&mut engine, &state, hurt(1)).await;
        let snapshot = engine
            .take_snapshot(SnapshotReason::Manual, &state)
            .await
            .expect("snapshot");
        let at_snapshot = state.clone();
        state = play(&mut engine, &state, hurt(4)).await;
        assert_ne!(state, at_snapshot);

        let restored = engine
            .rewind(snapshot.id, EntityId::new("hero"))
            .await
            .expect("rewind");
        assert_eq!(restored.state, at_snapshot);
        assert_eq!(engine.event_head(), 3);
        assert_eq!(engine.lineage().segments(), &[(1, 1), (3, 3)]);
        assert_eq!(engine.loop_count(), 1);

        let canon = engine.canon_entries().await.expect("canon");
        assert_eq!(canon.len(), 1);
        assert_eq!(canon[0].kind, CanonKind::Fork);

        let replayed = engine.replay(engine.event_head()).await.expect("replay");
        assert_eq!(replayed, at_snapshot);

        let recent = engine.recent_events(10).await.expect("recent");
        assert_eq!(recent.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[tokio::test]
    async fn rewinding_onto_an_abandoned_branch_restores_its_timeline() {
        let (store, mut engine, mut state) = engine().await;
        let hero = EntityId::new("hero");
        state = play(&mut engine, &state, hurt(1)).await;
        state = play(&mut engine, &state, hurt(1)).await;
        let early = engine
            .take_snapshot(SnapshotReason::Manual, &state)
            .await
            .expect("snapshot");
        state = play(&mut engine, &state, hurt(1)).await;
        state = play(&mut engine, &state, hurt(1)).await;
        let late = engine
            .take_snapshot(SnapshotReason::Manual, &state)
            .await
            .expect("snapshot");

        engine.rewind(early.id, hero.clone()).await.expect("rewind");
        assert_eq!(engine.lineage().segments(), &[(1, 2), (5, 5)]);

        let restored = engine.rewind(late.id, hero).await.expect("rewind").state;
        assert_eq!(restored, state);
        assert_eq!(restored.player().expect("player").hp().map(|h| h.current()), Some(6));
        assert_eq!(engine.lineage().segments(), &[(1, 4), (6, 6)]);
        assert_eq!(engine.loop_count(), 2);

        let recent = engine.recent_events(10).await.expect("recent");
        assert_eq!(
            recent.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 6]
        );
        assert_eq!(engine.replay(engine.event_head()).await.expect("replay"), state);

        let turns: Vec<u32> = engine
            .timeline_snapshots()
            .await
            .expect("snapshots")
            .iter()
            .map(|s| s.turn)
            .collect();
        assert_eq!(turns, vec![0, 2, 4]);

        let (reopened, reopened_state) = LedgerEngine::open(
            LedgerStores::from_store(store),
            Arc::new(SystemClock::new()),
            &config(),
            engine.session_id(),
        )
        .await
        .expect("open");
        assert_eq!(reopened.lineage(), engine.lineage());
        assert_eq!(reopened_state, state);
    }

    #[tokio::test]
    async fn unknown_snapshot_is_not_fatal() {
        let (_store, mut engine, _) = engine().await;
        let err = engine
            .rewind(SnapshotId::new(), EntityId::new("hero"))
            .await
            .expect_err("missing");
        assert!(matches!(err, LedgerError::SnapshotNotFound(_)));
        assert!(!err.is_fatal());
        assert_eq!(engine.event_head(), 0);
    }

    #[tokio::test]
    async fn canon_append_detects_a_moved_head() {
        let (store, mut engine, _) = engine().await;
        engine
            .append_canon(CanonRecord::new(CanonKind::Milestone, 0, "{}"))
            .await
            .expect("append");

        // Another writer extends the chain behind this engine's back.
        let intruder = canon_chain::seal(
            CanonRecord::new(CanonKind::Milestone, 0, r#"{"x":1}"#),
            engine.session_id(),
            2,
            Utc::now(),
            engine.canon_head().1,
        );
        CanonRepo::append(store.as_ref(), &intruder).await.expect("append");

        let err = engine
            .append_canon(CanonRecord::new(CanonKind::Milestone, 1, "{}"))
            .await
            .expect_err("mismatch");
        assert!(matches!(err, LedgerError::ChainIntegrity { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn tampering_is_found_by_verification() {
        let (store, mut engine, _) = engine().await;
        for turn in 0..3 {
            engine
                .append_canon(CanonRecord::new(
                    CanonKind::Milestone,
                    turn,
                    format!(r#"{{"t":{turn}}}"#),
                ))
                .await
                .expect("append");
        }
        engine.verify_chain().await.expect("intact");
        assert_eq!(engine.last_verified().map(|c| c.sequence), Some(3));

        assert!(store.tamper_canon(engine.session_id(), 2, r#"{"t":99}"#));
        match engine.verify_chain().await {
            Err(LedgerError::Corruption { sequence, .. }) => assert_eq!(sequence, 2),
            other => panic!("expected corruption, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn checkpoints_are_stamped_by_the_engine_clock() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).single().expect("timestamp");
        let (mut engine, _) = LedgerEngine::create(
            LedgerStores::from_store(store.clone()),
            Arc::new(FixedClock(at)),
            &config(),
            "test",
            &world(),
        )
        .await
        .expect("create");
        engine
            .append_canon(CanonRecord::new(CanonKind::Milestone, 0, "{}"))
            .await
            .expect("append");

        let checkpoint = engine.verify_chain().await.expect("verify");
        assert_eq!(checkpoint.verified_at, at);
        let stored = CanonRepo::load_checkpoint(store.as_ref(), engine.session_id())
            .await
            .expect("load")
            .expect("checkpoint");
        assert_eq!(stored.verified_at, at);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_storage_errors() {
        let (store, mut engine, state) = engine().await;
        store.fail_next_writes(10);
        let action = ActionDescriptor::new(ActionType::Look, "look");
        let err = engine
            .append_event(PendingEvent::accepted(
                state.turn(),
                EntityId::new("hero"),
                action,
                StateDelta::new(),
                0,
                "",
            ))
            .await
            .expect_err("storage");
        assert!(matches!(err, LedgerError::Storage { attempts: 4, .. }));
        assert_eq!(engine.event_head(), 0);
    }

    #[tokio::test]
    async fn open_rebuilds_cursor_lineage_and_state() {
        let (store, mut engine, mut state) = engine().await;
        state = play(&mut engine, &state, hurt(2)).await;
        let snapshot = engine
            .take_snapshot(SnapshotReason::Manual, &state)
            .await
            .expect("snapshot");
        play(&mut engine, &state, hurt(3)).await;
        let restored = engine
            .rewind(snapshot.id, EntityId::new("hero"))
            .await
            .expect("rewind")
            .state;

        let (reopened, reopened_state) = LedgerEngine::open(
            LedgerStores::from_store(store),
            Arc::new(SystemClock::new()),
            &config(),
            engine.session_id(),
        )
        .await
        .expect("open");

        assert_eq!(reopened_state, restored);
        assert_eq!(reopened.event_head(), engine.event_head());
        assert_eq!(reopened.canon_head().1, engine.canon_head().1);
        assert_eq!(reopened.lineage(), engine.lineage());
        assert_eq!(reopened.loop_count(), 1);
    }

    #[tokio::test]
    async fn incremental_open_trusts_the_checkpoint() {
        let (store, mut engine, _) = engine().await;
        for turn in 0..2 {
            engine
                .append_canon(CanonRecord::new(CanonKind::Milestone, turn, "{}"))
                .await
                .expect("append");
        }
        engine.verify_chain().await.expect("verify");

        let mut incremental = config();
        incremental.chain_verification = ChainVerification::Incremental;
        let stores = LedgerStores::from_store(store.clone());

        // Tampering before the checkpoint goes unnoticed in incremental mode,
        // unless it touches the checkpoint entry itself.
        assert!(store.tamper_canon(engine.session_id(), 1, r#"{"t":1}"#));
        let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());
        LedgerEngine::open(stores.clone(), clock.clone(), &incremental, engine.session_id())
            .await
            .expect("incremental open");

        let full = LedgerEngine::open(stores, clock, &config(), engine.session_id()).await;
        assert!(matches!(full, Err(LedgerError::Corruption { sequence: 1, .. })));
    }
}
