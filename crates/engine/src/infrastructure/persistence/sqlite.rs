//! SQLite ledger store.
//!
//! Events and snapshots are stored as JSON payloads next to the columns they
//! are queried by. Canon entries keep every hashed field in its own column so
//! the chain can be audited with plain SQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use chronicle_domain::{
    CanonKind, CanonLedgerEntry, EventLedgerEntry, SessionId, Snapshot, SnapshotId,
};

use crate::infrastructure::ports::{
    CanonRepo, ChainCheckpoint, EventRepo, RepoError, SessionRecord, SessionRepo, SnapshotRepo,
    SnapshotSummary,
};

pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Open (creating if needed) the database at `db_path`.
    pub async fn connect(db_path: &str) -> Result<Self, RepoError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .map_err(|e| RepoError::database("connect", e))?;
        Self::new(pool).await
    }

    pub async fn new(pool: SqlitePool) -> Result<Self, RepoError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("create_sessions", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                session_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                turn INTEGER NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (session_id, sequence)
            )
        "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("create_events", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS canon_entries (
                session_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                turn INTEGER NOT NULL,
                content TEXT NOT NULL,
                content_digest TEXT NOT NULL,
                prev_hash TEXT NOT NULL,
                hash TEXT NOT NULL,
                PRIMARY KEY (session_id, sequence)
            )
        "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("create_canon_entries", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                turn INTEGER NOT NULL,
                reason TEXT NOT NULL,
                event_offset INTEGER NOT NULL,
                canon_offset INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                state TEXT NOT NULL
            )
        "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("create_snapshots", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chain_checkpoints (
                session_id TEXT PRIMARY KEY,
                sequence INTEGER NOT NULL,
                hash TEXT NOT NULL,
                verified_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("create_chain_checkpoints", e))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// =============================================================================
// Row helpers
// =============================================================================

fn to_i64(value: u64, field: &str) -> Result<i64, RepoError> {
    i64::try_from(value).map_err(|_| RepoError::serialization(format!("{field} out of range")))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepoError::serialization(format!("bad timestamp {raw}: {e}")))
}

fn parse_session(raw: &str) -> Result<SessionId, RepoError> {
    raw.parse().map_err(RepoError::serialization)
}

/// Duplicate keys are a constraint violation, everything else is a
/// (possibly transient) database failure.
fn write_error(operation: &'static str, e: sqlx::Error) -> RepoError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => RepoError::constraint(format!("{operation}: {db}")),
        _ => RepoError::database(operation, e),
    }
}

fn kind_text<T: serde::Serialize>(value: &T) -> Result<String, RepoError> {
    match serde_json::to_value(value).map_err(RepoError::serialization)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

fn kind_from_text<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, RepoError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(RepoError::serialization)
}

fn row_to_canon(row: &SqliteRow) -> Result<CanonLedgerEntry, RepoError> {
    let session_id: String = row.get("session_id");
    let sequence: i64 = row.get("sequence");
    let timestamp: String = row.get("timestamp");
    let kind: String = row.get("kind");
    let turn: i64 = row.get("turn");

    Ok(CanonLedgerEntry {
        sequence: sequence as u64,
        session_id: parse_session(&session_id)?,
        timestamp: parse_time(&timestamp)?,
        kind: kind_from_text::<CanonKind>(&kind)?,
        turn: turn as u32,
        content: row.get("content"),
        content_digest: row.get("content_digest"),
        prev_hash: row.get("prev_hash"),
        hash: row.get("hash"),
    })
}

fn row_to_summary(row: &SqliteRow) -> Result<SnapshotSummary, RepoError> {
    let id: String = row.get("id");
    let turn: i64 = row.get("turn");
    let reason: String = row.get("reason");
    let event_offset: i64 = row.get("event_offset");
    let canon_offset: i64 = row.get("canon_offset");
    let created_at: String = row.get("created_at");

    Ok(SnapshotSummary {
        id: id.parse::<SnapshotId>().map_err(RepoError::serialization)?,
        turn: turn as u32,
        reason: kind_from_text(&reason)?,
        event_offset: event_offset as u64,
        canon_offset: canon_offset as u64,
        created_at: parse_time(&created_at)?,
    })
}

// =============================================================================
// Sessions
// =============================================================================

#[async_trait]
impl SessionRepo for SqliteLedgerStore {
    async fn create(&self, session: &SessionRecord) -> Result<(), RepoError> {
        sqlx::query("INSERT INTO sessions (id, title, created_at) VALUES (?, ?, ?)")
            .bind(session.id.to_string())
            .bind(&session.title)
            .bind(session.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| write_error("create_session", e))?;
        Ok(())
    }

    async fn get(&self, id: SessionId) -> Result<Option<SessionRecord>, RepoError> {
        let row = sqlx::query("SELECT id, title, created_at FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("get_session", e))?;

        row.map(|row| {
            let created_at: String = row.get("created_at");
            Ok(SessionRecord {
                id,
                title: row.get("title"),
                created_at: parse_time(&created_at)?,
            })
        })
        .transpose()
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, RepoError> {
        let rows = sqlx::query("SELECT id, title, created_at FROM sessions ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::database("list_sessions", e))?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let created_at: String = row.get("created_at");
                Ok(SessionRecord {
                    id: parse_session(&id)?,
                    title: row.get("title"),
                    created_at: parse_time(&created_at)?,
                })
            })
            .collect()
    }
}

// =============================================================================
// Event ledger
// =============================================================================

#[async_trait]
impl EventRepo for SqliteLedgerStore {
    async fn append(&self, entry: &EventLedgerEntry) -> Result<(), RepoError> {
        let payload = serde_json::to_string(entry).map_err(RepoError::serialization)?;
        sqlx::query(
            "INSERT INTO events (session_id, sequence, turn, kind, status, payload) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.session_id.to_string())
        .bind(to_i64(entry.sequence, "sequence")?)
        .bind(i64::from(entry.turn))
        .bind(kind_text(&entry.kind)?)
        .bind(kind_text(&entry.status)?)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error("append_event", e))?;
        Ok(())
    }

    async fn head(&self, session_id: SessionId) -> Result<u64, RepoError> {
        let head: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM events WHERE session_id = ?")
                .bind(session_id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| RepoError::database("event_head", e))?;
        Ok(head.unwrap_or(0) as u64)
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
        let rows = sqlx::query(
            "SELECT payload FROM events WHERE session_id = ? AND sequence BETWEEN ? AND ? ORDER BY sequence",
        )
        .bind(session_id.to_string())
        .bind(to_i64(from, "from")?)
        .bind(to_i64(to.min(i64::MAX as u64), "to")?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("event_range", e))?;

        rows.iter()
            .map(|row| {
                let payload: String = row.get("payload");
                serde_json::from_str(&payload).map_err(RepoError::serialization)
            })
            .collect()
    }
}

// =============================================================================
// Canon ledger
// =============================================================================

const CANON_COLUMNS: &str =
    "session_id, sequence, timestamp, kind, turn, content, content_digest, prev_hash, hash";

#[async_trait]
impl CanonRepo for SqliteLedgerStore {
    async fn append(&self, entry: &CanonLedgerEntry) -> Result<(), RepoError> {
        sqlx::query(&format!(
            "INSERT INTO canon_entries ({CANON_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(entry.session_id.to_string())
        .bind(to_i64(entry.sequence, "sequence")?)
        .bind(entry.timestamp.to_rfc3339())
        .bind(kind_text(&entry.kind)?)
        .bind(i64::from(entry.turn))
        .bind(&entry.content)
        .bind(&entry.content_digest)
        .bind(&entry.prev_hash)
        .bind(&entry.hash)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error("append_canon", e))?;
        Ok(())
    }

    async fn head(&self, session_id: SessionId) -> Result<Option<CanonLedgerEntry>, RepoError> {
        let row = sqlx::query(&format!(
            "SELECT {CANON_COLUMNS} FROM canon_entries WHERE session_id = ? ORDER BY sequence DESC LIMIT 1"
        ))
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::database("canon_head", e))?;

        row.as_ref().map(row_to_canon).transpose()
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
        let rows = sqlx::query(&format!(
            "SELECT {CANON_COLUMNS} FROM canon_entries WHERE session_id = ? AND sequence BETWEEN ? AND ? ORDER BY sequence"
        ))
        .bind(session_id.to_string())
        .bind(to_i64(from, "from")?)
        .bind(to_i64(to.min(i64::MAX as u64), "to")?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("canon_range", e))?;

        rows.iter().map(row_to_canon).collect()
    }

    async fn save_checkpoint(
        &self,
        session_id: SessionId,
        checkpoint: &ChainCheckpoint,
    ) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT OR REPLACE INTO chain_checkpoints (session_id, sequence, hash, verified_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id.to_string())
        .bind(to_i64(checkpoint.sequence, "sequence")?)
        .bind(&checkpoint.hash)
        .bind(checkpoint.verified_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("save_checkpoint", e))?;
        Ok(())
    }

    async fn load_checkpoint(
        &self,
        session_id: SessionId,
    ) -> Result<Option<ChainCheckpoint>, RepoError> {
        let row = sqlx::query(
            "SELECT sequence, hash, verified_at FROM chain_checkpoints WHERE session_id = ?",
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::database("load_checkpoint", e))?;

        row.map(|row| {
            let sequence: i64 = row.get("sequence");
            let verified_at: String = row.get("verified_at");
            Ok(ChainCheckpoint {
                sequence: sequence as u64,
                hash: row.get("hash"),
                verified_at: parse_time(&verified_at)?,
            })
        })
        .transpose()
    }
}

// =============================================================================
// Snapshots
// =============================================================================

#[async_trait]
impl SnapshotRepo for SqliteLedgerStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), RepoError> {
        let state = serde_json::to_string(&snapshot.state).map_err(RepoError::serialization)?;
        sqlx::query(
            r#"INSERT INTO snapshots (id, session_id, turn, reason, event_offset, canon_offset, created_at, state)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(snapshot.id.to_string())
        .bind(snapshot.session_id.to_string())
        .bind(i64::from(snapshot.turn))
        .bind(kind_text(&snapshot.reason)?)
        .bind(to_i64(snapshot.event_offset, "event_offset")?)
        .bind(to_i64(snapshot.canon_offset, "canon_offset")?)
        .bind(snapshot.created_at.to_rfc3339())
        .bind(state)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error("save_snapshot", e))?;
        Ok(())
    }

    async fn get(
        &self,
        session_id: SessionId,
        id: SnapshotId,
    ) -> Result<Option<Snapshot>, RepoError> {
        let row = sqlx::query(
            r#"SELECT id, turn, reason, event_offset, canon_offset, created_at, state
               FROM snapshots WHERE session_id = ? AND id = ?"#,
        )
        .bind(session_id.to_string())
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::database("get_snapshot", e))?;

        row.map(|row| {
            let summary = row_to_summary(&row)?;
            let state: String = row.get("state");
            Ok(Snapshot {
                id: summary.id,
                session_id,
                turn: summary.turn,
                reason: summary.reason,
                event_offset: summary.event_offset,
                canon_offset: summary.canon_offset,
                created_at: summary.created_at,
                state: serde_json::from_str(&state).map_err(RepoError::serialization)?,
            })
        })
        .transpose()
    }

    async fn list(&self, session_id: SessionId) -> Result<Vec<SnapshotSummary>, RepoError> {
        let rows = sqlx::query(
            r#"SELECT id, turn, reason, event_offset, canon_offset, created_at
               FROM snapshots WHERE session_id = ? ORDER BY event_offset, created_at"#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("list_snapshots", e))?;

        rows.iter().map(row_to_summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_domain::{
        ActionDescriptor, ActionType, CanonRecord, Entity, EntityId, EntityKind, Location,
        LocationKind, PendingEvent, SnapshotReason, StateDelta, WorldState, GENESIS_HASH,
    };

    async fn store() -> (tempfile::TempDir, SqliteLedgerStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("ledger.db");
        let store = SqliteLedgerStore::connect(&path.to_string_lossy())
            .await
            .expect("connect");
        (dir, store)
    }

    fn event(session_id: SessionId, sequence: u64) -> EventLedgerEntry {
        let action = ActionDescriptor::new(ActionType::Look, "look");
        PendingEvent::accepted(
            sequence as u32,
            EntityId::new("hero"),
            action,
            StateDelta::new(),
            7,
            "You look around.",
        )
        .into_entry(session_id, sequence, Utc::now())
    }

    fn world() -> WorldState {
        let hero = Entity::new("hero", "Hero", EntityKind::Player, "square").with_hp(10);
        WorldState::new(
            hero,
            vec![Location::new("square", "Town Square", "vale", LocationKind::Settlement)],
        )
            .expect("world")
    }

    #[tokio::test]
    async fn events_round_trip_in_sequence_order() {
        let (_dir, store) = store().await;
        let session = SessionId::new();
        for seq in [1, 2, 3] {
            EventRepo::append(&store, &event(session, seq)).await.expect("append");
        }

        assert_eq!(EventRepo::head(&store, session).await.expect("head"), 3);
        let range = EventRepo::range(&store, session, 2, 3).await.expect("range");
        assert_eq!(range.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(range[0].rng_seed, Some(7));
        assert_eq!(EventRepo::head(&store, SessionId::new()).await.expect("head"), 0);
    }

    #[tokio::test]
    async fn duplicate_sequence_is_a_constraint_violation() {
        let (_dir, store) = store().await;
        let session = SessionId::new();
        EventRepo::append(&store, &event(session, 1)).await.expect("append");

        let err = EventRepo::append(&store, &event(session, 1)).await.expect_err("duplicate");
        assert!(matches!(err, RepoError::ConstraintViolation(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn canon_entries_and_checkpoints_persist() {
        let (_dir, store) = store().await;
        let session = SessionId::new();
        let record = CanonRecord::new(CanonKind::Milestone, 0, r#"{"title":"begin"}"#);
        let entry = CanonLedgerEntry::from_record(
            record,
            session,
            1,
            Utc::now(),
            "d".repeat(64),
            GENESIS_HASH.to_string(),
            "h".repeat(64),
        );
        CanonRepo::append(&store, &entry).await.expect("append");

        let head = CanonRepo::head(&store, session).await.expect("head").expect("some");
        assert_eq!(head.hash, entry.hash);
        assert_eq!(head.kind, CanonKind::Milestone);

        let checkpoint = ChainCheckpoint {
            sequence: 1,
            hash: entry.hash.clone(),
            verified_at: Utc::now(),
        };
        store.save_checkpoint(session, &checkpoint).await.expect("save");
        let loaded = store.load_checkpoint(session).await.expect("load").expect("some");
        assert_eq!(loaded.sequence, 1);
        assert_eq!(loaded.hash, entry.hash);
    }

    #[tokio::test]
    async fn snapshots_keep_the_full_state() {
        let (_dir, store) = store().await;
        let session = SessionId::new();
        let state = world();
        let snapshot =
            Snapshot::capture(session, SnapshotReason::Genesis, &state, 0, 0, Utc::now());
        SnapshotRepo::save(&store, &snapshot).await.expect("save");

        let loaded = SnapshotRepo::get(&store, session, snapshot.id)
            .await
            .expect("get")
            .expect("some");
        assert_eq!(loaded.state, state);
        assert_eq!(loaded.reason, SnapshotReason::Genesis);

        let list = SnapshotRepo::list(&store, session).await.expect("list");
        assert_eq!(list.len(), 1);
        assert!(SnapshotRepo::get(&store, SessionId::new(), snapshot.id)
            .await
            .expect("get")
            .is_none());
    }

    #[tokio::test]
    async fn sessions_are_listed() {
        let (_dir, store) = store().await;
        let record = SessionRecord {
            id: SessionId::new(),
            title: "The Vale".into(),
            created_at: Utc::now(),
        };
        SessionRepo::create(&store, &record).await.expect("create");
        assert_eq!(SessionRepo::get(&store, record.id).await.expect("get"), Some(record.clone()));
        assert_eq!(SessionRepo::list(&store).await.expect("list"), vec![record]);
    }
}
