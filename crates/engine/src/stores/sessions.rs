//! Open sessions, keyed by id.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use chronicle_domain::{default_triggers, SessionId, WorldState};

use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::ports::{ClockPort, ContentGeneratorPort, SessionRecord};
use crate::repositories::{LedgerEngine, LedgerError, LedgerStores, StorageRetry};
use crate::use_cases::director::Director;
use crate::use_cases::turn::SessionContext;

use super::session::GameSession;

pub type SharedSession = Arc<Mutex<GameSession>>;

/// Independent save sessions. Nothing is shared between them but the
/// store adapter.
pub struct SessionManager {
    sessions: DashMap<SessionId, SharedSession>,
    stores: LedgerStores,
    clock: Arc<dyn ClockPort>,
    generator: Arc<dyn ContentGeneratorPort>,
    config: EngineConfig,
}

impl SessionManager {
    pub fn new(
        stores: LedgerStores,
        clock: Arc<dyn ClockPort>,
        generator: Arc<dyn ContentGeneratorPort>,
        config: EngineConfig,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            stores,
            clock,
            generator,
            config,
        }
    }

    fn director(&self) -> Director {
        Director::new(
            self.generator.clone(),
            default_triggers(),
            self.config.turn.director_timeout,
        )
    }

    /// Start a new session from `world`.
    pub async fn create(
        &self,
        title: &str,
        world: WorldState,
    ) -> Result<SharedSession, LedgerError> {
        let (ledger, genesis) = LedgerEngine::create(
            self.stores.clone(),
            self.clock.clone(),
            &self.config,
            title,
            &world,
        )
        .await?;
        let id = ledger.session_id();
        let session = GameSession::new(
            SessionContext {
                state: world,
                ledger,
                director: self.director(),
            },
            Some(genesis.label()),
        );
        let shared = Arc::new(Mutex::new(session));
        self.sessions.insert(id, shared.clone());
        tracing::info!(session_id = %id, title, "Session created");
        Ok(shared)
    }

    /// Load a saved session: verify the canon chain, replay the timeline and
    /// rebuild director cooldowns. Already-open sessions are returned as is.
    pub async fn open(&self, id: SessionId) -> Result<SharedSession, LedgerError> {
        if let Some(existing) = self.sessions.get(&id) {
            return Ok(existing.clone());
        }

        let (ledger, state) =
            LedgerEngine::open(self.stores.clone(), self.clock.clone(), &self.config, id).await?;
        let timeline = ledger
            .recent_events(ledger.lineage().len() as usize)
            .await?;
        let mut director = self.director();
        director.rebuild(&timeline);
        let last_good = ledger
            .timeline_snapshots()
            .await?
            .last()
            .map(|s| format!("turn {} ({})", s.turn, s.reason));

        let session = GameSession::new(
            SessionContext {
                state,
                ledger,
                director,
            },
            last_good,
        );
        let shared = Arc::new(Mutex::new(session));
        self.sessions.insert(id, shared.clone());
        tracing::info!(session_id = %id, events = timeline.len(), "Session opened");
        Ok(shared)
    }

    pub fn get(&self, id: SessionId) -> Option<SharedSession> {
        self.sessions.get(&id).map(|s| s.clone())
    }

    /// Drop the in-memory session. The ledgers stay in the store.
    pub fn close(&self, id: SessionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    /// Every saved session, open or not.
    pub async fn saved(&self) -> Result<Vec<SessionRecord>, LedgerError> {
        StorageRetry::new(&self.config.storage_retry)
            .run("list_sessions", || self.stores.sessions.list())
            .await
    }
}
