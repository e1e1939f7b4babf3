//! E2E test helpers for constructing the full application stack.
//!
//! Provides a fully-wired `App` over a SQLite ledger store in a temporary
//! directory, with scripted stand-ins for every latency-bound service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use chronicle_domain::{
    BoundedResource, Disposition, Entity, EntityDescriptor, EntityKind, Location, LocationKind,
    ResourceKind, SessionId, SpawnRequest, WorldState,
};

use crate::app::{App, Ports};
use crate::infrastructure::clock::{FixedClock, SequenceRandom};
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::persistence::SqliteLedgerStore;
use crate::infrastructure::ports::{
    ActionClassifierPort, ContentGeneratorPort, FallbackClassification, MemoryPort, MemorySnippet,
    NarrationRequest, NarratorPort, PlausibilityPort, ServiceError,
};
use crate::repositories::LedgerStores;
use crate::stores::SharedSession;
use crate::use_cases::turn::{TurnOutcome, TurnReply};

// =============================================================================
// Scripted services
// =============================================================================

/// Fallback classifier that always gives the same answer, optionally after
/// stalling.
pub struct ScriptedClassifier {
    pub answer: FallbackClassification,
    pub delay: Duration,
}

impl ScriptedClassifier {
    pub fn answering(action: &str, confidence: f32) -> Self {
        Self {
            answer: FallbackClassification {
                action: action.to_string(),
                targets: Vec::new(),
                confidence,
            },
            delay: Duration::ZERO,
        }
    }

    pub fn stalled(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::answering("look", 0.9)
        }
    }
}

#[async_trait]
impl ActionClassifierPort for ScriptedClassifier {
    async fn classify(
        &self,
        _input: &str,
        _valid_actions: &[String],
        _context: &str,
    ) -> Result<FallbackClassification, ServiceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.answer.clone())
    }
}

pub struct FixedPlausibility(pub u8);

#[async_trait]
impl PlausibilityPort for FixedPlausibility {
    async fn rate(&self, _input: &str, _context: &str) -> Result<u8, ServiceError> {
        Ok(self.0)
    }
}

pub struct NoMemory;

#[async_trait]
impl MemoryPort for NoMemory {
    async fn retrieve(
        &self,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<MemorySnippet>, ServiceError> {
        Ok(Vec::new())
    }
}

/// Narrator that is never reachable, so every narrative is the mechanical
/// summary.
pub struct OfflineNarrator;

#[async_trait]
impl NarratorPort for OfflineNarrator {
    async fn narrate(&self, _request: NarrationRequest) -> Result<String, ServiceError> {
        Err(ServiceError::Unavailable("narrator offline".into()))
    }
}

/// Generator that always conjures a harmless crow and counts its calls.
#[derive(Default)]
pub struct CountingGenerator {
    calls: AtomicUsize,
}

impl CountingGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentGeneratorPort for CountingGenerator {
    async fn generate(&self, _request: SpawnRequest) -> Result<EntityDescriptor, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(EntityDescriptor {
            name: "Crow".to_string(),
            kind: EntityKind::Creature,
            disposition: Disposition::Neutral,
            description: "A crow watches from a branch.".to_string(),
            hp: Some(3),
            stats: Default::default(),
            inventory: Default::default(),
        })
    }
}

// =============================================================================
// World
// =============================================================================

/// A wilderness clearing with the hero and a goblin. Hits are certain and
/// deal a flat 6.
pub fn arena() -> WorldState {
    let hero = Entity::new("hero", "Hero", EntityKind::Player, "clearing")
        .with_hp(20)
        .with_resource(ResourceKind::Gold, BoundedResource::new(10, 0, 1_000))
        .with_resource(ResourceKind::SpellSlots, BoundedResource::full(1))
        .with_stat("attack", 30)
        .with_stat("damage_dice", 0)
        .with_stat("damage", 6)
        .with_item("healing potion", 2)
        .with_item("sword", 1);
    let goblin = Entity::new("goblin", "Goblin", EntityKind::Creature, "clearing")
        .with_hp(14)
        .with_disposition(Disposition::Hostile)
        .with_stat("ac", 12);

    WorldState::new(
        hero,
        vec![
            Location::new("clearing", "Forest Clearing", "greenwood", LocationKind::Wilderness)
                .with_description("Ferns and fallen logs ring a patch of grass.")
                .with_exit("north", "ridge"),
            Location::new("ridge", "Windy Ridge", "greenwood", LocationKind::Wilderness)
                .with_exit("south", "clearing"),
        ],
    )
    .and_then(|w| w.with_entity(goblin))
    .expect("arena")
}

// =============================================================================
// Test Context
// =============================================================================

/// A fully-wired application over a throwaway database.
pub struct E2ETestContext {
    pub app: App,
    pub store: Arc<SqliteLedgerStore>,
    pub generator: Arc<CountingGenerator>,
    ports: Ports,
    _temp_dir: TempDir,
}

impl E2ETestContext {
    /// Classifier unsure of everything, middling plausibility.
    pub async fn setup() -> Self {
        Self::setup_with(ScriptedClassifier::answering("unknown", 0.0), FixedPlausibility(50)).await
    }

    pub async fn setup_with(
        classifier: ScriptedClassifier,
        plausibility: FixedPlausibility,
    ) -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let db_path = temp_dir.path().join("chronicle.db");
        let db_path = db_path.to_str().expect("utf-8 path").to_string();
        let store = Arc::new(SqliteLedgerStore::connect(&db_path).await.expect("sqlite store"));

        let generator = Arc::new(CountingGenerator::default());
        let ports = Ports {
            stores: LedgerStores::from_store(store.clone()),
            classifier: Arc::new(classifier),
            plausibility: Arc::new(plausibility),
            memory: Arc::new(NoMemory),
            narrator: Arc::new(OfflineNarrator),
            generator: generator.clone(),
            clock: Arc::new(FixedClock(
                Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0)
                    .single()
                    .expect("timestamp"),
            )),
            random: Arc::new(SequenceRandom::starting_at(1)),
        };

        let mut config = e2e_config();
        config.database_path = db_path;
        Self {
            app: App::new(config, ports.clone()),
            store,
            generator,
            ports,
            _temp_dir: temp_dir,
        }
    }

    /// A second application over the same database, with nothing cached.
    pub fn reopen(&self) -> App {
        App::new(self.app.config.clone(), self.ports.clone())
    }

    pub async fn new_session(&self) -> SharedSession {
        self.app
            .sessions
            .create("e2e", arena())
            .await
            .expect("create session")
    }

    pub async fn play(&self, session: &SharedSession, input: &str) -> TurnReply {
        session
            .lock()
            .await
            .play(&self.app.play_turn, input, &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("{input:?} failed: {e}"))
    }

    /// Play an input that must become a turn.
    pub async fn turn(&self, session: &SharedSession, input: &str) -> TurnOutcome {
        match self.play(session, input).await {
            TurnReply::Turn(outcome) => *outcome,
            other => panic!("{input:?} was not a turn: {other:?}"),
        }
    }

    /// Overwrite a canon entry's content behind the engine's back.
    pub async fn tamper_canon(&self, session_id: SessionId, sequence: u64, content: &str) {
        let result = sqlx::query(
            "UPDATE canon_entries SET content = ? WHERE session_id = ? AND sequence = ?",
        )
        .bind(content)
        .bind(session_id.to_string())
        .bind(sequence as i64)
        .execute(self.store.pool())
        .await
        .expect("tamper");
        assert_eq!(result.rows_affected(), 1, "no canon entry {sequence} to tamper with");
    }
}

/// Short timeouts and quick storage retries.
fn e2e_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.classification.budget = Duration::from_millis(600);
    config.classification.call_timeout = Duration::from_millis(300);
    config.turn.retrieve_timeout = Duration::from_millis(300);
    config.turn.render_timeout = Duration::from_millis(300);
    config.turn.director_timeout = Duration::from_millis(300);
    config.storage_retry.base_delay_ms = 1;
    config.storage_retry.max_delay_ms = 5;
    config
}

/// Every bounded resource of every entity sits within its bounds.
pub fn assert_within_bounds(state: &WorldState) {
    for entity in state.entities() {
        for (kind, resource) in &entity.resources {
            assert!(
                resource.min() <= resource.current() && resource.current() <= resource.max(),
                "{}'s {kind:?} out of bounds: {} not in [{}, {}]",
                entity.id,
                resource.current(),
                resource.min(),
                resource.max()
            );
        }
    }
}
