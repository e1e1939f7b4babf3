//! Application composition.

use std::sync::Arc;

use chronicle_domain::{
    BoundedResource, Disposition, DomainError, Entity, EntityKind, Location, LocationKind,
    ResourceKind, WorldState,
};

use crate::infrastructure::{
    clock::{SystemClock, SystemRandom},
    config::EngineConfig,
    llm_services::{LlmActionClassifier, LlmContentGenerator, LlmNarrator, LlmPlausibilityEvaluator},
    lore::LoreMemory,
    ollama::OllamaClient,
    persistence::SqliteLedgerStore,
    ports::{
        ActionClassifierPort, ClockPort, ContentGeneratorPort, LlmPort, MemoryPort, NarratorPort,
        PlausibilityPort, RandomPort, RepoError,
    },
    resilient_llm::ResilientLlmClient,
};
use crate::repositories::LedgerStores;
use crate::stores::SessionManager;
use crate::use_cases::classification::ClassificationPipeline;
use crate::use_cases::turn::PlayTurn;

/// Every port the engine talks to.
#[derive(Clone)]
pub struct Ports {
    pub stores: LedgerStores,
    pub classifier: Arc<dyn ActionClassifierPort>,
    pub plausibility: Arc<dyn PlausibilityPort>,
    pub memory: Arc<dyn MemoryPort>,
    pub narrator: Arc<dyn NarratorPort>,
    pub generator: Arc<dyn ContentGeneratorPort>,
    pub clock: Arc<dyn ClockPort>,
    pub random: Arc<dyn RandomPort>,
}

/// Main application state.
pub struct App {
    pub config: EngineConfig,
    pub sessions: SessionManager,
    pub play_turn: PlayTurn,
}

impl App {
    /// Wire the engine against any set of ports.
    pub fn new(config: EngineConfig, ports: Ports) -> Self {
        let classification = ClassificationPipeline::new(
            ports.classifier,
            ports.plausibility,
            config.classification.clone(),
        );
        let play_turn = PlayTurn::new(
            classification,
            ports.memory,
            ports.narrator,
            ports.random,
            config.turn.clone(),
        );
        let sessions = SessionManager::new(
            ports.stores,
            ports.clock,
            ports.generator,
            config.clone(),
        );
        Self {
            config,
            sessions,
            play_turn,
        }
    }

    /// The production wiring: SQLite ledgers, Ollama behind a retrying
    /// client, lore from `LORE_PATH` when set.
    pub async fn connect(config: EngineConfig) -> Result<Self, RepoError> {
        let store = Arc::new(SqliteLedgerStore::connect(&config.database_path).await?);
        tracing::info!(path = %config.database_path, "Ledger store ready");

        let ollama = Arc::new(OllamaClient::new(&config.ollama_base_url, &config.ollama_model));
        tracing::info!(
            model = %config.ollama_model,
            max_retries = config.llm_retry.max_retries,
            base_delay_ms = config.llm_retry.base_delay_ms,
            "LLM client configured"
        );
        let llm: Arc<dyn LlmPort> =
            Arc::new(ResilientLlmClient::new(ollama, config.llm_retry.clone()));

        let memory = match &config.lore_path {
            Some(path) => LoreMemory::load(path).await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Lore unavailable, retrieval will be empty");
                LoreMemory::empty()
            }),
            None => LoreMemory::empty(),
        };

        let ports = Ports {
            stores: LedgerStores::from_store(store),
            classifier: Arc::new(LlmActionClassifier::new(llm.clone())),
            plausibility: Arc::new(LlmPlausibilityEvaluator::new(llm.clone())),
            memory: Arc::new(memory),
            narrator: Arc::new(LlmNarrator::new(llm.clone())),
            generator: Arc::new(LlmContentGenerator::new(llm)),
            clock: Arc::new(SystemClock::new()),
            random: Arc::new(SystemRandom::new()),
        };
        Ok(Self::new(config, ports))
    }
}

/// The world a new session starts in.
pub fn starter_world() -> Result<WorldState, DomainError> {
    let player = Entity::new("player", "Wanderer", EntityKind::Player, "crossroads_inn")
        .with_hp(24)
        .with_resource(ResourceKind::Gold, BoundedResource::new(25, 0, 100_000))
        .with_resource(ResourceKind::SpellSlots, BoundedResource::full(2))
        .with_stat("attack", 4)
        .with_stat("damage", 2)
        .with_stat("dexterity", 2)
        .with_stat("constitution", 1)
        .with_stat("spell", 2)
        .with_item("shortsword", 1)
        .with_item("healing potion", 2)
        .with_item("ration", 3);

    let locations = vec![
        Location::new(
            "crossroads_inn",
            "The Crossroads Inn",
            "hollowmere",
            LocationKind::Settlement,
        )
        .with_description("A smoky common room where four roads meet.")
        .with_exit("north", "market")
        .with_exit("east", "old_road"),
        Location::new("market", "Hollowmere Market", "hollowmere", LocationKind::Settlement)
            .with_description("Stalls of cloth and iron under patched awnings.")
            .with_exit("south", "crossroads_inn"),
        Location::new("old_road", "The Old Road", "thornwood", LocationKind::Wilderness)
            .with_description("A rutted track vanishing into the thornwood.")
            .with_exit("west", "crossroads_inn")
            .with_exit("east", "barrow"),
        Location::new("barrow", "The Sunken Barrow", "thornwood", LocationKind::Dungeon)
            .with_description("Cold stone steps lead down into the dark.")
            .with_exit("west", "old_road"),
    ];

    WorldState::new(player, locations)?
        .with_entity(
            Entity::new("innkeeper", "Bram the Innkeeper", EntityKind::Npc, "crossroads_inn")
                .with_hp(10)
                .with_disposition(Disposition::Friendly),
        )?
        .with_entity(
            Entity::new("wolf", "Grey Wolf", EntityKind::Creature, "old_road")
                .with_hp(11)
                .with_disposition(Disposition::Hostile)
                .with_stat("ac", 12)
                .with_stat("attack", 3),
        )
        .map(|world| {
            world
                .with_flag("price:rope", "5")
                .with_flag("price:lantern", "12")
                .with_flag("quest:barrow", "open")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starter_world_is_consistent() {
        let world = starter_world().expect("world");
        let player = world.player().expect("player");
        assert_eq!(player.location.as_str(), "crossroads_inn");
        for location in world.locations() {
            for to in location.exits.values() {
                assert!(world.location(to).is_some(), "{} has a dangling exit", location.id);
            }
        }
    }
}
