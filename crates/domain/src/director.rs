//! Director triggers and pacing
//!
//! A trigger is a cooldown-gated rule that may spawn content after a turn.
//! Which trigger fires is decided by a pacing score computed from the
//! session's tension: calm scenes favor flavor and NPC spawns, tense scenes
//! favor escalation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::aggregates::WorldState;
use crate::entities::{Disposition, Entity, EntityKind};
use crate::error::DomainError;
use crate::ids::{EntityId, LocationId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnCategory {
    Flavor,
    Npc,
    Escalation,
}

impl fmt::Display for SpawnCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flavor => f.write_str("flavor"),
            Self::Npc => f.write_str("npc"),
            Self::Escalation => f.write_str("escalation"),
        }
    }
}

/// The predicate half of a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerCondition {
    /// A settlement with fewer than `below` living NPCs
    SparseNpcs { below: usize },
    /// Nobody else alive at the player's location
    EmptyLocation,
    /// Every `every` turns
    TurnInterval { every: u32 },
    /// Tension at or above `threshold`
    TensionAtLeast { threshold: f32 },
}

impl TriggerCondition {
    pub fn holds(&self, ctx: &PacingContext) -> bool {
        match self {
            Self::SparseNpcs { below } => ctx.is_settlement && ctx.living_npcs < *below,
            Self::EmptyLocation => ctx.others_alive == 0,
            Self::TurnInterval { every } => *every > 0 && ctx.turn > 0 && ctx.turn % every == 0,
            Self::TensionAtLeast { threshold } => ctx.tension >= *threshold,
        }
    }
}

/// A registered director trigger.
///
/// Only `last_fired_turn` changes after registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorTrigger {
    pub name: String,
    pub category: SpawnCategory,
    pub condition: TriggerCondition,
    pub cooldown_turns: u32,
    pub weight: f32,
    last_fired_turn: Option<u32>,
}

impl DirectorTrigger {
    pub fn new(
        name: impl Into<String>,
        category: SpawnCategory,
        condition: TriggerCondition,
        cooldown_turns: u32,
        weight: f32,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            condition,
            cooldown_turns,
            weight,
            last_fired_turn: None,
        }
    }

    pub fn last_fired_turn(&self) -> Option<u32> {
        self.last_fired_turn
    }

    /// Turns left before the trigger may fire again.
    pub fn cooldown_remaining(&self, turn: u32) -> u32 {
        match self.last_fired_turn {
            None => 0,
            Some(fired) => self
                .cooldown_turns
                .saturating_sub(turn.saturating_sub(fired)),
        }
    }

    pub fn is_ready(&self, turn: u32) -> bool {
        self.cooldown_remaining(turn) == 0
    }

    pub fn mark_fired(&mut self, turn: u32) {
        self.last_fired_turn = Some(turn);
    }

    pub fn reset(&mut self) {
        self.last_fired_turn = None;
    }

    /// Weighted pacing score. Zero or less means ineligible.
    pub fn score(&self, ctx: &PacingContext) -> f32 {
        let fit = match self.category {
            SpawnCategory::Flavor | SpawnCategory::Npc => 1.0 - ctx.tension,
            SpawnCategory::Escalation => ctx.tension,
        };
        self.weight * fit
    }
}

/// The built-in triggers, in registration order.
pub fn default_triggers() -> Vec<DirectorTrigger> {
    vec![
        DirectorTrigger::new(
            "sparse_npcs",
            SpawnCategory::Npc,
            TriggerCondition::SparseNpcs { below: 2 },
            5,
            1.0,
        ),
        DirectorTrigger::new(
            "empty_location",
            SpawnCategory::Flavor,
            TriggerCondition::EmptyLocation,
            6,
            0.8,
        ),
        DirectorTrigger::new(
            "pacing_hook",
            SpawnCategory::Flavor,
            TriggerCondition::TurnInterval { every: 10 },
            10,
            0.6,
        ),
        DirectorTrigger::new(
            "escalation",
            SpawnCategory::Escalation,
            TriggerCondition::TensionAtLeast { threshold: 0.5 },
            8,
            1.2,
        ),
    ]
}

/// What the director sees after a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacingContext {
    pub turn: u32,
    pub location: LocationId,
    pub is_settlement: bool,
    pub living_npcs: usize,
    pub others_alive: usize,
    pub hostiles: usize,
    pub recent_combat: usize,
    /// In `[0, 1]`
    pub tension: f32,
}

impl PacingContext {
    /// Build from state plus the number of combat events in the recent window.
    pub fn from_state(state: &WorldState, recent_combat: usize) -> Result<Self, DomainError> {
        let player = state.player()?;
        let location = player.location.clone();
        let is_settlement = state
            .location(&location)
            .is_some_and(|l| l.is_settlement());

        let (others_alive, living_npcs, hostiles) = state.others_alive_at(&location).fold(
            (0, 0, 0),
            |(others, npcs, hostiles), e: &Entity| {
                (
                    others + 1,
                    npcs + usize::from(e.is_npc()),
                    hostiles + usize::from(e.disposition == Disposition::Hostile),
                )
            },
        );

        Ok(Self {
            turn: state.turn(),
            is_settlement,
            living_npcs,
            others_alive,
            hostiles,
            recent_combat,
            tension: tension(hostiles, player.hp_ratio(), recent_combat),
            location,
        })
    }
}

/// Tension in `[0, 1]`: hostiles present (+0.25 each, at most 0.5), player
/// below half HP (+0.3), recent combat (+0.1 each, at most 0.2).
pub fn tension(hostiles: usize, player_hp_ratio: Option<f32>, recent_combat: usize) -> f32 {
    let hostile_part = (hostiles as f32 * 0.25).min(0.5);
    let wounded_part = match player_hp_ratio {
        Some(ratio) if ratio < 0.5 => 0.3,
        _ => 0.0,
    };
    let combat_part = (recent_combat as f32 * 0.1).min(0.2);
    (hostile_part + wounded_part + combat_part).clamp(0.0, 1.0)
}

/// Request handed to the content generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub trigger: String,
    pub category: SpawnCategory,
    pub context: PacingContext,
    pub location_name: String,
}

/// What a content generator returns: an entity without an identity or a
/// place, which the director assigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    pub kind: EntityKind,
    #[serde(default)]
    pub disposition: Disposition,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hp: Option<i64>,
    #[serde(default)]
    pub stats: BTreeMap<String, i64>,
    #[serde(default)]
    pub inventory: BTreeMap<String, u32>,
}

impl EntityDescriptor {
    /// Materialize at `location` under `id`. Generated content can never
    /// be a second player.
    pub fn into_entity(self, id: EntityId, location: LocationId) -> Entity {
        let kind = match self.kind {
            EntityKind::Player => EntityKind::Npc,
            other => other,
        };
        let mut entity = Entity::new(id, self.name, kind, location)
            .with_disposition(self.disposition)
            .with_description(self.description);
        if let Some(hp) = self.hp.filter(|hp| *hp > 0) {
            entity = entity.with_hp(hp);
        }
        entity.stats = self.stats;
        entity.inventory = self.inventory.into_iter().filter(|(_, q)| *q > 0).collect();
        entity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm() -> PacingContext {
        PacingContext {
            turn: 3,
            location: LocationId::new("square"),
            is_settlement: true,
            living_npcs: 0,
            others_alive: 0,
            hostiles: 0,
            recent_combat: 0,
            tension: 0.0,
        }
    }

    #[test]
    fn tension_components_are_capped() {
        assert_eq!(tension(0, Some(1.0), 0), 0.0);
        assert_eq!(tension(5, None, 0), 0.5);
        assert!((tension(1, Some(0.2), 7) - 0.75).abs() < 1e-6);
        assert!((tension(4, Some(0.1), 4) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cooldown_counts_down_from_last_fire() {
        let mut trigger = default_triggers().remove(0);
        assert!(trigger.is_ready(1));
        trigger.mark_fired(4);
        assert_eq!(trigger.cooldown_remaining(6), 3);
        assert!(!trigger.is_ready(8));
        assert!(trigger.is_ready(9));
    }

    #[test]
    fn conditions_read_the_context() {
        let ctx = calm();
        assert!(TriggerCondition::SparseNpcs { below: 2 }.holds(&ctx));
        assert!(TriggerCondition::EmptyLocation.holds(&ctx));
        assert!(!TriggerCondition::TurnInterval { every: 10 }.holds(&ctx));
        assert!(!TriggerCondition::TensionAtLeast { threshold: 0.5 }.holds(&ctx));
        let tenth = PacingContext { turn: 10, ..calm() };
        assert!(TriggerCondition::TurnInterval { every: 10 }.holds(&tenth));
    }

    #[test]
    fn escalation_scores_zero_when_calm() {
        let triggers = default_triggers();
        let escalation = triggers.iter().find(|t| t.name == "escalation").expect("escalation");
        assert_eq!(escalation.score(&calm()), 0.0);
        assert!(triggers[0].score(&calm()) > 0.0);
    }

    #[test]
    fn generated_players_become_npcs() {
        let descriptor = EntityDescriptor {
            name: "Stranger".into(),
            kind: EntityKind::Player,
            disposition: Disposition::Neutral,
            description: String::new(),
            hp: Some(8),
            stats: BTreeMap::new(),
            inventory: BTreeMap::new(),
        };
        let entity = descriptor.into_entity(EntityId::new("stranger_1"), LocationId::new("square"));
        assert_eq!(entity.kind, EntityKind::Npc);
        assert_eq!(entity.hp().map(|hp| hp.max()), Some(8));
    }
}
