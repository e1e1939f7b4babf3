//! Entities - the player, NPCs and creatures that populate the world

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::Condition;
use crate::ids::{EntityId, LocationId};
use crate::value_objects::{BoundedResource, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Npc,
    Creature,
}

/// How an entity stands toward the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Friendly,
    #[default]
    Neutral,
    Hostile,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Friendly => f.write_str("friendly"),
            Self::Neutral => f.write_str("neutral"),
            Self::Hostile => f.write_str("hostile"),
        }
    }
}

/// Anything with a name, a place and resources.
///
/// Resources are [`BoundedResource`]s, so no mutation through this type can
/// push one outside its declared range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    #[serde(default)]
    pub disposition: Disposition,
    pub location: LocationId,
    #[serde(default)]
    pub resources: BTreeMap<ResourceKind, BoundedResource>,
    /// Numeric stats read by the rule calculators (`attack_bonus`, `armor_class`, ...)
    #[serde(default)]
    pub stats: BTreeMap<String, i64>,
    #[serde(default)]
    pub conditions: BTreeSet<Condition>,
    /// Item name to quantity held. Zero quantities are never stored.
    #[serde(default)]
    pub inventory: BTreeMap<String, u32>,
    #[serde(default)]
    pub equipped: BTreeSet<String>,
    #[serde(default = "default_alive")]
    pub alive: bool,
    #[serde(default)]
    pub description: String,
}

fn default_alive() -> bool {
    true
}

impl Entity {
    pub fn new(
        id: impl Into<EntityId>,
        name: impl Into<String>,
        kind: EntityKind,
        location: impl Into<LocationId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            disposition: Disposition::Neutral,
            location: location.into(),
            resources: BTreeMap::new(),
            stats: BTreeMap::new(),
            conditions: BTreeSet::new(),
            inventory: BTreeMap::new(),
            equipped: BTreeSet::new(),
            alive: true,
            description: String::new(),
        }
    }

    // =========================================================================
    // Builder methods
    // =========================================================================

    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    pub fn with_resource(mut self, kind: ResourceKind, resource: BoundedResource) -> Self {
        self.resources.insert(kind, resource);
        self
    }

    /// Full hit points at `max`.
    pub fn with_hp(self, max: i64) -> Self {
        self.with_resource(ResourceKind::Hp, BoundedResource::full(max))
    }

    pub fn with_stat(mut self, name: impl Into<String>, value: i64) -> Self {
        self.stats.insert(name.into(), value);
        self
    }

    pub fn with_item(mut self, item: impl Into<String>, quantity: u32) -> Self {
        if quantity > 0 {
            *self.inventory.entry(item.into()).or_insert(0) += quantity;
        }
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.insert(condition);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn resource(&self, kind: &ResourceKind) -> Option<&BoundedResource> {
        self.resources.get(kind)
    }

    pub fn hp(&self) -> Option<&BoundedResource> {
        self.resource(&ResourceKind::Hp)
    }

    /// Current over maximum HP, `None` without an HP pool.
    pub fn hp_ratio(&self) -> Option<f32> {
        self.hp()
            .filter(|hp| hp.max() > 0)
            .map(|hp| hp.current() as f32 / hp.max() as f32)
    }

    /// A stat value, zero when the entity does not declare it.
    pub fn stat(&self, name: &str) -> i64 {
        self.stats.get(name).copied().unwrap_or(0)
    }

    pub fn quantity_of(&self, item: &str) -> u32 {
        self.inventory.get(item).copied().unwrap_or(0)
    }

    pub fn has_item(&self, item: &str) -> bool {
        self.quantity_of(item) > 0
    }

    pub fn has_condition(&self, condition: &Condition) -> bool {
        self.conditions.contains(condition)
    }

    /// The first incapacitating condition, if any.
    pub fn incapacitation(&self) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.is_incapacitating())
    }

    pub fn is_hostile(&self) -> bool {
        self.disposition == Disposition::Hostile
    }

    pub fn is_npc(&self) -> bool {
        self.kind == EntityKind::Npc
    }

    /// Case-insensitive match against id or display name.
    pub fn answers_to(&self, reference: &str) -> bool {
        let reference = reference.trim().to_lowercase();
        !reference.is_empty()
            && (self.id.as_str().eq_ignore_ascii_case(&reference)
                || self.name.to_lowercase() == reference
                || self.name.to_lowercase().split_whitespace().any(|w| w == reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goblin() -> Entity {
        Entity::new("goblin_1", "Goblin Scout", EntityKind::Creature, "forest_path")
            .with_disposition(Disposition::Hostile)
            .with_hp(14)
    }

    #[test]
    fn builder_sets_full_hp() {
        let goblin = goblin();
        assert_eq!(goblin.hp().map(|hp| hp.current()), Some(14));
        assert!(goblin.is_hostile());
        assert!(goblin.alive);
    }

    #[test]
    fn answers_to_id_name_and_name_words() {
        let goblin = goblin();
        assert!(goblin.answers_to("goblin_1"));
        assert!(goblin.answers_to("Goblin Scout"));
        assert!(goblin.answers_to("goblin"));
        assert!(!goblin.answers_to("orc"));
        assert!(!goblin.answers_to(" "));
    }

    #[test]
    fn zero_quantity_items_are_not_stored() {
        let entity = goblin().with_item("rock", 0).with_item("dagger", 1);
        assert!(!entity.inventory.contains_key("rock"));
        assert!(entity.has_item("dagger"));
    }

    #[test]
    fn missing_fields_take_defaults_when_deserialized() {
        let json = r#"{"id":"rat","name":"Rat","kind":"creature","location":"cellar"}"#;
        let rat: Entity = serde_json::from_str(json).expect("parse");
        assert!(rat.alive);
        assert_eq!(rat.disposition, Disposition::Neutral);
        assert_eq!(rat.stat("attack_bonus"), 0);
    }
}
