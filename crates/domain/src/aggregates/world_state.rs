//! WorldState aggregate - the mutable half of a game session
//!
//! # Invariants
//!
//! - The player entity always exists.
//! - Every entity stands in a known location.
//! - Every bounded resource stays within `[min, max]` (enforced by
//!   [`BoundedResource`]).
//! - An entity whose HP is depleted is not alive.
//!
//! The state is never edited in place by callers. [`WorldState::apply_delta`]
//! and [`WorldState::apply_turn`] build a new state from a working copy, so a
//! failed delta leaves the original untouched. Ordered maps keep the serialized
//! form canonical, which is what makes snapshot comparison bit-for-bit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entities::{Entity, EntityKind, Location};
use crate::error::DomainError;
use crate::ids::{EntityId, LocationId, RegionId};
use crate::value_objects::{
    AppliedDelta, BoundedResource, ClampNote, ResourceKind, StateChange, StateDelta,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    /// Number of accepted turns so far
    turn: u32,
    player_id: EntityId,
    entities: BTreeMap<EntityId, Entity>,
    locations: BTreeMap<LocationId, Location>,
    #[serde(default)]
    flags: BTreeMap<String, String>,
}

impl WorldState {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Create a world at turn zero. The player must stand in one of the given
    /// locations.
    pub fn new(player: Entity, locations: Vec<Location>) -> Result<Self, DomainError> {
        if player.kind != EntityKind::Player {
            return Err(DomainError::validation(format!(
                "{} is not a player entity",
                player.id
            )));
        }
        let locations: BTreeMap<LocationId, Location> = locations
            .into_iter()
            .map(|location| (location.id.clone(), location))
            .collect();
        if !locations.contains_key(&player.location) {
            return Err(DomainError::not_found("Location", player.location.as_str()));
        }
        let player_id = player.id.clone();
        let mut entities = BTreeMap::new();
        entities.insert(player_id.clone(), player);
        Ok(Self {
            turn: 0,
            player_id,
            entities,
            locations,
            flags: BTreeMap::new(),
        })
    }

    /// Add a pre-existing entity while building the starting world.
    pub fn with_entity(mut self, entity: Entity) -> Result<Self, DomainError> {
        self.insert_entity(entity)?;
        Ok(self)
    }

    pub fn with_flag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.flags.insert(key.into(), value.into());
        self
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn player_id(&self) -> &EntityId {
        &self.player_id
    }

    pub fn player(&self) -> Result<&Entity, DomainError> {
        self.entity(&self.player_id)
            .ok_or_else(|| DomainError::not_found("Entity", self.player_id.as_str()))
    }

    pub fn player_location(&self) -> Result<&LocationId, DomainError> {
        self.player().map(|player| &player.location)
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entities_at<'a>(&'a self, location: &'a LocationId) -> impl Iterator<Item = &'a Entity> {
        self.entities.values().filter(move |e| &e.location == location)
    }

    /// Living entities at `location` other than the player.
    pub fn others_alive_at<'a>(
        &'a self,
        location: &'a LocationId,
    ) -> impl Iterator<Item = &'a Entity> {
        self.entities_at(location)
            .filter(move |e| e.alive && e.id != self.player_id)
    }

    /// Find an entity at `location` by id or name.
    pub fn find_at<'a>(&'a self, location: &'a LocationId, reference: &str) -> Option<&'a Entity> {
        self.entities_at(location).find(|e| e.answers_to(reference))
    }

    pub fn location(&self, id: &LocationId) -> Option<&Location> {
        self.locations.get(id)
    }

    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    pub fn region_of(&self, location: &LocationId) -> Option<&RegionId> {
        self.location(location).map(|l| &l.region)
    }

    pub fn flag(&self, key: &str) -> Option<&str> {
        self.flags.get(key).map(String::as_str)
    }

    pub fn flags(&self) -> &BTreeMap<String, String> {
        &self.flags
    }

    // =========================================================================
    // Delta application
    // =========================================================================

    /// Apply `delta` to a working copy and return it with the post-clamp
    /// record of what changed. The turn counter is not advanced.
    pub fn apply_delta(
        &self,
        delta: &StateDelta,
    ) -> Result<(WorldState, AppliedDelta), DomainError> {
        let mut next = self.clone();
        let mut applied = AppliedDelta::default();
        for change in delta.iter() {
            next.apply_change(change, &mut applied)?;
        }
        Ok((next, applied))
    }

    /// Apply the delta of an accepted turn and advance the turn counter.
    pub fn apply_turn(
        &self,
        delta: &StateDelta,
    ) -> Result<(WorldState, AppliedDelta), DomainError> {
        let (mut next, applied) = self.apply_delta(delta)?;
        next.turn = next.turn.saturating_add(1);
        Ok((next, applied))
    }

    fn apply_change(
        &mut self,
        change: &StateChange,
        applied: &mut AppliedDelta,
    ) -> Result<(), DomainError> {
        match change {
            StateChange::AdjustResource {
                entity,
                resource,
                amount,
            } => {
                let actual = self.resource_mut(entity, resource)?.adjust(*amount);
                if actual != *amount {
                    applied.clamps.push(ClampNote {
                        entity: entity.clone(),
                        resource: resource.clone(),
                        requested: *amount,
                        applied: actual,
                    });
                }
                applied.delta.push(StateChange::AdjustResource {
                    entity: entity.clone(),
                    resource: resource.clone(),
                    amount: actual,
                });
                self.derive_death(entity, resource, applied);
            }
            StateChange::SetResource {
                entity,
                resource,
                value,
            } => {
                let pool = self.resource_mut(entity, resource)?;
                let before = pool.current();
                let stored = pool.set(*value);
                if stored != *value {
                    applied.clamps.push(ClampNote {
                        entity: entity.clone(),
                        resource: resource.clone(),
                        requested: value.saturating_sub(before),
                        applied: stored - before,
                    });
                }
                applied.delta.push(StateChange::SetResource {
                    entity: entity.clone(),
                    resource: resource.clone(),
                    value: stored,
                });
                self.derive_death(entity, resource, applied);
            }
            StateChange::AddCondition { entity, condition } => {
                self.entity_mut(entity)?.conditions.insert(condition.clone());
                applied.delta.push(change.clone());
            }
            StateChange::RemoveCondition { entity, condition } => {
                self.entity_mut(entity)?.conditions.remove(condition);
                applied.delta.push(change.clone());
            }
            StateChange::AddItem {
                entity,
                item,
                quantity,
            } => {
                if *quantity == 0 {
                    return Err(DomainError::validation(format!(
                        "Cannot add zero of {}",
                        item
                    )));
                }
                let holder = self.entity_mut(entity)?;
                let held = holder.inventory.entry(item.clone()).or_insert(0);
                *held = held.saturating_add(*quantity);
                applied.delta.push(change.clone());
            }
            StateChange::RemoveItem {
                entity,
                item,
                quantity,
            } => {
                let holder = self.entity_mut(entity)?;
                let held = holder.quantity_of(item);
                if held < *quantity {
                    return Err(DomainError::constraint(format!(
                        "{} holds {} of {}, cannot remove {}",
                        entity, held, item, quantity
                    )));
                }
                if held == *quantity {
                    holder.inventory.remove(item);
                    holder.equipped.remove(item);
                } else {
                    holder.inventory.insert(item.clone(), held - quantity);
                }
                applied.delta.push(change.clone());
            }
            StateChange::Equip { entity, item } => {
                let holder = self.entity_mut(entity)?;
                if !holder.has_item(item) {
                    return Err(DomainError::constraint(format!(
                        "{} does not hold {}",
                        entity, item
                    )));
                }
                holder.equipped.insert(item.clone());
                applied.delta.push(change.clone());
            }
            StateChange::Unequip { entity, item } => {
                if !self.entity_mut(entity)?.equipped.remove(item) {
                    return Err(DomainError::constraint(format!(
                        "{} has not equipped {}",
                        entity, item
                    )));
                }
                applied.delta.push(change.clone());
            }
            StateChange::MoveEntity { entity, to } => {
                if !self.locations.contains_key(to) {
                    return Err(DomainError::not_found("Location", to.as_str()));
                }
                self.entity_mut(entity)?.location = to.clone();
                applied.delta.push(change.clone());
            }
            StateChange::SetFlag { key, value } => {
                self.flags.insert(key.clone(), value.clone());
                applied.delta.push(change.clone());
            }
            StateChange::SpawnEntity { entity } => {
                self.insert_entity(entity.as_ref().clone())?;
                applied.delta.push(change.clone());
            }
            StateChange::SetAlive { entity, alive } => {
                self.entity_mut(entity)?.alive = *alive;
                applied.delta.push(change.clone());
            }
        }
        Ok(())
    }

    fn insert_entity(&mut self, entity: Entity) -> Result<(), DomainError> {
        if self.entities.contains_key(&entity.id) {
            return Err(DomainError::constraint(format!(
                "Entity {} already exists",
                entity.id
            )));
        }
        if !self.locations.contains_key(&entity.location) {
            return Err(DomainError::not_found("Location", entity.location.as_str()));
        }
        self.entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    /// Depleted HP kills, in the same application that depleted it.
    fn derive_death(&mut self, id: &EntityId, resource: &ResourceKind, applied: &mut AppliedDelta) {
        if *resource != ResourceKind::Hp {
            return;
        }
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };
        let depleted = entity.hp().is_some_and(BoundedResource::is_depleted);
        if depleted && entity.alive {
            entity.alive = false;
            applied.delta.push(StateChange::SetAlive {
                entity: id.clone(),
                alive: false,
            });
            applied.deaths.push(id.clone());
        }
    }

    fn entity_mut(&mut self, id: &EntityId) -> Result<&mut Entity, DomainError> {
        self.entities
            .get_mut(id)
            .ok_or_else(|| DomainError::not_found("Entity", id.as_str()))
    }

    fn resource_mut(
        &mut self,
        id: &EntityId,
        resource: &ResourceKind,
    ) -> Result<&mut BoundedResource, DomainError> {
        self.entity_mut(id)?
            .resources
            .get_mut(resource)
            .ok_or_else(|| DomainError::not_found("Resource", format!("{}.{}", id, resource)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Disposition, LocationKind};

    fn world() -> WorldState {
        let player = Entity::new("player", "Aria", EntityKind::Player, "forest_path")
            .with_hp(20)
            .with_item("potion", 2);
        let goblin = Entity::new("goblin_1", "Goblin", EntityKind::Creature, "forest_path")
            .with_disposition(Disposition::Hostile)
            .with_hp(14);
        WorldState::new(
            player,
            vec![
                Location::new("forest_path", "Forest Path", "greenwood", LocationKind::Wilderness),
                Location::new("village", "Village", "vale", LocationKind::Settlement),
            ],
        )
        .and_then(|w| w.with_entity(goblin))
        .expect("world")
    }

    fn hit(target: &str, amount: i64) -> StateChange {
        StateChange::AdjustResource {
            entity: EntityId::new(target),
            resource: ResourceKind::Hp,
            amount,
        }
    }

    #[test]
    fn damage_is_applied_to_a_copy() {
        let world = world();
        let (next, applied) = world
            .apply_turn(&StateDelta::new().with(hit("goblin_1", -6)))
            .expect("apply");

        let goblin = EntityId::new("goblin_1");
        assert_eq!(next.entity(&goblin).and_then(|e| e.hp()).map(|h| h.current()), Some(8));
        assert_eq!(world.entity(&goblin).and_then(|e| e.hp()).map(|h| h.current()), Some(14));
        assert_eq!(next.turn(), 1);
        assert!(applied.clamps.is_empty());
    }

    #[test]
    fn overkill_is_clamped_and_kills() {
        let (next, applied) = world()
            .apply_delta(&StateDelta::new().with(hit("goblin_1", -40)))
            .expect("apply");

        let goblin = next.entity(&EntityId::new("goblin_1")).expect("goblin");
        assert_eq!(goblin.hp().map(|h| h.current()), Some(0));
        assert!(!goblin.alive);
        assert_eq!(applied.deaths, vec![EntityId::new("goblin_1")]);
        assert_eq!(applied.clamps[0].applied, -14);
        assert_eq!(
            applied.delta.changes()[0],
            hit("goblin_1", -14),
            "applied delta records the post-clamp amount"
        );
    }

    #[test]
    fn replaying_the_applied_delta_reproduces_the_state() {
        let world = world();
        let delta = StateDelta::new()
            .with(hit("goblin_1", -40))
            .with(hit("player", 5))
            .with(StateChange::SetFlag {
                key: "quest:goblins".into(),
                value: "completed".into(),
            });
        let (live, applied) = world.apply_turn(&delta).expect("apply");
        let (replayed, _) = world.apply_turn(&applied.delta).expect("replay");
        assert_eq!(live, replayed);
    }

    #[test]
    fn a_failing_change_rejects_the_whole_delta() {
        let world = world();
        let delta = StateDelta::new()
            .with(hit("goblin_1", -6))
            .with(StateChange::RemoveItem {
                entity: EntityId::new("player"),
                item: "potion".into(),
                quantity: 3,
            });
        assert!(matches!(
            world.apply_delta(&delta),
            Err(DomainError::Constraint(_))
        ));
    }

    #[test]
    fn unknown_targets_are_not_found() {
        let world = world();
        assert!(matches!(
            world.apply_delta(&StateDelta::new().with(hit("dragon", -1))),
            Err(DomainError::NotFound { .. })
        ));
        let walk = StateChange::MoveEntity {
            entity: EntityId::new("player"),
            to: LocationId::new("moon"),
        };
        assert!(world.apply_delta(&StateDelta::new().with(walk)).is_err());
    }

    #[test]
    fn spawning_a_duplicate_id_fails() {
        let world = world();
        let twin = Entity::new("goblin_1", "Goblin", EntityKind::Creature, "forest_path");
        let spawn = StateChange::SpawnEntity {
            entity: Box::new(twin),
        };
        assert!(world.apply_delta(&StateDelta::new().with(spawn)).is_err());
    }

    #[test]
    fn removing_the_last_item_drops_it_from_inventory() {
        let world = world();
        let drink = StateChange::RemoveItem {
            entity: EntityId::new("player"),
            item: "potion".into(),
            quantity: 2,
        };
        let (next, _) = world.apply_delta(&StateDelta::new().with(drink)).expect("apply");
        assert!(!next.player().expect("player").inventory.contains_key("potion"));
    }

    #[test]
    fn serialization_is_canonical() {
        let a = serde_json::to_string(&world()).expect("serialize");
        let b = serde_json::to_string(&world()).expect("serialize");
        assert_eq!(a, b);
        let back: WorldState = serde_json::from_str(&a).expect("parse");
        assert_eq!(back, world());
    }

    #[test]
    fn player_must_stand_somewhere_known() {
        let player = Entity::new("player", "Aria", EntityKind::Player, "nowhere");
        assert!(WorldState::new(player, vec![]).is_err());
    }
}
