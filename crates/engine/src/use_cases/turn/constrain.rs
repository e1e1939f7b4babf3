//! Legality checks run before any dice are rolled.

use chronicle_domain::{
    ActionType, ClassificationResult, Condition, ResourceKind, RollMode, WorldState,
};

use crate::use_cases::rules::{present, RuleRejection};

/// Check `classified` against the world. May downgrade the action (a
/// frightened attacker rolls at disadvantage) or refuse it outright.
pub fn constrain(
    mut classified: ClassificationResult,
    state: &WorldState,
) -> Result<ClassificationResult, RuleRejection> {
    let actor = state
        .player()
        .map_err(|e| RuleRejection::new(e.to_string()))?;
    if !actor.alive {
        return Err(RuleRejection::new("You are dead."));
    }
    if let Some(condition) = actor.incapacitation() {
        return Err(RuleRejection::new(format!("You cannot act while {condition}.")));
    }

    let action = &mut classified.action;

    if action.action.needs_present_target() {
        if let Some(reference) = action.primary_target() {
            if present(state, actor, reference).is_none() {
                return Err(RuleRejection::new(format!("There is no {reference} here.")));
            }
        }
    }

    if action.action.needs_held_item() {
        if let Some(item) = action.item() {
            let item = item.to_lowercase();
            if !actor.has_item(&item) {
                return Err(RuleRejection::new(format!("You don't have a {item}.")));
            }
        }
    }

    if action.action == ActionType::Cast {
        let slots = actor
            .resource(&ResourceKind::SpellSlots)
            .map(|pool| pool.current())
            .unwrap_or(0);
        if slots <= 0 {
            return Err(RuleRejection::new("You have no spell slots left."));
        }
    }

    if action.action == ActionType::Attack && actor.has_condition(&Condition::Frightened) {
        action.roll_mode = match action.roll_mode {
            RollMode::Advantage => RollMode::Normal,
            _ => RollMode::Disadvantage,
        };
    }

    Ok(classified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::rules::fixtures::{goblin, hero, world};
    use chronicle_domain::{ActionDescriptor, StateChange, StateDelta};

    fn pattern(action: ActionDescriptor) -> ClassificationResult {
        ClassificationResult::from_pattern(action)
    }

    fn with_condition(state: &WorldState, condition: Condition) -> WorldState {
        state
            .apply_delta(&StateDelta::new().with(StateChange::AddCondition {
                entity: hero().id,
                condition,
            }))
            .expect("condition")
            .0
    }

    #[test]
    fn absent_targets_are_refused() {
        let attack =
            ActionDescriptor::new(ActionType::Attack, "attack goblin").with_target("goblin");
        let err = constrain(pattern(attack.clone()), &world()).expect_err("no goblin");
        assert_eq!(err.0, "There is no goblin here.");

        let state = world().with_entity(goblin()).expect("goblin");
        assert!(constrain(pattern(attack), &state).is_ok());
    }

    #[test]
    fn items_must_be_held() {
        let drink = ActionDescriptor::new(ActionType::UseItem, "drink elixir")
            .with_parameter("item", "elixir");
        assert!(constrain(pattern(drink), &world()).is_err());

        let drink = ActionDescriptor::new(ActionType::UseItem, "drink potion")
            .with_parameter("item", "Healing Potion");
        assert!(constrain(pattern(drink), &world()).is_ok());
    }

    #[test]
    fn casting_needs_a_slot() {
        let state = world()
            .apply_delta(&StateDelta::new().with(StateChange::SetResource {
                entity: hero().id,
                resource: ResourceKind::SpellSlots,
                value: 0,
            }))
            .expect("drain")
            .0;
        let cast =
            ActionDescriptor::new(ActionType::Cast, "cast light").with_parameter("spell", "light");
        assert!(constrain(pattern(cast), &state).is_err());
    }

    #[test]
    fn incapacitated_actors_cannot_act() {
        let state = with_condition(&world(), Condition::Stunned);
        let look = ActionDescriptor::new(ActionType::Look, "look");
        assert!(constrain(pattern(look), &state).is_err());
    }

    #[test]
    fn fear_imposes_disadvantage_on_attacks() {
        let state = with_condition(
            &world().with_entity(goblin()).expect("goblin"),
            Condition::Frightened,
        );
        let attack =
            ActionDescriptor::new(ActionType::Attack, "attack goblin").with_target("goblin");
        let constrained = constrain(pattern(attack), &state).expect("still allowed");
        assert_eq!(constrained.action.roll_mode, RollMode::Disadvantage);
    }
}
