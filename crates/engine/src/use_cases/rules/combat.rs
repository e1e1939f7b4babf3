//! Attack, dodge, dash and flee.

use chronicle_domain::{
    ActionDescriptor, ActionType, Condition, DiceFormula, Entity, ResourceKind, StateChange,
    StateDelta, WorldState,
};

use super::{present, Dice, Proposal, RuleRejection};

const DEFAULT_ARMOR_CLASS: i64 = 10;
const FLEE_DC: i64 = 10;

pub(super) fn propose(
    action: &ActionDescriptor,
    actor: &Entity,
    state: &WorldState,
    dice: &mut Dice,
) -> Result<Proposal, RuleRejection> {
    match action.action {
        ActionType::Attack => attack(action, actor, state, dice),
        ActionType::Dodge => Ok(Proposal::success(
            StateDelta::new().with(StateChange::AddCondition {
                entity: actor.id.clone(),
                condition: Condition::Dodging,
            }),
            "You take a defensive stance.",
        )),
        ActionType::Dash => Ok(Proposal::success(
            StateDelta::new(),
            "You put on a burst of speed.",
        )),
        ActionType::Flee => flee(actor, state, dice),
        other => Err(RuleRejection::new(format!("{other} is not a combat action"))),
    }
}

/// Damage an attacker deals on a hit: `damage_dice` d `damage_die` plus
/// `damage`. Without declared dice it is 1d6, with `damage_dice` 0 it is flat.
fn damage_formula(attacker: &Entity) -> DiceFormula {
    let count = attacker.stats.get("damage_dice").copied().unwrap_or(1);
    let die = attacker.stats.get("damage_die").copied().unwrap_or(6);
    let bonus = attacker.stat("damage").clamp(-100, 100) as i32;
    let count = u8::try_from(count.clamp(0, 20)).unwrap_or(1);
    let die = u8::try_from(die.clamp(2, 100)).unwrap_or(6);
    DiceFormula::new(count, die, bonus).unwrap_or_else(|_| DiceFormula::flat(bonus))
}

fn attack(
    action: &ActionDescriptor,
    actor: &Entity,
    state: &WorldState,
    dice: &mut Dice,
) -> Result<Proposal, RuleRejection> {
    let reference = action
        .primary_target()
        .ok_or_else(|| RuleRejection::new("Attack whom?"))?;
    let target = present(state, actor, reference)
        .ok_or_else(|| RuleRejection::new(format!("There is no {reference} here to attack.")))?;
    if target.hp().is_none() {
        return Err(RuleRejection::new(format!("{} cannot be harmed.", target.name)));
    }

    let armor = target.stats.get("ac").copied().unwrap_or(DEFAULT_ARMOR_CLASS);
    let roll = dice.check("attack", actor.stat("attack"), action.roll_mode);
    if i64::from(roll.total) < armor {
        return Ok(Proposal::failure(format!(
            "You swing at {} and miss ({} vs AC {}).",
            target.name, roll.total, armor
        )));
    }

    let damage = dice.roll("damage", &damage_formula(actor)).total.max(0);
    let mut delta = StateDelta::new().with(StateChange::AdjustResource {
        entity: target.id.clone(),
        resource: ResourceKind::Hp,
        amount: -i64::from(damage),
    });
    if target.has_condition(&Condition::Dodging) {
        delta.push(StateChange::RemoveCondition {
            entity: target.id.clone(),
            condition: Condition::Dodging,
        });
    }
    Ok(Proposal::success(
        delta,
        format!(
            "You hit {} for {} damage ({} vs AC {}).",
            target.name, damage, roll.total, armor
        ),
    ))
}

fn flee(actor: &Entity, state: &WorldState, dice: &mut Dice) -> Result<Proposal, RuleRejection> {
    let here = state
        .location(&actor.location)
        .ok_or_else(|| RuleRejection::new("You are nowhere."))?;
    let (label, destination) = here
        .exits
        .iter()
        .next()
        .ok_or_else(|| RuleRejection::new("There is nowhere to run."))?;

    let hostiles = state
        .others_alive_at(&actor.location)
        .filter(|e| e.is_hostile())
        .count();
    let move_away = StateDelta::new().with(StateChange::MoveEntity {
        entity: actor.id.clone(),
        to: destination.clone(),
    });
    if hostiles == 0 {
        return Ok(Proposal::success(move_away, format!("You hurry off {label}.")));
    }

    let roll = dice.check("escape", actor.stat("dexterity"), Default::default());
    if i64::from(roll.total) >= FLEE_DC {
        Ok(Proposal::success(
            move_away,
            format!("You break away and flee {label}."),
        ))
    } else {
        Ok(Proposal::failure("You try to flee but are cut off."))
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{goblin, world};
    use super::*;
    use chronicle_domain::{ClassificationResult, Disposition};

    use crate::use_cases::rules::RuleCalculator;

    #[test]
    fn a_sure_hit_deals_flat_damage() {
        let state = world().with_entity(goblin()).expect("goblin");
        let hero = state
            .player()
            .expect("hero")
            .clone()
            .with_stat("attack", 30)
            .with_stat("damage_dice", 0)
            .with_stat("damage", 6);
        let action =
            ActionDescriptor::new(ActionType::Attack, "attack goblin").with_target("goblin");
        let proposal = attack(&action, &hero, &state, &mut Dice::seeded(1)).expect("attack");
        assert!(proposal.succeeded);
        assert_eq!(
            proposal.delta.changes(),
            &[StateChange::AdjustResource {
                entity: "goblin".into(),
                resource: ResourceKind::Hp,
                amount: -6,
            }]
        );
    }

    #[test]
    fn an_impossible_hit_misses_without_a_delta() {
        let state = world()
            .with_entity(goblin().with_stat("ac", 99))
            .expect("goblin");
        let classified = ClassificationResult::from_pattern(
            ActionDescriptor::new(ActionType::Attack, "attack the goblin")
                .with_target("the goblin"),
        );
        let proposal = RuleCalculator::Combat
            .propose(&classified, &state, 3)
            .expect("attack");
        assert!(!proposal.succeeded);
        assert!(proposal.delta.is_empty());
        assert_eq!(proposal.dice.len(), 1);
    }

    #[test]
    fn attacking_someone_absent_is_refused() {
        let state = world();
        let classified = ClassificationResult::from_pattern(
            ActionDescriptor::new(ActionType::Attack, "attack dragon").with_target("dragon"),
        );
        assert!(RuleCalculator::Combat.propose(&classified, &state, 3).is_err());
    }

    #[test]
    fn fleeing_an_empty_room_always_works() {
        let state = world();
        let hero = state.player().expect("hero");
        let proposal = flee(hero, &state, &mut Dice::seeded(9)).expect("flee");
        assert!(proposal.succeeded);
        assert!(matches!(
            proposal.delta.changes(),
            [StateChange::MoveEntity { to, .. }] if to.as_str() == "gate"
        ));
    }

    #[test]
    fn flight_from_hostiles_needs_a_roll() {
        let state = world()
            .with_entity(goblin().with_disposition(Disposition::Hostile))
            .expect("goblin");
        let hero = state.player().expect("hero");
        let mut dice = Dice::seeded(9);
        flee(hero, &state, &mut dice).expect("flee");
        assert_eq!(dice.records().len(), 1);
    }
}
