//! Short and long rests.

use chronicle_domain::{
    ActionDescriptor, Condition, DiceFormula, Entity, ResourceKind, StateChange, StateDelta,
    WorldState,
};

use super::{Dice, Proposal, RuleRejection};

/// Whether `action` asks for a long rest.
pub(crate) fn is_long_rest(action: &ActionDescriptor) -> bool {
    action.parameter("rest") == Some("long")
}

pub(super) fn propose(
    action: &ActionDescriptor,
    actor: &Entity,
    state: &WorldState,
    dice: &mut Dice,
) -> Result<Proposal, RuleRejection> {
    if state
        .others_alive_at(&actor.location)
        .any(|e| e.is_hostile())
    {
        return Err(RuleRejection::new("You cannot rest with enemies nearby."));
    }

    if is_long_rest(action) {
        Ok(long_rest(actor))
    } else {
        Ok(short_rest(actor, dice))
    }
}

fn short_rest(actor: &Entity, dice: &mut Dice) -> Proposal {
    let Some(hp) = actor.hp() else {
        return Proposal::success(StateDelta::new(), "You catch your breath.");
    };
    let bonus = actor.stat("constitution").clamp(-10, 10) as i32;
    let formula = DiceFormula {
        count: 1,
        sides: 8,
        modifier: bonus,
    };
    let healed = i64::from(dice.roll("short rest", &formula).total.max(0));
    let healed = healed.min(hp.max() - hp.current());
    if healed <= 0 {
        return Proposal::success(StateDelta::new(), "You rest a while.");
    }
    Proposal::success(
        StateDelta::new().with(StateChange::AdjustResource {
            entity: actor.id.clone(),
            resource: ResourceKind::Hp,
            amount: healed,
        }),
        format!("You rest a while and recover {healed} HP."),
    )
}

fn long_rest(actor: &Entity) -> Proposal {
    let mut delta = StateDelta::new();
    for kind in [ResourceKind::Hp, ResourceKind::SpellSlots] {
        if let Some(pool) = actor.resource(&kind) {
            if pool.current() < pool.max() {
                delta.push(StateChange::SetResource {
                    entity: actor.id.clone(),
                    resource: kind,
                    value: pool.max(),
                });
            }
        }
    }
    for condition in [Condition::Poisoned, Condition::Frightened, Condition::Prone] {
        if actor.has_condition(&condition) {
            delta.push(StateChange::RemoveCondition {
                entity: actor.id.clone(),
                condition,
            });
        }
    }
    Proposal::success(delta, "You sleep through the night and wake restored.")
}
