//! Spellcasting. Every cast spends a spell slot.

use chronicle_domain::{
    ActionDescriptor, ActionType, DiceFormula, Entity, ResourceKind, StateChange, StateDelta,
    WorldState,
};

use super::{present, Dice, Proposal, RuleRejection};

const SPELL_SAVE_BASE: i64 = 10;

fn is_healing(spell: &str) -> bool {
    ["heal", "cure", "mend", "restor"]
        .iter()
        .any(|word| spell.contains(word))
}

pub(super) fn propose(
    action: &ActionDescriptor,
    actor: &Entity,
    state: &WorldState,
    dice: &mut Dice,
) -> Result<Proposal, RuleRejection> {
    if action.action != ActionType::Cast {
        return Err(RuleRejection::new(format!(
            "{} is not a spell",
            action.action
        )));
    }
    let spell = action
        .parameter("spell")
        .ok_or_else(|| RuleRejection::new("Cast what?"))?;
    let target = match action.primary_target() {
        Some(reference) => Some(
            present(state, actor, reference)
                .ok_or_else(|| RuleRejection::new(format!("There is no {reference} here.")))?,
        ),
        None => None,
    };

    let mut delta = StateDelta::new().with(StateChange::AdjustResource {
        entity: actor.id.clone(),
        resource: ResourceKind::SpellSlots,
        amount: -1,
    });
    let power = actor.stat("spell").clamp(-10, 10) as i32;

    if is_healing(spell) {
        let recipient = target.unwrap_or(actor);
        let formula = DiceFormula {
            count: 1,
            sides: 8,
            modifier: power,
        };
        let healed = dice.roll(spell, &formula).total.max(0);
        if recipient.hp().is_some() {
            delta.push(StateChange::AdjustResource {
                entity: recipient.id.clone(),
                resource: ResourceKind::Hp,
                amount: i64::from(healed),
            });
        }
        return Ok(Proposal::success(
            delta,
            format!("Your {spell} restores {healed} HP to {}.", recipient.name),
        ));
    }

    let Some(target) = target.filter(|t| t.hp().is_some()) else {
        return Ok(Proposal::success(
            delta,
            format!("You cast {spell}. The air crackles, then stills."),
        ));
    };

    let formula = DiceFormula {
        count: 2,
        sides: 6,
        modifier: power,
    };
    let damage = dice.roll(spell, &formula).total.max(0);
    let save = dice.check("save", target.stat("wisdom"), Default::default());
    let dc = SPELL_SAVE_BASE + i64::from(power);
    let dealt = if i64::from(save.total) >= dc { damage / 2 } else { damage };
    delta.push(StateChange::AdjustResource {
        entity: target.id.clone(),
        resource: ResourceKind::Hp,
        amount: -i64::from(dealt),
    });
    Ok(Proposal::success(
        delta,
        format!("Your {spell} strikes {} for {dealt} damage.", target.name),
    ))
}
