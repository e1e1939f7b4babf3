//! Conversation.

use chronicle_domain::{
    ActionDescriptor, ActionType, Disposition, Entity, StateChange, StateDelta, WorldState,
};

use super::{present, Dice, Proposal, RuleRejection};

const PERSUASION_DC: i64 = 10;
const HOSTILE_PENALTY: i64 = 5;

/// Flag set once the player has spoken with an entity, `met:<entity id>`.
pub(crate) fn met_flag(entity: &Entity) -> String {
    format!("met:{}", entity.id)
}

pub(super) fn propose(
    action: &ActionDescriptor,
    actor: &Entity,
    state: &WorldState,
    dice: &mut Dice,
) -> Result<Proposal, RuleRejection> {
    if action.action != ActionType::Talk {
        return Err(RuleRejection::new(format!(
            "{} is not a social action",
            action.action
        )));
    }
    let reference = action
        .primary_target()
        .ok_or_else(|| RuleRejection::new("Talk to whom?"))?;
    let listener = present(state, actor, reference)
        .ok_or_else(|| RuleRejection::new(format!("There is no {reference} here to talk to.")))?;

    let dc = match listener.disposition {
        Disposition::Hostile => PERSUASION_DC + HOSTILE_PENALTY,
        _ => PERSUASION_DC,
    };
    let roll = dice.check("persuasion", actor.stat("charisma"), action.roll_mode);
    let first_meeting = state.flag(&met_flag(listener)).is_none();

    let delta = if first_meeting {
        StateDelta::new().with(StateChange::SetFlag {
            key: met_flag(listener),
            value: state.turn().to_string(),
        })
    } else {
        StateDelta::new()
    };

    if i64::from(roll.total) >= dc {
        Ok(Proposal::success(
            delta,
            format!("{} hears you out.", listener.name),
        ))
    } else {
        Ok(Proposal {
            succeeded: false,
            ..Proposal::success(delta, format!("{} is unmoved.", listener.name))
        })
    }
}
