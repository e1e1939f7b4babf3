//! Freeform attempts, resolved as a single check against the difficulty the
//! classification cascade attached.

use chronicle_domain::{ClassificationResult, DifficultyClass, Entity, StateChange, StateDelta};

use super::{Dice, Proposal, RuleRejection};

/// Flag recording the outcome of the latest freeform attempt.
pub(crate) const LAST_ATTEMPT_FLAG: &str = "last_attempt";

const NATURAL_MAX: i32 = 20;

pub(super) fn propose(
    classified: &ClassificationResult,
    actor: &Entity,
    dice: &mut Dice,
) -> Result<Proposal, RuleRejection> {
    let dc = classified.difficulty.unwrap_or(DifficultyClass::STANDARD);
    let modifier = actor.stats.values().copied().max().unwrap_or(0).clamp(0, 10);
    let roll = dice.check("attempt", modifier, classified.action.roll_mode);
    // A natural 20 lands even when the DC is beyond d20 + modifier.
    let natural_max = roll.dice_total == NATURAL_MAX;
    let succeeded = natural_max || i64::from(roll.total) >= i64::from(dc.value());

    let outcome = if succeeded { "success" } else { "failure" };
    let delta = StateDelta::new().with(StateChange::SetFlag {
        key: LAST_ATTEMPT_FLAG.to_string(),
        value: outcome.to_string(),
    });
    let summary = if natural_max {
        format!("You attempt it (natural 20 vs {dc}): {outcome}.")
    } else {
        format!("You attempt it ({} vs {}): {}.", roll.total, dc, outcome)
    };
    Ok(Proposal {
        delta,
        summary,
        dice: Vec::new(),
        succeeded,
    })
}
