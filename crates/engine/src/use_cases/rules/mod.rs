//! Rule calculators.
//!
//! One variant per [`RuleSystem`], chosen by the action's tag. Each is a pure
//! function of the action, a read-only view of the world and a seeded RNG, so
//! the same seed always proposes the same delta.

mod combat;
mod creative;
mod exploration;
mod inventory;
mod magic;
mod rest;
mod social;

pub(crate) use rest::is_long_rest;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use chronicle_domain::{
    ClassificationResult, DiceFormula, DiceRecord, DiceRollResult, Entity, RollMode, RuleSystem,
    StateDelta, WorldState,
};

/// A delta the calculator would like committed.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub delta: StateDelta,
    pub summary: String,
    pub dice: Vec<DiceRecord>,
    pub succeeded: bool,
}

impl Proposal {
    fn success(delta: StateDelta, summary: impl Into<String>) -> Self {
        Self {
            delta,
            summary: summary.into(),
            dice: Vec::new(),
            succeeded: true,
        }
    }

    fn failure(summary: impl Into<String>) -> Self {
        Self {
            delta: StateDelta::new(),
            summary: summary.into(),
            dice: Vec::new(),
            succeeded: false,
        }
    }

    fn with_dice(mut self, dice: Dice) -> Self {
        self.dice = dice.records;
        self
    }
}

/// An in-fiction refusal from the rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RuleRejection(pub String);

impl RuleRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCalculator {
    Combat,
    Exploration,
    Social,
    Rest,
    Inventory,
    Magic,
    Creative,
}

impl RuleCalculator {
    pub fn for_system(system: RuleSystem) -> Self {
        match system {
            RuleSystem::Combat => Self::Combat,
            RuleSystem::Exploration => Self::Exploration,
            RuleSystem::Social => Self::Social,
            RuleSystem::Rest => Self::Rest,
            RuleSystem::Inventory => Self::Inventory,
            RuleSystem::Magic => Self::Magic,
            RuleSystem::Creative => Self::Creative,
        }
    }

    /// Propose the outcome of `classified` for the player, rolling from `seed`.
    pub fn propose(
        &self,
        classified: &ClassificationResult,
        state: &WorldState,
        seed: u64,
    ) -> Result<Proposal, RuleRejection> {
        let actor = state
            .player()
            .map_err(|e| RuleRejection::new(e.to_string()))?;
        let mut dice = Dice::seeded(seed);
        let action = &classified.action;
        match self {
            Self::Combat => combat::propose(action, actor, state, &mut dice),
            Self::Exploration => exploration::propose(action, actor, state, &mut dice),
            Self::Social => social::propose(action, actor, state, &mut dice),
            Self::Rest => rest::propose(action, actor, state, &mut dice),
            Self::Inventory => inventory::propose(action, actor, state, &mut dice),
            Self::Magic => magic::propose(action, actor, state, &mut dice),
            Self::Creative => creative::propose(classified, actor, &mut dice),
        }
        .map(|proposal| proposal.with_dice(dice))
    }
}

/// Seeded dice that remember every roll for the mechanical summary.
pub(crate) struct Dice {
    rng: StdRng,
    records: Vec<DiceRecord>,
}

impl Dice {
    pub(crate) fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            records: Vec::new(),
        }
    }

    pub(crate) fn roll(&mut self, purpose: &str, formula: &DiceFormula) -> DiceRollResult {
        let rng = &mut self.rng;
        let result = formula.roll_with(|sides| rng.gen_range(1..=sides));
        self.records.push(DiceRecord::new(purpose, result.clone()));
        result
    }

    /// A d20 check with `modifier`; advantage keeps the better of two dice.
    pub(crate) fn check(&mut self, purpose: &str, modifier: i64, mode: RollMode) -> DiceRollResult {
        let formula = DiceFormula::d20();
        let rng = &mut self.rng;
        let first = formula.roll_with(|sides| rng.gen_range(1..=sides));
        let kept = match mode {
            RollMode::Normal => first,
            RollMode::Advantage | RollMode::Disadvantage => {
                let second = formula.roll_with(|sides| rng.gen_range(1..=sides));
                let better = second.total > first.total;
                if better == (mode == RollMode::Advantage) {
                    second
                } else {
                    first
                }
            }
        };
        let modifier = modifier.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        let result = DiceRollResult {
            total: kept.dice_total + modifier,
            formula: DiceFormula {
                modifier,
                ..kept.formula
            },
            ..kept
        };
        let purpose = match mode {
            RollMode::Normal => purpose.to_string(),
            RollMode::Advantage => format!("{purpose} (advantage)"),
            RollMode::Disadvantage => format!("{purpose} (disadvantage)"),
        };
        self.records.push(DiceRecord::new(purpose, result.clone()));
        result
    }

    #[cfg(test)]
    pub(crate) fn records(&self) -> &[DiceRecord] {
        &self.records
    }
}

/// Drop a leading article so "the goblin" finds "Goblin".
pub(crate) fn strip_article(reference: &str) -> &str {
    let trimmed = reference.trim();
    ["the ", "a ", "an "]
        .iter()
        .find_map(|article| {
            trimmed
                .get(..article.len())
                .filter(|head| head.eq_ignore_ascii_case(article))
                .map(|_| trimmed[article.len()..].trim_start())
        })
        .unwrap_or(trimmed)
}

/// A living entity at the actor's location that answers to `reference`.
pub(crate) fn present<'a>(
    state: &'a WorldState,
    actor: &'a Entity,
    reference: &str,
) -> Option<&'a Entity> {
    state
        .find_at(&actor.location, strip_article(reference))
        .filter(|e| e.alive && e.id != actor.id)
}


#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_domain::{ActionDescriptor, ActionType};

    #[test]
    fn each_system_has_a_calculator() {
        assert_eq!(RuleCalculator::for_system(RuleSystem::Combat), RuleCalculator::Combat);
        assert_eq!(RuleCalculator::for_system(RuleSystem::Creative), RuleCalculator::Creative);
    }

    #[test]
    fn same_seed_same_proposal() {
        let state = fixtures::world()
            .with_entity(fixtures::goblin())
            .expect("goblin");
        let classified = ClassificationResult::from_pattern(
            ActionDescriptor::new(ActionType::Attack, "attack goblin").with_target("goblin"),
        );
        let first = RuleCalculator::Combat.propose(&classified, &state, 42);
        let second = RuleCalculator::Combat.propose(&classified, &state, 42);
        assert_eq!(first, second);
    }

    #[test]
    fn checks_record_their_mode() {
        let mut dice = Dice::seeded(7);
        let result = dice.check("stealth", 3, RollMode::Advantage);
        assert_eq!(result.total, result.dice_total + 3);
        assert!((4..=23).contains(&result.total));
        assert_eq!(dice.records()[0].purpose, "stealth (advantage)");
    }

    #[test]
    fn articles_are_ignored_in_references() {
        assert_eq!(strip_article("the goblin"), "goblin");
        assert_eq!(strip_article("An apple"), "apple");
        assert_eq!(strip_article("theodore"), "theodore");
    }
}
