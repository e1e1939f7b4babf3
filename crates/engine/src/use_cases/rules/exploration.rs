//! Movement, looking around, searching and hiding.

use chronicle_domain::{
    ActionDescriptor, ActionType, Condition, Entity, LocationId, StateChange, StateDelta,
    WorldState,
};

use super::{strip_article, Dice, Proposal, RuleRejection};

const SEARCH_DC: i64 = 12;
const HIDE_DC: i64 = 10;

/// Flag naming an item hidden at a location, `cache:<location id>`.
pub(crate) fn cache_flag(location: &LocationId) -> String {
    format!("cache:{}", location)
}

pub(super) fn propose(
    action: &ActionDescriptor,
    actor: &Entity,
    state: &WorldState,
    dice: &mut Dice,
) -> Result<Proposal, RuleRejection> {
    match action.action {
        ActionType::Move => travel(action, actor, state),
        ActionType::Look => Ok(look(action, actor, state)),
        ActionType::Search => Ok(search(actor, state, dice)),
        ActionType::Hide => Ok(hide(actor, state, dice)),
        other => Err(RuleRejection::new(format!(
            "{other} is not an exploration action"
        ))),
    }
}

/// Resolve a destination by exit label, then by the name or id of a
/// neighbouring location.
pub(crate) fn resolve_exit<'a>(
    state: &'a WorldState,
    from: &LocationId,
    destination: &str,
) -> Option<&'a LocationId> {
    let here = state.location(from)?;
    let wanted = strip_article(destination).to_lowercase();
    here.exit(&wanted).or_else(|| {
        here.exits.values().find(|id| {
            id.as_str().eq_ignore_ascii_case(&wanted)
                || state
                    .location(id)
                    .is_some_and(|l| l.name.to_lowercase() == wanted)
        })
    })
}

fn travel(
    action: &ActionDescriptor,
    actor: &Entity,
    state: &WorldState,
) -> Result<Proposal, RuleRejection> {
    let destination = action
        .primary_target()
        .ok_or_else(|| RuleRejection::new("Go where?"))?;
    let to = resolve_exit(state, &actor.location, destination)
        .ok_or_else(|| RuleRejection::new(format!("You can't go {destination} from here.")))?;
    let name = state
        .location(to)
        .map(|l| l.name.clone())
        .unwrap_or_else(|| to.to_string());

    let mut delta = StateDelta::new().with(StateChange::MoveEntity {
        entity: actor.id.clone(),
        to: to.clone(),
    });
    if actor.has_condition(&Condition::Hidden) {
        delta.push(StateChange::RemoveCondition {
            entity: actor.id.clone(),
            condition: Condition::Hidden,
        });
    }
    Ok(Proposal::success(delta, format!("You travel to {name}.")))
}

fn look(action: &ActionDescriptor, actor: &Entity, state: &WorldState) -> Proposal {
    if let Some(reference) = action.primary_target() {
        if let Some(entity) = super::present(state, actor, reference) {
            let description = if entity.description.is_empty() {
                format!("{} ({})", entity.name, entity.disposition)
            } else {
                entity.description.clone()
            };
            return Proposal::success(StateDelta::new(), description);
        }
    }

    let Some(here) = state.location(&actor.location) else {
        return Proposal::failure("You see nothing.");
    };
    let others: Vec<&str> = state
        .others_alive_at(&actor.location)
        .map(|e| e.name.as_str())
        .collect();
    let exits: Vec<&str> = here.exits.keys().map(String::as_str).collect();

    let mut summary = here.name.clone();
    if !here.description.is_empty() {
        summary.push_str(&format!(". {}", here.description));
    }
    if !others.is_empty() {
        summary.push_str(&format!(". Here: {}", others.join(", ")));
    }
    if !exits.is_empty() {
        summary.push_str(&format!(". Exits: {}", exits.join(", ")));
    }
    Proposal::success(StateDelta::new(), summary)
}

fn search(actor: &Entity, state: &WorldState, dice: &mut Dice) -> Proposal {
    let roll = dice.check("search", actor.stat("perception"), Default::default());
    if i64::from(roll.total) < SEARCH_DC {
        return Proposal::failure("You search but turn up nothing.");
    }

    let flag = cache_flag(&actor.location);
    match state.flag(&flag).filter(|item| !item.is_empty()) {
        Some(item) => Proposal::success(
            StateDelta::new()
                .with(StateChange::AddItem {
                    entity: actor.id.clone(),
                    item: item.to_string(),
                    quantity: 1,
                })
                .with(StateChange::SetFlag {
                    key: flag.clone(),
                    value: String::new(),
                }),
            format!("Hidden away you find {item}."),
        ),
        None => Proposal::success(StateDelta::new(), "You find nothing out of place."),
    }
}

fn hide(actor: &Entity, state: &WorldState, dice: &mut Dice) -> Proposal {
    let watchers = state
        .others_alive_at(&actor.location)
        .filter(|e| e.is_hostile())
        .count() as i64;
    let dc = HIDE_DC + 2 * watchers;
    let roll = dice.check("stealth", actor.stat("stealth"), Default::default());
    if i64::from(roll.total) < dc {
        return Proposal::failure("You fail to find cover.");
    }
    Proposal::success(
        StateDelta::new().with(StateChange::AddCondition {
            entity: actor.id.clone(),
            condition: Condition::Hidden,
        }),
        "You slip out of sight.",
    )
}
