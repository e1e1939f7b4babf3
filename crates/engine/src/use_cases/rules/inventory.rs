//! Equipment, trade, crafting, gifts and consumables.

use chronicle_domain::{
    ActionDescriptor, ActionType, DiceFormula, Entity, ResourceKind, StateChange, StateDelta,
    WorldState,
};

use super::{present, Dice, Proposal, RuleRejection};

const DEFAULT_PRICE: i64 = 10;
const CRAFT_DC: i64 = 12;

/// Price of `item`, from a `price:<item>` flag when the world sets one.
pub(crate) fn price_of(state: &WorldState, item: &str) -> i64 {
    state
        .flag(&format!("price:{item}"))
        .and_then(|p| p.parse::<i64>().ok())
        .filter(|p| *p >= 0)
        .unwrap_or(DEFAULT_PRICE)
}

pub(super) fn propose(
    action: &ActionDescriptor,
    actor: &Entity,
    state: &WorldState,
    dice: &mut Dice,
) -> Result<Proposal, RuleRejection> {
    let item = action
        .item()
        .or_else(|| action.primary_target())
        .map(str::to_lowercase)
        .ok_or_else(|| RuleRejection::new(format!("{} what?", capitalize(action.action.name()))))?;

    match action.action {
        ActionType::Equip => Ok(Proposal::success(
            StateDelta::new().with(StateChange::Equip {
                entity: actor.id.clone(),
                item: item.clone(),
            }),
            format!("You equip the {item}."),
        )),
        ActionType::Unequip => {
            if !actor.equipped.contains(&item) {
                return Err(RuleRejection::new(format!("You are not using a {item}.")));
            }
            Ok(Proposal::success(
                StateDelta::new().with(StateChange::Unequip {
                    entity: actor.id.clone(),
                    item: item.clone(),
                }),
                format!("You put away the {item}."),
            ))
        }
        ActionType::Buy => buy(actor, state, &item),
        ActionType::Sell => sell(actor, state, &item),
        ActionType::Craft => Ok(craft(actor, dice, &item)),
        ActionType::Give => give(action, actor, state, &item),
        ActionType::UseItem => Ok(use_item(actor, dice, &item)),
        other => Err(RuleRejection::new(format!(
            "{other} is not an inventory action"
        ))),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn trader<'a>(actor: &'a Entity, state: &'a WorldState) -> Result<&'a Entity, RuleRejection> {
    state
        .others_alive_at(&actor.location)
        .find(|e| e.is_npc() && !e.is_hostile())
        .ok_or_else(|| RuleRejection::new("There is no one here to trade with."))
}

fn buy(actor: &Entity, state: &WorldState, item: &str) -> Result<Proposal, RuleRejection> {
    let seller = trader(actor, state)?;
    let price = price_of(state, item);
    let gold = actor
        .resource(&ResourceKind::Gold)
        .ok_or_else(|| RuleRejection::new("You have no purse."))?;
    if gold.current() < price {
        return Err(RuleRejection::new(format!(
            "The {item} costs {price} gold; you have {}.",
            gold.current()
        )));
    }
    Ok(Proposal::success(
        StateDelta::new()
            .with(StateChange::AdjustResource {
                entity: actor.id.clone(),
                resource: ResourceKind::Gold,
                amount: -price,
            })
            .with(StateChange::AddItem {
                entity: actor.id.clone(),
                item: item.to_string(),
                quantity: 1,
            }),
        format!("{} sells you the {item} for {price} gold.", seller.name),
    ))
}

fn sell(actor: &Entity, state: &WorldState, item: &str) -> Result<Proposal, RuleRejection> {
    let buyer = trader(actor, state)?;
    if actor.resource(&ResourceKind::Gold).is_none() {
        return Err(RuleRejection::new("You have no purse."));
    }
    let price = price_of(state, item) / 2;
    Ok(Proposal::success(
        StateDelta::new()
            .with(StateChange::RemoveItem {
                entity: actor.id.clone(),
                item: item.to_string(),
                quantity: 1,
            })
            .with(StateChange::AdjustResource {
                entity: actor.id.clone(),
                resource: ResourceKind::Gold,
                amount: price,
            }),
        format!("{} buys the {item} for {price} gold.", buyer.name),
    ))
}

fn craft(actor: &Entity, dice: &mut Dice, item: &str) -> Proposal {
    let roll = dice.check("crafting", actor.stat("crafting"), Default::default());
    if i64::from(roll.total) < CRAFT_DC {
        return Proposal::failure(format!("Your attempt to make a {item} comes to nothing."));
    }
    Proposal::success(
        StateDelta::new().with(StateChange::AddItem {
            entity: actor.id.clone(),
            item: item.to_string(),
            quantity: 1,
        }),
        format!("You craft a {item}."),
    )
}

fn give(
    action: &ActionDescriptor,
    actor: &Entity,
    state: &WorldState,
    item: &str,
) -> Result<Proposal, RuleRejection> {
    let reference = action
        .primary_target()
        .ok_or_else(|| RuleRejection::new(format!("Give the {item} to whom?")))?;
    let recipient = present(state, actor, reference)
        .ok_or_else(|| RuleRejection::new(format!("There is no {reference} here.")))?;
    Ok(Proposal::success(
        StateDelta::new()
            .with(StateChange::RemoveItem {
                entity: actor.id.clone(),
                item: item.to_string(),
                quantity: 1,
            })
            .with(StateChange::AddItem {
                entity: recipient.id.clone(),
                item: item.to_string(),
                quantity: 1,
            }),
        format!("You give the {item} to {}.", recipient.name),
    ))
}

fn use_item(actor: &Entity, dice: &mut Dice, item: &str) -> Proposal {
    let healing = if item.contains("potion") {
        Some(DiceFormula {
            count: 2,
            sides: 4,
            modifier: 2,
        })
    } else if ["ration", "bread", "apple", "food"]
        .iter()
        .any(|food| item.contains(food))
    {
        Some(DiceFormula::flat(1))
    } else {
        None
    };

    let Some(formula) = healing else {
        return Proposal::success(
            StateDelta::new(),
            format!("You use the {item}. Nothing happens."),
        );
    };

    let mut delta = StateDelta::new().with(StateChange::RemoveItem {
        entity: actor.id.clone(),
        item: item.to_string(),
        quantity: 1,
    });
    let healed = dice.roll(item, &formula).total.max(0);
    if actor.hp().is_some() {
        delta.push(StateChange::AdjustResource {
            entity: actor.id.clone(),
            resource: ResourceKind::Hp,
            amount: i64::from(healed),
        });
    }
    Proposal::success(delta, format!("You consume the {item} and recover {healed} HP."))
}
