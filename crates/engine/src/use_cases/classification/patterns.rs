//! Fixed-priority pattern table for player input.
//!
//! Order matters: specific patterns come before greedy ones like `look` and
//! `search`. First match wins.

use regex_lite::{Captures, Regex};
use std::sync::LazyLock;

use chronicle_domain::{ActionDescriptor, ActionType, MetaCommand};

/// What a matching pattern produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternMatch {
    Meta(MetaCommand),
    Action(ActionDescriptor),
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    Inventory,
    Character,
    Help,
    Snapshots,
    Rewind,
    Quit,
    Move,
    Direction,
    /// `verb target`; the target also names the item for item actions
    Targeted(ActionType),
    Cast,
    Give,
    Rest,
    Bare(ActionType),
    Look,
    Search,
}

static PATTERNS: LazyLock<Vec<(Rule, Regex)>> = LazyLock::new(|| {
    let table: &[(Rule, &str)] = &[
        // Meta commands
        (
            Rule::Inventory,
            r"^(?:inventory|items|bag|backpack|i|(?:look|check|open|show|view)\s+(?:my\s+)?(?:inventory|bag|backpack|pack|items)|what\s+(?:do\s+i\s+have|am\s+i\s+carrying))$",
        ),
        (
            Rule::Character,
            r"^(?:character|stats|sheet|status|char|(?:show|view|check)\s+(?:my\s+)?(?:character|stats|sheet|status))$",
        ),
        (Rule::Help, r"^(?:help|\?|commands|how\s+to\s+play)$"),
        (Rule::Snapshots, r"^(?:snapshots|checkpoints|saves|timeline)$"),
        (
            Rule::Rewind,
            r"^(?:rewind|undo|go\s+back|time\s*travel)(?:\s+(?:to\s+)?(.+))?$",
        ),
        (Rule::Quit, r"^(?:quit|exit|q)$"),
        // Movement
        (Rule::Move, r"^(?:go|move|walk|head|travel)\s+(?:to\s+)?(.+)$"),
        (
            Rule::Direction,
            r"^(north|south|east|west|northeast|northwest|southeast|southwest|up|down|ne|nw|se|sw|n|s|e|w|u|d)$",
        ),
        // Actions
        (
            Rule::Targeted(ActionType::Attack),
            r"^(?:attack|hit|strike|fight|kill|stab|slash)\s+(.+)$",
        ),
        (
            Rule::Targeted(ActionType::Talk),
            r"^(?:can\s+i\s+|let\s+me\s+|i\s+want\s+to\s+)?(?:talk|speak|chat)\s+(?:to|with)\s+(.+?)[\s?.!]*$",
        ),
        (
            Rule::Targeted(ActionType::Equip),
            r"^(?:equip|wear|wield|put\s+on)\s+(.+)$",
        ),
        (
            Rule::Targeted(ActionType::Unequip),
            r"^(?:unequip|remove|take\s+off|doff)\s+(.+)$",
        ),
        (Rule::Targeted(ActionType::Buy), r"^(?:buy|purchase)\s+(.+)$"),
        (Rule::Targeted(ActionType::Sell), r"^sell\s+(.+)$"),
        (
            Rule::Targeted(ActionType::Craft),
            r"^(?:craft|brew|forge|cook|make)\s+(.+)$",
        ),
        (Rule::Cast, r"^cast\s+(.+?)(?:\s+(?:on|at|against)\s+(.+))?$"),
        (Rule::Give, r"^(?:give|gift|offer)\s+(.+?)(?:\s+to\s+(.+))?$"),
        (
            Rule::Targeted(ActionType::UseItem),
            r"^(?:use|drink|eat|consume|apply)\s+(.+)$",
        ),
        (Rule::Rest, r"^(?:rest|sleep|camp)(?:\s+(short|long))?$"),
        (Rule::Bare(ActionType::Dodge), r"^(?:dodge|evade)$"),
        (Rule::Bare(ActionType::Dash), r"^(?:dash|run|sprint)$"),
        (Rule::Bare(ActionType::Hide), r"^(?:hide|sneak)$"),
        (Rule::Bare(ActionType::Flee), r"^(?:flee|escape|retreat)$"),
        // Greedy patterns last
        (
            Rule::Look,
            r"^(?:look|examine|inspect|observe)(?:\s+(?:at|around)\s*)?(.*)$",
        ),
        (
            Rule::Search,
            r"^(?:search|investigate|check|look\s+for)(?:\s+(.+))?$",
        ),
    ];

    table
        .iter()
        .map(|(rule, pattern)| {
            let regex = Regex::new(&format!("(?i){pattern}")).expect("valid regex");
            (*rule, regex)
        })
        .collect()
});

/// Names the fallback classifier may answer with.
pub fn valid_action_names() -> Vec<String> {
    ActionType::all()
        .iter()
        .map(|a| a.name().to_string())
        .collect()
}

/// Expand compass abbreviations ("ne" -> "northeast").
pub fn normalize_direction(direction: &str) -> String {
    let lower = direction.trim().to_lowercase();
    let full = match lower.as_str() {
        "n" => "north",
        "s" => "south",
        "e" => "east",
        "w" => "west",
        "ne" => "northeast",
        "nw" => "northwest",
        "se" => "southeast",
        "sw" => "southwest",
        "u" => "up",
        "d" => "down",
        other => other,
    };
    full.to_string()
}

/// Run the table against `input`. `None` means no pattern matched.
pub fn match_input(input: &str) -> Option<PatternMatch> {
    let text = input.trim();
    if text.is_empty() {
        return None;
    }
    PATTERNS
        .iter()
        .find_map(|(rule, regex)| regex.captures(text).map(|caps| build(*rule, &caps, input)))
}

fn group(caps: &Captures<'_>, index: usize) -> Option<String> {
    caps.get(index)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn build(rule: Rule, caps: &Captures<'_>, raw: &str) -> PatternMatch {
    let action = |kind: ActionType| ActionDescriptor::new(kind, raw);
    match rule {
        Rule::Inventory => PatternMatch::Meta(MetaCommand::Inventory),
        Rule::Character => PatternMatch::Meta(MetaCommand::Character),
        Rule::Help => PatternMatch::Meta(MetaCommand::Help),
        Rule::Snapshots => PatternMatch::Meta(MetaCommand::Snapshots),
        Rule::Rewind => PatternMatch::Meta(MetaCommand::Rewind(group(caps, 1))),
        Rule::Quit => PatternMatch::Meta(MetaCommand::Quit),
        Rule::Move | Rule::Direction => {
            let mut descriptor = action(ActionType::Move);
            if let Some(destination) = group(caps, 1) {
                descriptor = descriptor.with_target(normalize_direction(&destination));
            }
            PatternMatch::Action(descriptor)
        }
        Rule::Targeted(kind) => {
            let mut descriptor = action(kind);
            if let Some(target) = group(caps, 1) {
                if kind.rule_system() == chronicle_domain::RuleSystem::Inventory {
                    descriptor = descriptor.with_parameter("item", target.to_lowercase());
                } else {
                    descriptor = descriptor.with_target(target);
                }
            }
            PatternMatch::Action(descriptor)
        }
        Rule::Cast => {
            let mut descriptor = action(ActionType::Cast);
            if let Some(spell) = group(caps, 1) {
                descriptor = descriptor.with_parameter("spell", spell.to_lowercase());
            }
            if let Some(target) = group(caps, 2) {
                descriptor = descriptor.with_target(target);
            }
            PatternMatch::Action(descriptor)
        }
        Rule::Give => {
            let mut descriptor = action(ActionType::Give);
            if let Some(item) = group(caps, 1) {
                descriptor = descriptor.with_parameter("item", item.to_lowercase());
            }
            if let Some(recipient) = group(caps, 2) {
                descriptor = descriptor.with_target(recipient);
            }
            PatternMatch::Action(descriptor)
        }
        Rule::Rest => {
            let length = group(caps, 1)
                .map(|s| s.to_lowercase())
                .unwrap_or_else(|| "short".to_string());
            PatternMatch::Action(action(ActionType::Rest).with_parameter("rest", length))
        }
        Rule::Bare(kind) => PatternMatch::Action(action(kind)),
        Rule::Look | Rule::Search => {
            let kind = if matches!(rule, Rule::Look) {
                ActionType::Look
            } else {
                ActionType::Search
            };
            let mut descriptor = action(kind);
            if let Some(target) = group(caps, 1) {
                descriptor = descriptor.with_target(target);
            }
            PatternMatch::Action(descriptor)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(input: &str) -> ActionDescriptor {
        match match_input(input) {
            Some(PatternMatch::Action(a)) => a,
            other => panic!("expected an action for {input:?}, got {other:?}"),
        }
    }

    #[test]
    fn attack_captures_its_target() {
        let a = action("attack goblin");
        assert_eq!(a.action, ActionType::Attack);
        assert_eq!(a.primary_target(), Some("goblin"));
        assert_eq!(a.raw_input, "attack goblin");
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(action("ATTACK Goblin").primary_target(), Some("Goblin"));
        assert_eq!(match_input("Inventory"), Some(PatternMatch::Meta(MetaCommand::Inventory)));
    }

    #[test]
    fn directions_are_normalised() {
        assert_eq!(action("ne").primary_target(), Some("northeast"));
        assert_eq!(action("go to the old mill").primary_target(), Some("the old mill"));
        assert_eq!(action("walk s").primary_target(), Some("south"));
    }

    #[test]
    fn cast_and_give_split_their_arguments() {
        let cast = action("cast fire bolt on the troll");
        assert_eq!(cast.parameter("spell"), Some("fire bolt"));
        assert_eq!(cast.primary_target(), Some("the troll"));

        let give = action("give bread to Mara");
        assert_eq!(give.item(), Some("bread"));
        assert_eq!(give.primary_target(), Some("Mara"));
    }

    #[test]
    fn rest_defaults_to_short() {
        assert_eq!(action("rest").parameter("rest"), Some("short"));
        assert_eq!(action("sleep long").parameter("rest"), Some("long"));
    }

    #[test]
    fn item_actions_name_the_item() {
        assert_eq!(action("drink Healing Potion").item(), Some("healing potion"));
        assert_eq!(action("wield sword").action, ActionType::Equip);
    }

    #[test]
    fn meta_commands_win_over_actions() {
        assert_eq!(match_input("i"), Some(PatternMatch::Meta(MetaCommand::Inventory)));
        assert_eq!(match_input("rewind"), Some(PatternMatch::Meta(MetaCommand::Rewind(None))));
        assert_eq!(
            match_input("rewind to turn 20"),
            Some(PatternMatch::Meta(MetaCommand::Rewind(Some("turn 20".to_string()))))
        );
        assert_eq!(
            match_input("check my inventory"),
            Some(PatternMatch::Meta(MetaCommand::Inventory))
        );
    }

    #[test]
    fn greedy_patterns_come_last() {
        assert_eq!(action("look").action, ActionType::Look);
        assert_eq!(action("look at the statue").primary_target(), Some("the statue"));
        assert_eq!(action("search").action, ActionType::Search);
    }

    #[test]
    fn gibberish_matches_nothing() {
        assert_eq!(match_input("asdlkfj"), None);
        assert_eq!(match_input("   "), None);
    }

    #[test]
    fn the_fallback_sees_every_action_name() {
        let names = valid_action_names();
        assert!(names.contains(&"use_item".to_string()));
        assert!(names.contains(&"attempt".to_string()));
    }
}
