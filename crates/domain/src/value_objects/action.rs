//! Action vocabulary
//!
//! Every classified input resolves to an [`ActionDescriptor`] whose
//! [`ActionType`] selects exactly one [`RuleSystem`]. Meta commands are answered
//! outside the turn pipeline and never reach the ledger.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// Which rule calculator resolves an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSystem {
    Combat,
    Exploration,
    Social,
    Rest,
    Inventory,
    Magic,
    /// Freeform attempts resolved against a difficulty class
    Creative,
}

impl fmt::Display for RuleSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Combat => "combat",
            Self::Exploration => "exploration",
            Self::Social => "social",
            Self::Rest => "rest",
            Self::Inventory => "inventory",
            Self::Magic => "magic",
            Self::Creative => "creative",
        };
        f.write_str(name)
    }
}

/// In-game actions. Each one costs a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Move,
    Attack,
    Talk,
    Equip,
    Unequip,
    Buy,
    Sell,
    Craft,
    Cast,
    Give,
    UseItem,
    Rest,
    Dodge,
    Dash,
    Hide,
    Flee,
    Look,
    Search,
    /// Anything the cascade could not pin down; resolved as a creative check
    Attempt,
}

impl ActionType {
    pub fn all() -> &'static [ActionType] {
        &[
            ActionType::Move,
            ActionType::Attack,
            ActionType::Talk,
            ActionType::Equip,
            ActionType::Unequip,
            ActionType::Buy,
            ActionType::Sell,
            ActionType::Craft,
            ActionType::Cast,
            ActionType::Give,
            ActionType::UseItem,
            ActionType::Rest,
            ActionType::Dodge,
            ActionType::Dash,
            ActionType::Hide,
            ActionType::Flee,
            ActionType::Look,
            ActionType::Search,
            ActionType::Attempt,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Attack => "attack",
            Self::Talk => "talk",
            Self::Equip => "equip",
            Self::Unequip => "unequip",
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Craft => "craft",
            Self::Cast => "cast",
            Self::Give => "give",
            Self::UseItem => "use_item",
            Self::Rest => "rest",
            Self::Dodge => "dodge",
            Self::Dash => "dash",
            Self::Hide => "hide",
            Self::Flee => "flee",
            Self::Look => "look",
            Self::Search => "search",
            Self::Attempt => "attempt",
        }
    }

    pub fn rule_system(&self) -> RuleSystem {
        match self {
            Self::Attack | Self::Dodge | Self::Dash | Self::Flee => RuleSystem::Combat,
            Self::Move | Self::Look | Self::Search | Self::Hide => RuleSystem::Exploration,
            Self::Talk => RuleSystem::Social,
            Self::Rest => RuleSystem::Rest,
            Self::Equip
            | Self::Unequip
            | Self::Buy
            | Self::Sell
            | Self::Craft
            | Self::Give
            | Self::UseItem => RuleSystem::Inventory,
            Self::Cast => RuleSystem::Magic,
            Self::Attempt => RuleSystem::Creative,
        }
    }

    /// Actions whose first target must be an entity at the actor's location.
    pub fn needs_present_target(&self) -> bool {
        matches!(self, Self::Attack | Self::Talk | Self::Give)
    }

    /// Actions that consume or move an item the actor must already hold.
    pub fn needs_held_item(&self) -> bool {
        matches!(self, Self::UseItem | Self::Equip | Self::Sell | Self::Give)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        let alias = match normalized.as_str() {
            "use" => "use_item",
            "go" | "walk" | "travel" => "move",
            "speak" | "say" => "talk",
            "fight" | "strike" => "attack",
            other => other,
        };
        Self::all()
            .iter()
            .copied()
            .find(|action| action.name() == alias)
            .ok_or_else(|| DomainError::parse(format!("Unknown action type: {}", s)))
    }
}

/// Commands about the game rather than in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "argument", rename_all = "snake_case")]
pub enum MetaCommand {
    Inventory,
    Character,
    Help,
    Snapshots,
    /// Rewind to the named snapshot, or the latest one when `None`
    Rewind(Option<String>),
    Quit,
}

/// How the check die is rolled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollMode {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

/// A structured, classified action ready for the rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub action: ActionType,
    /// Targets in the order the player named them ("goblin", "old mill")
    #[serde(default)]
    pub targets: Vec<String>,
    /// Extra named arguments: `item`, `spell`, `rest`, `direction`, `guess`
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub roll_mode: RollMode,
    pub raw_input: String,
}

impl ActionDescriptor {
    pub fn new(action: ActionType, raw_input: impl Into<String>) -> Self {
        Self {
            action,
            targets: Vec::new(),
            parameters: BTreeMap::new(),
            roll_mode: RollMode::Normal,
            raw_input: raw_input.into(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_roll_mode(mut self, mode: RollMode) -> Self {
        self.roll_mode = mode;
        self
    }

    pub fn primary_target(&self) -> Option<&str> {
        self.targets.first().map(String::as_str)
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// The item this action consumes or moves, if it names one.
    pub fn item(&self) -> Option<&str> {
        self.parameter("item")
    }

    pub fn rule_system(&self) -> RuleSystem {
        self.action.rule_system()
    }
}

impl fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action)?;
        if !self.targets.is_empty() {
            write!(f, " {}", self.targets.join(", "))?;
        }
        Ok(())
    }
}
