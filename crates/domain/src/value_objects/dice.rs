//! Dice formulas and roll results.
//!
//! The domain never owns a random source: callers pass a closure that rolls a
//! single die, which keeps rule calculators pure and replayable from a seed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceParseError {
    #[error("Empty dice formula")]
    Empty,
    #[error("Invalid dice formula '{0}': expected XdY, XdY+Z, XdY-Z or a number")]
    InvalidFormat(String),
    #[error("Die size must be at least 2")]
    InvalidDieSize,
}

/// `count` d `sides` plus `modifier`. A count of zero is a flat value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceFormula {
    pub count: u8,
    pub sides: u8,
    pub modifier: i32,
}

impl DiceFormula {
    pub fn new(count: u8, sides: u8, modifier: i32) -> Result<Self, DiceParseError> {
        if count > 0 && sides < 2 {
            return Err(DiceParseError::InvalidDieSize);
        }
        Ok(Self {
            count,
            sides,
            modifier,
        })
    }

    /// The check die.
    pub fn d20() -> Self {
        Self {
            count: 1,
            sides: 20,
            modifier: 0,
        }
    }

    pub fn flat(value: i32) -> Self {
        Self {
            count: 0,
            sides: 0,
            modifier: value,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.count == 0
    }

    /// Roll with `roll_die(sides)`. Faces outside `1..=sides` are clamped.
    pub fn roll_with(&self, mut roll_die: impl FnMut(u8) -> u8) -> DiceRollResult {
        let rolls: Vec<i32> = (0..self.count)
            .map(|_| i32::from(roll_die(self.sides).clamp(1, self.sides)))
            .collect();
        let dice_total = rolls.iter().sum::<i32>();
        DiceRollResult {
            formula: *self,
            rolls,
            dice_total,
            total: dice_total + self.modifier,
        }
    }
}

impl FromStr for DiceFormula {
    type Err = DiceParseError;

    /// "1d20+5", "2d6-1", "d8" or a flat "6".
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let text = input.trim().to_ascii_lowercase();
        if text.is_empty() {
            return Err(DiceParseError::Empty);
        }
        let invalid = || DiceParseError::InvalidFormat(text.clone());

        let Some((count, rest)) = text.split_once('d') else {
            return text.parse().map(Self::flat).map_err(|_| invalid());
        };
        let count: u8 = match count {
            "" => 1,
            n => n.parse().map_err(|_| invalid())?,
        };
        let (sides, modifier) = match rest.find(['+', '-']) {
            Some(0) => return Err(invalid()),
            Some(at) => {
                let magnitude: i32 = rest[at + 1..].parse().map_err(|_| invalid())?;
                let sign = if rest.as_bytes()[at] == b'-' { -1 } else { 1 };
                (&rest[..at], sign * magnitude)
            }
            None => (rest, 0),
        };
        let sides: u8 = sides.parse().map_err(|_| invalid())?;
        Self::new(count, sides, modifier)
    }
}

impl fmt::Display for DiceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_flat() {
            return write!(f, "{}", self.modifier);
        }
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{m}"),
            m => write!(f, "{m}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRollResult {
    pub formula: DiceFormula,
    pub rolls: Vec<i32>,
    pub dice_total: i32,
    /// Dice plus modifier
    pub total: i32,
}

impl DiceRollResult {
    /// "2d6[6, 4] + 3 = 13"
    pub fn breakdown(&self) -> String {
        if self.formula.is_flat() {
            return self.total.to_string();
        }
        let faces = self
            .rolls
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let head = format!("{}d{}[{faces}]", self.formula.count, self.formula.sides);
        match self.formula.modifier {
            0 => format!("{head} = {}", self.total),
            m if m > 0 => format!("{head} + {m} = {}", self.total),
            m => format!("{head} - {} = {}", -m, self.total),
        }
    }
}

/// A roll made while resolving an action, kept for the mechanical summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRecord {
    pub purpose: String,
    pub result: DiceRollResult,
}

impl DiceRecord {
    pub fn new(purpose: impl Into<String>, result: DiceRollResult) -> Self {
        Self {
            purpose: purpose.into(),
            result,
        }
    }
}

impl fmt::Display for DiceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.purpose, self.result.breakdown())
    }
}
