//! Value objects - Immutable objects defined by their attributes

mod action;
mod classification;
mod delta;
mod dice;
mod difficulty;
mod resource;

pub use action::{ActionDescriptor, ActionType, MetaCommand, RollMode, RuleSystem};
pub use classification::{clamp_confidence, ClassificationResult, ClassificationSource};
pub use delta::{AppliedDelta, ClampNote, StateChange, StateDelta};
pub use dice::{DiceFormula, DiceParseError, DiceRecord, DiceRollResult};
pub use difficulty::DifficultyClass;
pub use resource::{BoundedResource, ResourceKind};
