//! Use cases - the turn pipeline and the stages it sequences.
//!
//! - `classification` - raw input to an action, never failing
//! - `rules` - one calculator per rule system, proposing deltas
//! - `director` - post-commit content triggers
//! - `turn` - the seven-stage orchestrator and meta commands

pub mod classification;
pub mod director;
pub mod rules;
pub mod turn;

pub use classification::{ClassificationPipeline, Classified};
pub use director::{Director, SpawnPlan};
pub use rules::{Proposal, RuleCalculator, RuleRejection};
pub use turn::{PlayTurn, SessionContext, TurnError, TurnOutcome, TurnReply};
