//! Chronicle domain: world state, ledger records and the invariants that
//! govern them. Pure types only; no I/O and no randomness source.

pub mod aggregates;
pub mod director;
pub mod entities;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod value_objects;

pub use aggregates::WorldState;

pub use director::{
    default_triggers, tension, DirectorTrigger, EntityDescriptor, PacingContext, SpawnCategory,
    SpawnRequest, TriggerCondition,
};

pub use entities::{Condition, Disposition, Entity, EntityKind, Location, LocationKind};

pub use error::DomainError;

pub use ids::{EntityId, LocationId, RegionId, SessionId, SnapshotId};

pub use ledger::{
    CanonKind, CanonLedgerEntry, CanonRecord, EventKind, EventLedgerEntry, EventStatus,
    ForkMarker, Lineage, PendingEvent, Snapshot, SnapshotReason, GENESIS_HASH,
};

pub use value_objects::{
    clamp_confidence, ActionDescriptor, ActionType, AppliedDelta, BoundedResource, ClampNote,
    ClassificationResult, ClassificationSource, DiceFormula, DiceParseError, DiceRecord,
    DiceRollResult, DifficultyClass, MetaCommand, ResourceKind, RollMode, RuleSystem,
    StateChange, StateDelta,
};
