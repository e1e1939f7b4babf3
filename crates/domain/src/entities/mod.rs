//! Domain entities

mod condition;
mod entity;
mod location;

pub use condition::Condition;
pub use entity::{Disposition, Entity, EntityKind};
pub use location::{Location, LocationKind};
