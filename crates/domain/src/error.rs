//! Domain errors.
//!
//! A delta that breaks a world invariant comes back as a `DomainError`; the
//! engine records the turn as rejected and carries the message into the
//! player-facing reply.

use thiserror::Error;

use crate::value_objects::DiceParseError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// A delta or lookup referenced something absent from the world.
    #[error("No {kind} named '{id}'")]
    NotFound { kind: &'static str, id: String },

    /// The change would break a world invariant (hp ceiling, item counts...).
    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

impl From<DiceParseError> for DomainError {
    fn from(err: DiceParseError) -> Self {
        Self::Parse(err.to_string())
    }
}
