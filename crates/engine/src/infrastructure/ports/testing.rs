//! Time and randomness, injected so turns can be replayed in tests.

use chrono::{DateTime, Utc};

#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[cfg_attr(test, mockall::automock)]
pub trait RandomPort: Send + Sync {
    /// Seed for one turn's dice. Stored on the event so the roll can be
    /// reproduced.
    fn gen_seed(&self) -> u64;
}
