//! Clock and random sources.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::infrastructure::ports::{ClockPort, RandomPort};

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Seeds from the thread RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRandom;

impl SystemRandom {
    pub fn new() -> Self {
        Self
    }
}

impl RandomPort for SystemRandom {
    fn gen_seed(&self) -> u64 {
        rand::thread_rng().gen()
    }
}

#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Every turn gets the same seed.
#[cfg(test)]
pub struct FixedRandom(pub u64);

#[cfg(test)]
impl RandomPort for FixedRandom {
    fn gen_seed(&self) -> u64 {
        self.0
    }
}

/// Seeds `n`, `n + 1`, `n + 2`, ...
#[cfg(test)]
pub struct SequenceRandom(std::sync::atomic::AtomicU64);

#[cfg(test)]
impl SequenceRandom {
    pub fn starting_at(seed: u64) -> Self {
        Self(std::sync::atomic::AtomicU64::new(seed))
    }
}

#[cfg(test)]
impl RandomPort for SequenceRandom {
    fn gen_seed(&self) -> u64 {
        self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}
