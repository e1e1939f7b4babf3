//! Repository modules - ledger access wrappers around the store ports.
//!
//! The store ports know nothing about sequencing or hashing. These modules
//! own both: the canon hash chain, bounded retry of store writes, and the
//! per-session ledger engine that the turn pipeline writes through.

pub mod canon_chain;
pub mod ledger;
pub mod retry;

pub use canon_chain::{ChainBreak, GENESIS_HASH};
pub use ledger::{LedgerEngine, LedgerError, LedgerStores};
pub use retry::StorageRetry;
