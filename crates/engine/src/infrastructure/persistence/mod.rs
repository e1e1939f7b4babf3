//! Ledger store adapters.

mod memory;
mod sqlite;

pub use memory::InMemoryLedgerStore;
pub use sqlite::SqliteLedgerStore;
