//! Chronicle Engine library.
//!
//! The turn pipeline, its ledgers and the adapters it runs against.
//!
//! ## Structure
//!
//! - `infrastructure/` - ports, adapters (SQLite, Ollama, lore) and config
//! - `repositories/` - the ledger & snapshot engine and canon chain
//! - `use_cases/` - classification, rule calculators, director, turn loop
//! - `stores/` - live sessions
//! - `app` - application composition

pub mod app;
pub mod infrastructure;
pub mod repositories;
pub mod stores;
pub mod use_cases;

/// End-to-end tests against the real SQLite store.
#[cfg(test)]
mod e2e_tests;

pub use app::App;
