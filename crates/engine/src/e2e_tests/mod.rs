//! Backend E2E integration tests.
//!
//! These tests drive the full turn loop through a real `App`:
//! - SQLite ledgers in a temporary directory
//! - Scripted classifier, plausibility, narrator and content generator
//! - Session creation, reopening and rewinding through `SessionManager`
//!
//! # Running E2E Tests
//!
//! ```bash
//! cargo test -p chronicle-engine --lib e2e_tests
//! ```

mod e2e_helpers;
mod turn_tests;

pub use e2e_helpers::*;
