//! In-memory session storage.
//!
//! - `GameSession` - one session's world state, ledger cursor and director
//! - `SessionManager` - the open sessions, keyed by id

pub mod session;
pub mod sessions;

pub use session::GameSession;
pub use sessions::{SessionManager, SharedSession};
