//! Port traits at the engine's boundaries.
//!
//! - Ledger storage: sessions, events, canon entries, snapshots
//! - The LLM and the game services built on it: fallback classification,
//!   plausibility, narration and content generation
//! - Semantic memory for retrieval
//! - Clock and random seeds, so turns replay in tests

mod error;
mod external;
mod repos;
mod testing;
pub mod types;

pub use error::{LlmError, RepoError, ServiceError};

pub use repos::{CanonRepo, EventRepo, SessionRepo, SnapshotRepo};

pub use types::{ChainCheckpoint, MemorySnippet, SessionRecord, SnapshotSummary};

pub use external::{
    ActionClassifierPort, ContentGeneratorPort, FallbackClassification, LlmPort, LlmRequest,
    LlmResponse, MemoryPort, NarrationRequest, NarratorPort, PlausibilityPort,
};

pub use testing::{ClockPort, RandomPort};

// =============================================================================
// Test-Only Mocks
// =============================================================================
#[cfg(test)]
pub use repos::{MockCanonRepo, MockEventRepo, MockSessionRepo, MockSnapshotRepo};

#[cfg(test)]
pub use external::{
    MockActionClassifierPort, MockContentGeneratorPort, MockLlmPort, MockMemoryPort,
    MockNarratorPort, MockPlausibilityPort,
};

#[cfg(test)]
pub use testing::{MockClockPort, MockRandomPort};
