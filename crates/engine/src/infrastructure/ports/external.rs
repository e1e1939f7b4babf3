//! External service port traits (LLM and the latency-bound game services).
//!
//! None of these calls is trusted to return promptly. Callers wrap every call
//! in a timeout and carry a typed fallback value.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chronicle_domain::{EntityDescriptor, EventStatus, SpawnRequest};

use super::error::{LlmError, ServiceError};
use super::types::MemorySnippet;

// =============================================================================
// LLM
// =============================================================================

/// One prompt to the model. The engine never holds a conversation with it,
/// so a request is a system prompt plus a single user message.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the server to constrain the reply to a JSON object
    pub json: bool,
}

impl LlmRequest {
    pub fn new(system_prompt: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 256,
            json: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn json_reply(mut self) -> Self {
        self.json = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub content: String,
    /// The model stopped at the token limit
    pub truncated: bool,
    /// Tokens generated, when the server reports it
    pub eval_count: Option<u32>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmPort: Send + Sync {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

// =============================================================================
// Classification
// =============================================================================

/// What the fallback classifier thinks the player meant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackClassification {
    /// One of the valid action names, or anything else for "no idea"
    pub action: String,
    #[serde(default)]
    pub targets: Vec<String>,
    /// Nominally in `[0, 1]`; callers clamp it
    #[serde(default)]
    pub confidence: f32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionClassifierPort: Send + Sync {
    async fn classify(
        &self,
        input: &str,
        valid_actions: &[String],
        context: &str,
    ) -> Result<FallbackClassification, ServiceError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlausibilityPort: Send + Sync {
    /// Rate how plausible `input` is in `context`, 0 (absurd) to 100 (mundane).
    async fn rate(&self, input: &str, context: &str) -> Result<u8, ServiceError>;
}

// =============================================================================
// Retrieval, narration and content
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemoryPort: Send + Sync {
    async fn retrieve(&self, query: &str, limit: usize)
        -> Result<Vec<MemorySnippet>, ServiceError>;
}

/// Everything the narrator may use. Narration is observational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationRequest {
    pub player_input: String,
    pub status: EventStatus,
    pub mechanical_summary: String,
    pub location_name: String,
    pub location_description: String,
    pub snippets: Vec<MemorySnippet>,
    pub spawned: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NarratorPort: Send + Sync {
    async fn narrate(&self, request: NarrationRequest) -> Result<String, ServiceError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentGeneratorPort: Send + Sync {
    async fn generate(&self, request: SpawnRequest) -> Result<EntityDescriptor, ServiceError>;
}
