//! Engine configuration
//!
//! Every timeout, retry count and threshold the turn pipeline uses lives here.
//! Values come from environment variables (after `.env` loading in `main`),
//! each with a default, so a bare `chronicle-engine` run works out of the box.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;

use crate::infrastructure::ollama::{DEFAULT_OLLAMA_BASE_URL, DEFAULT_OLLAMA_MODEL};

/// How the canon chain is checked when a session is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainVerification {
    /// Re-hash every entry from genesis
    #[default]
    Full,
    /// Trust the persisted checkpoint (after confirming its hash) and re-hash
    /// only what came after it
    Incremental,
}

impl FromStr for ChainVerification {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "incremental" | "checkpoint" => Ok(Self::Incremental),
            _ => Err(()),
        }
    }
}

/// Budgets for the classification cascade.
#[derive(Debug, Clone)]
pub struct ClassificationConfig {
    /// Whole-cascade budget
    pub budget: Duration,
    /// Upper bound on any single external call
    pub call_timeout: Duration,
    /// Fallback confidence below which the plausibility stage runs
    pub plausibility_threshold: f32,
    /// Plausibility score assumed when the evaluator cannot answer
    pub degraded_plausibility: u8,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            budget: Duration::from_millis(8000),
            call_timeout: Duration::from_millis(5000),
            plausibility_threshold: 0.4,
            degraded_plausibility: 50,
        }
    }
}

/// Exponential backoff with jitter. Ledger writes and LLM calls each get
/// their own policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Jitter factor (0.0-1.0) applied to each delay
    pub jitter_factor: f64,
}

impl RetryPolicy {
    pub fn storage() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 50,
            max_delay_ms: 2000,
            jitter_factor: 0.2,
        }
    }

    /// LLM calls run inside per-stage timeouts, so the schedule stays short.
    pub fn llm() -> Self {
        Self {
            max_retries: 1,
            base_delay_ms: 200,
            max_delay_ms: 2000,
            jitter_factor: 0.2,
        }
    }

    /// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped,
    /// then spread by the jitter factor.
    pub fn delay(&self, attempt: u32) -> Duration {
        let doubling = 2u64.saturating_pow(attempt.saturating_sub(1));
        let capped = self.base_delay_ms.saturating_mul(doubling).min(self.max_delay_ms);
        let spread = (capped as f64 * self.jitter_factor.clamp(0.0, 1.0)) as i64;
        if spread == 0 {
            return Duration::from_millis(capped);
        }
        let jitter = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis((capped as i64 + jitter).max(0) as u64)
    }
}

/// Timeouts and windows for the turn pipeline.
#[derive(Debug, Clone)]
pub struct TurnConfig {
    pub retrieve_timeout: Duration,
    pub render_timeout: Duration,
    pub director_timeout: Duration,
    /// Events of recent history handed to retrieval and the director
    pub recent_event_window: usize,
    /// Turns between interval snapshots
    pub snapshot_interval: u32,
    /// Snippets requested from semantic memory
    pub retrieve_limit: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            retrieve_timeout: Duration::from_millis(2000),
            render_timeout: Duration::from_millis(15000),
            director_timeout: Duration::from_millis(8000),
            recent_event_window: 10,
            snapshot_interval: 20,
            retrieve_limit: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_path: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub lore_path: Option<PathBuf>,
    pub classification: ClassificationConfig,
    pub turn: TurnConfig,
    pub storage_retry: RetryPolicy,
    pub llm_retry: RetryPolicy,
    pub chain_verification: ChainVerification,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: "chronicle.db".to_string(),
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            lore_path: None,
            classification: ClassificationConfig::default(),
            turn: TurnConfig::default(),
            storage_retry: RetryPolicy::storage(),
            llm_retry: RetryPolicy::llm(),
            chain_verification: ChainVerification::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to the default
    /// with a warning rather than aborting startup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let lookup = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let millis = |key: &str, default: Duration| -> Duration {
            parse_or(lookup(key), key, default.as_millis() as u64)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        let classification = ClassificationConfig {
            budget: millis("CLASSIFY_BUDGET_MS", defaults.classification.budget),
            call_timeout: millis("CLASSIFY_CALL_TIMEOUT_MS", defaults.classification.call_timeout),
            plausibility_threshold: parse_or(
                lookup("PLAUSIBILITY_THRESHOLD"),
                "PLAUSIBILITY_THRESHOLD",
                defaults.classification.plausibility_threshold,
            )
            .map(|v: f32| v.clamp(0.0, 1.0))
            .unwrap_or(defaults.classification.plausibility_threshold),
            degraded_plausibility: parse_or(
                lookup("DEGRADED_PLAUSIBILITY"),
                "DEGRADED_PLAUSIBILITY",
                defaults.classification.degraded_plausibility,
            )
            .filter(|v: &u8| {
                let in_range = *v <= 100;
                if !in_range {
                    tracing::warn!(
                        key = "DEGRADED_PLAUSIBILITY",
                        value = *v,
                        "Plausibility above 100, using default"
                    );
                }
                in_range
            })
            .unwrap_or(defaults.classification.degraded_plausibility),
        };

        let turn = TurnConfig {
            retrieve_timeout: millis("RETRIEVE_TIMEOUT_MS", defaults.turn.retrieve_timeout),
            render_timeout: millis("RENDER_TIMEOUT_MS", defaults.turn.render_timeout),
            director_timeout: millis("DIRECTOR_TIMEOUT_MS", defaults.turn.director_timeout),
            recent_event_window: parse_or(
                lookup("RECENT_EVENT_WINDOW"),
                "RECENT_EVENT_WINDOW",
                defaults.turn.recent_event_window,
            )
            .unwrap_or(defaults.turn.recent_event_window),
            snapshot_interval: parse_or(
                lookup("SNAPSHOT_INTERVAL"),
                "SNAPSHOT_INTERVAL",
                defaults.turn.snapshot_interval,
            )
            .filter(|v: &u32| *v > 0)
            .unwrap_or(defaults.turn.snapshot_interval),
            retrieve_limit: defaults.turn.retrieve_limit,
        };

        let storage_retry = RetryPolicy {
            max_retries: parse_or(
                lookup("STORAGE_MAX_RETRIES"),
                "STORAGE_MAX_RETRIES",
                defaults.storage_retry.max_retries,
            )
            .unwrap_or(defaults.storage_retry.max_retries),
            base_delay_ms: parse_or(
                lookup("STORAGE_BASE_DELAY_MS"),
                "STORAGE_BASE_DELAY_MS",
                defaults.storage_retry.base_delay_ms,
            )
            .unwrap_or(defaults.storage_retry.base_delay_ms),
            max_delay_ms: parse_or(
                lookup("STORAGE_MAX_DELAY_MS"),
                "STORAGE_MAX_DELAY_MS",
                defaults.storage_retry.max_delay_ms,
            )
            .unwrap_or(defaults.storage_retry.max_delay_ms),
            jitter_factor: defaults.storage_retry.jitter_factor,
        };

        let llm_retry = RetryPolicy {
            max_retries: parse_or(
                lookup("LLM_MAX_RETRIES"),
                "LLM_MAX_RETRIES",
                defaults.llm_retry.max_retries,
            )
            .unwrap_or(defaults.llm_retry.max_retries),
            ..defaults.llm_retry.clone()
        };

        let chain_verification = match lookup("CHAIN_VERIFICATION") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "Unknown CHAIN_VERIFICATION, using full");
                ChainVerification::Full
            }),
            None => defaults.chain_verification,
        };

        Self {
            database_path: lookup("CHRONICLE_DB").unwrap_or(defaults.database_path),
            ollama_base_url: lookup("OLLAMA_BASE_URL")
                .or_else(|| lookup("OLLAMA_URL"))
                .unwrap_or(defaults.ollama_base_url),
            ollama_model: lookup("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            lore_path: lookup("LORE_PATH").map(PathBuf::from),
            classification,
            turn,
            storage_retry,
            llm_retry,
            chain_verification,
        }
    }
}

/// `Some(parsed)` when set and valid, `Some(default)` when unset, `None` after
/// logging when set but invalid.
fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Option<T> {
    match raw {
        None => Some(default),
        Some(raw) => match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(key, value = %raw, "Invalid configuration value, using default");
                None
            }
        },
    }
}
