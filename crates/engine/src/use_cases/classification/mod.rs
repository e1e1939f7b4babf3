//! Input classification cascade: pattern → fallback → plausibility.
//!
//! The cascade never fails. Every external call runs under
//! `min(call_timeout, remaining budget)`; a timeout or service error turns
//! into a low-confidence creative attempt so the turn can go on.

mod patterns;

pub use patterns::{match_input, normalize_direction, valid_action_names, PatternMatch};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use chronicle_domain::{
    clamp_confidence, ActionDescriptor, ActionType, ClassificationResult, MetaCommand,
};

use crate::infrastructure::config::ClassificationConfig;
use crate::infrastructure::ports::{
    ActionClassifierPort, FallbackClassification, PlausibilityPort, ServiceError,
};

/// What the player typed, resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// Answered outside the turn pipeline
    Meta(MetaCommand),
    Action(ClassificationResult),
}

pub struct ClassificationPipeline {
    classifier: Arc<dyn ActionClassifierPort>,
    plausibility: Arc<dyn PlausibilityPort>,
    config: ClassificationConfig,
    valid_actions: Vec<String>,
}

impl ClassificationPipeline {
    pub fn new(
        classifier: Arc<dyn ActionClassifierPort>,
        plausibility: Arc<dyn PlausibilityPort>,
        config: ClassificationConfig,
    ) -> Self {
        Self {
            classifier,
            plausibility,
            config,
            valid_actions: valid_action_names(),
        }
    }

    /// Resolve `input`. `context` is a short description of the scene for the
    /// external stages.
    pub async fn classify(&self, input: &str, context: &str) -> Classified {
        match match_input(input) {
            Some(PatternMatch::Meta(command)) => return Classified::Meta(command),
            Some(PatternMatch::Action(action)) => {
                tracing::debug!(action = %action.action, "Input matched a pattern");
                return Classified::Action(ClassificationResult::from_pattern(action));
            }
            None => {}
        }

        let deadline = Instant::now() + self.config.budget;

        let fallback = self
            .call("classifier", deadline, || {
                self.classifier.classify(input, &self.valid_actions, context)
            })
            .await;
        let fallback = match fallback {
            Ok(fallback) => fallback,
            Err(e) => {
                tracing::warn!(error = %e, "Fallback classifier unavailable, degrading to attempt");
                return Classified::Action(ClassificationResult::degraded_attempt(
                    input,
                    self.config.degraded_plausibility,
                ));
            }
        };

        let guess = fallback.action.parse::<ActionType>().ok();
        let confidence = match guess {
            Some(_) => clamp_confidence(fallback.confidence),
            None => 0.0,
        };

        if let Some(action) = guess.filter(|_| confidence >= self.config.plausibility_threshold) {
            let descriptor = with_targets(ActionDescriptor::new(action, input), &fallback);
            tracing::debug!(action = %action, confidence, "Input classified by fallback");
            return Classified::Action(ClassificationResult::from_fallback(descriptor, confidence));
        }

        let mut attempt =
            with_targets(ActionDescriptor::new(ActionType::Attempt, input), &fallback);
        if let Some(action) = guess.filter(|a| *a != ActionType::Attempt) {
            attempt = attempt.with_parameter("guess", action.name());
        }

        let rated = self
            .call("plausibility", deadline, || self.plausibility.rate(input, context))
            .await;
        let result = match rated {
            Ok(score) => {
                tracing::debug!(score, confidence, "Low-confidence input escalated");
                ClassificationResult::escalated(attempt, confidence, score)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    score = self.config.degraded_plausibility,
                    "Plausibility unavailable, using the degraded score"
                );
                ClassificationResult::escalated(attempt, 0.0, self.config.degraded_plausibility)
                    .mark_degraded()
            }
        };
        Classified::Action(result)
    }

    async fn call<T, F, Fut>(
        &self,
        service: &'static str,
        deadline: Instant,
        f: F,
    ) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let started = Instant::now();
        let remaining = deadline.saturating_duration_since(started);
        let limit = remaining.min(self.config.call_timeout);
        if limit == Duration::ZERO {
            return Err(ServiceError::timeout(service, Duration::ZERO));
        }
        match tokio::time::timeout(limit, f()).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::timeout(service, started.elapsed())),
        }
    }
}

fn with_targets(
    mut descriptor: ActionDescriptor,
    fallback: &FallbackClassification,
) -> ActionDescriptor {
    for target in fallback.targets.iter().filter(|t| !t.trim().is_empty()) {
        descriptor = descriptor.with_target(target.trim());
    }
    descriptor
}
