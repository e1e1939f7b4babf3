//! LLM-backed implementations of the game service ports.
//!
//! Each service builds one prompt, makes one `LlmPort::generate` call and
//! parses a JSON object out of the reply. Timeouts are the caller's concern.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use chronicle_domain::{EntityDescriptor, EventStatus, SpawnRequest};

use crate::infrastructure::ports::{
    ActionClassifierPort, ContentGeneratorPort, FallbackClassification, LlmError,
    LlmPort, LlmRequest, NarrationRequest, NarratorPort, PlausibilityPort, ServiceError,
};

const CLASSIFIER_SYSTEM_PROMPT: &str = "You classify text adventure commands. \
Reply with a single JSON object: {\"action\": <one of the listed actions, or \"unknown\">, \
\"targets\": [<names mentioned>], \"confidence\": <0.0 to 1.0>}. No prose.";

const PLAUSIBILITY_SYSTEM_PROMPT: &str = "You judge whether an action could work in a grounded \
fantasy world. Reply with a single JSON object: {\"score\": <0 to 100>, \"reasoning\": <short>}. \
100 is mundane, 50 is a stretch, 0 is impossible.";

const NARRATOR_SYSTEM_PROMPT: &str = "You are the narrator of a text adventure. Describe what \
happened in two to four sentences of second-person prose. Only describe the mechanical outcome \
you are given; never invent damage, items or deaths.";

const CONTENT_SYSTEM_PROMPT: &str = "You populate a text adventure world. Reply with a single \
JSON object: {\"name\": str, \"kind\": \"npc\" | \"creature\", \"disposition\": \"friendly\" | \
\"neutral\" | \"hostile\", \"description\": str, \"hp\": int, \"stats\": {str: int}, \
\"inventory\": {str: int}}.";

/// Pull a JSON object out of a model reply that may wrap it in prose or a
/// code fence.
pub(crate) fn extract_json(response: &str) -> &str {
    if let Some(start) = response.find("```json") {
        if let Some(end) = response[start + 7..].find("```") {
            return response[start + 7..start + 7 + end].trim();
        }
    }

    if let Some(start) = response.find("```") {
        if let Some(end) = response[start + 3..].find("```") {
            let content = response[start + 3..start + 3 + end].trim();
            if content.starts_with('{') {
                return content;
            }
        }
    }

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if start < end {
            return &response[start..=end];
        }
    }

    response.trim()
}

fn parse_reply<T: for<'de> Deserialize<'de>>(reply: &str, what: &str) -> Result<T, ServiceError> {
    serde_json::from_str(extract_json(reply)).map_err(|e| {
        tracing::warn!(error = %e, response = %reply, what, "Failed to parse LLM response as JSON");
        ServiceError::InvalidResponse(format!("Invalid JSON in {what} response: {e}"))
    })
}

async fn ask(llm: &Arc<dyn LlmPort>, request: LlmRequest) -> Result<String, LlmError> {
    let response = llm.generate(request).await?;
    if response.truncated {
        tracing::debug!(eval_count = ?response.eval_count, "LLM reply hit the token limit");
    }
    Ok(response.content)
}

// =============================================================================
// Fallback classifier
// =============================================================================

pub struct LlmActionClassifier {
    llm: Arc<dyn LlmPort>,
}

impl LlmActionClassifier {
    pub fn new(llm: Arc<dyn LlmPort>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ActionClassifierPort for LlmActionClassifier {
    async fn classify(
        &self,
        input: &str,
        valid_actions: &[String],
        context: &str,
    ) -> Result<FallbackClassification, ServiceError> {
        let prompt = format!(
            "Valid actions: {}\nScene: {}\nPlayer typed: \"{}\"",
            valid_actions.join(", "),
            context,
            input
        );
        let request = LlmRequest::new(CLASSIFIER_SYSTEM_PROMPT, prompt)
            .with_temperature(0.1)
            .with_max_tokens(128)
            .json_reply();
        let reply = ask(&self.llm, request).await?;
        let mut parsed: FallbackClassification = parse_reply(&reply, "classification")?;
        parsed.action = parsed.action.trim().to_ascii_lowercase();
        Ok(parsed)
    }
}

// =============================================================================
// Plausibility evaluator
// =============================================================================

#[derive(Debug, Deserialize)]
struct PlausibilityReply {
    #[serde(default)]
    score: Option<f64>,
    /// Some models answer on a 0-1 scale under this name
    #[serde(default)]
    plausibility: Option<f64>,
}

impl PlausibilityReply {
    fn into_score(self) -> Result<u8, ServiceError> {
        let raw = match (self.score, self.plausibility) {
            (Some(score), _) => score,
            (None, Some(p)) if p <= 1.0 => p * 100.0,
            (None, Some(p)) => p,
            (None, None) => {
                return Err(ServiceError::InvalidResponse(
                    "plausibility reply had no score".to_string(),
                ))
            }
        };
        if !raw.is_finite() {
            return Err(ServiceError::InvalidResponse(format!("non-finite score {raw}")));
        }
        Ok(raw.round().clamp(0.0, 100.0) as u8)
    }
}

pub struct LlmPlausibilityEvaluator {
    llm: Arc<dyn LlmPort>,
}

impl LlmPlausibilityEvaluator {
    pub fn new(llm: Arc<dyn LlmPort>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl PlausibilityPort for LlmPlausibilityEvaluator {
    async fn rate(&self, input: &str, context: &str) -> Result<u8, ServiceError> {
        let prompt = format!("Scene: {context}\nThe player attempts: \"{input}\"");
        let request = LlmRequest::new(PLAUSIBILITY_SYSTEM_PROMPT, prompt)
            .with_temperature(0.3)
            .with_max_tokens(128)
            .json_reply();
        let reply = ask(&self.llm, request).await?;
        parse_reply::<PlausibilityReply>(&reply, "plausibility")?.into_score()
    }
}

// =============================================================================
// Narrator
// =============================================================================

pub struct LlmNarrator {
    llm: Arc<dyn LlmPort>,
}

impl LlmNarrator {
    pub fn new(llm: Arc<dyn LlmPort>) -> Self {
        Self { llm }
    }

    fn prompt(request: &NarrationRequest) -> String {
        let mut prompt = format!(
            "Location: {}. {}\nPlayer: \"{}\"\n",
            request.location_name, request.location_description, request.player_input
        );
        match request.status {
            EventStatus::Accepted => {
                prompt.push_str(&format!("Outcome: {}\n", request.mechanical_summary))
            }
            EventStatus::Rejected => prompt.push_str(&format!(
                "The action could not be taken: {}\n",
                request.mechanical_summary
            )),
        }
        if let Some(spawned) = &request.spawned {
            prompt.push_str(&format!("Something new appears: {spawned}\n"));
        }
        if !request.snippets.is_empty() {
            prompt.push_str("Relevant lore:\n");
            for snippet in &request.snippets {
                prompt.push_str(&format!("- {}\n", snippet.text));
            }
        }
        prompt
    }
}

#[async_trait]
impl NarratorPort for LlmNarrator {
    async fn narrate(&self, request: NarrationRequest) -> Result<String, ServiceError> {
        let request = LlmRequest::new(NARRATOR_SYSTEM_PROMPT, Self::prompt(&request))
            .with_temperature(0.8)
            .with_max_tokens(300);
        let reply = ask(&self.llm, request).await?;
        let text = reply.trim();
        if text.is_empty() {
            return Err(ServiceError::InvalidResponse("empty narration".to_string()));
        }
        Ok(text.to_string())
    }
}

// =============================================================================
// Content generator
// =============================================================================

pub struct LlmContentGenerator {
    llm: Arc<dyn LlmPort>,
}

impl LlmContentGenerator {
    pub fn new(llm: Arc<dyn LlmPort>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ContentGeneratorPort for LlmContentGenerator {
    async fn generate(&self, request: SpawnRequest) -> Result<EntityDescriptor, ServiceError> {
        let prompt = format!(
            "Location: {} ({}). Tension {:.2}. Create one {} to appear here.",
            request.location_name,
            if request.context.is_settlement { "settlement" } else { "wilds" },
            request.context.tension,
            request.category
        );
        let request = LlmRequest::new(CONTENT_SYSTEM_PROMPT, prompt)
            .with_temperature(0.9)
            .with_max_tokens(400)
            .json_reply();
        let reply = ask(&self.llm, request).await?;
        let descriptor: EntityDescriptor = parse_reply(&reply, "content")?;
        if descriptor.name.trim().is_empty() {
            return Err(ServiceError::InvalidResponse("generated entity has no name".to_string()));
        }
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{LlmResponse, MockLlmPort};
    use chronicle_domain::{EntityKind, LocationId, PacingContext, SpawnCategory};

    fn replying(content: &'static str) -> Arc<dyn LlmPort> {
        let mut llm = MockLlmPort::new();
        llm.expect_generate().returning(move |_| {
            Ok(LlmResponse {
                content: content.to_string(),
                truncated: false,
                eval_count: None,
            })
        });
        Arc::new(llm)
    }

    fn failing() -> Arc<dyn LlmPort> {
        let mut llm = MockLlmPort::new();
        llm.expect_generate()
            .returning(|_| Err(LlmError::RequestFailed("connection refused".into())));
        Arc::new(llm)
    }

    #[test]
    fn extract_json_handles_fences_and_prose() {
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("Sure! {\"a\":1} Hope that helps."), "{\"a\":1}");
        assert_eq!(extract_json("no json here"), "no json here");
    }

    #[tokio::test]
    async fn classifier_normalizes_the_action_name() {
        let classifier = LlmActionClassifier::new(replying(
            r#"{"action":" Attack ","targets":["goblin"],"confidence":0.9}"#,
        ));
        let result = classifier
            .classify("smack the goblin", &["attack".to_string()], "forest")
            .await
            .expect("classify");
        assert_eq!(result.action, "attack");
        assert_eq!(result.targets, vec!["goblin".to_string()]);
    }

    #[tokio::test]
    async fn structured_services_ask_for_json() {
        let mut llm = MockLlmPort::new();
        llm.expect_generate()
            .withf(|request| request.json && request.prompt.contains("climb the wall"))
            .times(1)
            .returning(|_| {
                Ok(LlmResponse {
                    content: r#"{"score": 40}"#.to_string(),
                    truncated: false,
                    eval_count: Some(6),
                })
            });
        let rater = LlmPlausibilityEvaluator::new(Arc::new(llm));
        assert_eq!(rater.rate("climb the wall", "castle").await.expect("rate"), 40);
    }

    #[tokio::test]
    async fn classifier_surfaces_garbage_as_invalid_response() {
        let classifier = LlmActionClassifier::new(replying("I think they want to attack"));
        let err = classifier.classify("x", &[], "").await.expect_err("garbage");
        assert!(matches!(err, ServiceError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn plausibility_accepts_both_scales() {
        let rater = LlmPlausibilityEvaluator::new(replying(r#"{"score": 72}"#));
        assert_eq!(rater.rate("climb", "cliff").await.expect("rate"), 72);

        let rater = LlmPlausibilityEvaluator::new(replying(r#"{"plausibility": 0.15}"#));
        assert_eq!(rater.rate("fly", "cliff").await.expect("rate"), 15);

        let rater = LlmPlausibilityEvaluator::new(replying(r#"{"score": 400}"#));
        assert_eq!(rater.rate("x", "y").await.expect("rate"), 100);
    }

    #[tokio::test]
    async fn transport_failures_become_unavailable() {
        let rater = LlmPlausibilityEvaluator::new(failing());
        let err = rater.rate("x", "y").await.expect_err("down");
        assert!(matches!(err, ServiceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn empty_narration_is_an_error() {
        let narrator = LlmNarrator::new(replying("   "));
        let request = NarrationRequest {
            player_input: "look".into(),
            status: EventStatus::Accepted,
            mechanical_summary: "You look around.".into(),
            location_name: "Square".into(),
            location_description: String::new(),
            snippets: vec![],
            spawned: None,
        };
        assert!(narrator.narrate(request).await.is_err());
    }

    #[tokio::test]
    async fn content_generator_parses_a_descriptor() {
        let generator = LlmContentGenerator::new(replying(
            r#"```json
{"name":"Old Tomas","kind":"npc","disposition":"friendly","description":"A baker.","hp":6}
```"#,
        ));
        let request = SpawnRequest {
            trigger: "sparse_npcs".into(),
            category: SpawnCategory::Npc,
            context: PacingContext {
                turn: 4,
                location: LocationId::new("square"),
                is_settlement: true,
                living_npcs: 0,
                others_alive: 0,
                hostiles: 0,
                recent_combat: 0,
                tension: 0.0,
            },
            location_name: "Town Square".into(),
        };
        let descriptor = generator.generate(request).await.expect("generate");
        assert_eq!(descriptor.name, "Old Tomas");
        assert_eq!(descriptor.kind, EntityKind::Npc);
        assert_eq!(descriptor.hp, Some(6));
    }
}
