//! The turn loop.
//!
//! One player input runs through seven stages in order: normalize, retrieve,
//! constrain, propose, validate, direct, render. Validate is the only place
//! the world state is written or an event appended; anything before it can
//! fail or be cancelled without a trace.

mod constrain;
mod meta;

pub use constrain::constrain;
pub use meta::MetaReply;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use chronicle_domain::{
    ActionDescriptor, ActionType, AppliedDelta, CanonKind, CanonRecord, ClassificationResult,
    EntityId, EventLedgerEntry, EventStatus, LocationId, PendingEvent, SnapshotReason, WorldState,
};

use crate::infrastructure::config::TurnConfig;
use crate::infrastructure::ports::{
    MemoryPort, MemorySnippet, NarrationRequest, NarratorPort, RandomPort, ServiceError,
    SnapshotSummary,
};
use crate::repositories::{LedgerEngine, LedgerError};
use crate::use_cases::classification::{ClassificationPipeline, Classified};
use crate::use_cases::director::{Director, SpawnPlan};
use crate::use_cases::rules::{is_long_rest, Proposal, RuleCalculator, RuleRejection};

/// Everything one session owns, threaded through every stage.
pub struct SessionContext {
    pub state: WorldState,
    pub ledger: LedgerEngine,
    pub director: Director,
}

/// What one input produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnReply {
    /// Blank input
    Ignored,
    Meta(MetaReply),
    Turn(Box<TurnOutcome>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub narrative: String,
    pub mechanical_summary: String,
    pub status: EventStatus,
    /// Sequence of the turn's event
    pub sequence: u64,
    pub classification: ClassificationResult,
    /// Name of the entity the director spawned this turn
    pub spawned: Option<String>,
    pub snapshot: Option<SnapshotSummary>,
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Turn cancelled before commit")]
    Cancelled,

    #[error("{}", halted_message(.last_good))]
    SessionHalted { last_good: Option<String> },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

fn halted_message(last_good: &Option<String>) -> String {
    match last_good {
        Some(label) => format!("Session halted; last known-good snapshot is {label}"),
        None => "Session halted; no known-good snapshot".to_string(),
    }
}

impl TurnError {
    /// Errors after which the session must not take further turns.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Cancelled => false,
            Self::SessionHalted { .. } => true,
            Self::Ledger(e) => e.is_fatal(),
        }
    }
}

/// The validate stage's verdict.
struct Committed {
    entry: EventLedgerEntry,
    classification: ClassificationResult,
    proposal: Option<Proposal>,
    applied: Option<AppliedDelta>,
}

pub struct PlayTurn {
    classification: ClassificationPipeline,
    memory: Arc<dyn MemoryPort>,
    narrator: Arc<dyn NarratorPort>,
    random: Arc<dyn RandomPort>,
    config: TurnConfig,
}

impl PlayTurn {
    pub fn new(
        classification: ClassificationPipeline,
        memory: Arc<dyn MemoryPort>,
        narrator: Arc<dyn NarratorPort>,
        random: Arc<dyn RandomPort>,
        config: TurnConfig,
    ) -> Self {
        Self {
            classification,
            memory,
            narrator,
            random,
            config,
        }
    }

    pub async fn execute(
        &self,
        session: &mut SessionContext,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnReply, TurnError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(TurnReply::Ignored);
        }
        let session_id = session.ledger.session_id();
        let turn = session.state.turn() + 1;

        // 1. Normalize
        let scene = scene_context(&session.state);
        let classified = match self.classification.classify(input, &scene).await {
            Classified::Meta(command) => {
                return meta::handle(session, command).await.map(TurnReply::Meta);
            }
            Classified::Action(result) => result,
        };
        tracing::debug!(
            %session_id,
            turn,
            stage = "normalize",
            action = %classified.action.action,
            source = %classified.source,
            confidence = classified.confidence,
            "Input classified"
        );
        ensure_live(cancel)?;

        // 2. Retrieve
        let recent = session
            .ledger
            .recent_events(self.config.recent_event_window)
            .await?;
        let snippets = self.retrieve(input).await;
        ensure_live(cancel)?;

        // 3. Constrain, 4. Propose
        let seed = self.random.gen_seed();
        let proposed = constrain(classified.clone(), &session.state).and_then(|constrained| {
            let calculator = RuleCalculator::for_system(constrained.action.rule_system());
            let proposal = calculator.propose(&constrained, &session.state, seed)?;
            Ok((constrained, proposal))
        });
        ensure_live(cancel)?;

        // 5. Validate
        let previous_location = session.state.player_location().ok().cloned();
        let committed = self.validate(session, turn, classified, proposed, seed).await?;

        let mut spawned = None;
        let mut snapshot = None;
        if committed.entry.is_accepted() {
            // 6. Direct
            let recent_combat = recent
                .iter()
                .chain(std::iter::once(&committed.entry))
                .rev()
                .take(self.config.recent_event_window)
                .filter(|e| e.is_accepted() && e.is_combat())
                .count();
            if let Some(plan) = session.director.plan(&session.state, recent_combat).await {
                spawned = self.commit_spawn(session, plan).await?;
            }

            if let Some(reason) = self.snapshot_reason(
                &session.state,
                previous_location.as_ref(),
                &committed,
            ) {
                let taken = session.ledger.take_snapshot(reason, &session.state).await?;
                snapshot = Some(SnapshotSummary::from(&taken));
            }
        }

        // 7. Render
        let mechanical_summary =
            mechanical_summary(&committed, spawned.as_ref(), snapshot.as_ref());
        let narrative = self
            .render(
                &session.state,
                input,
                committed.entry.status,
                &mechanical_summary,
                &snippets,
                spawned.as_ref().map(|s| s.name.as_str()),
            )
            .await;

        Ok(TurnReply::Turn(Box::new(TurnOutcome {
            narrative,
            mechanical_summary,
            status: committed.entry.status,
            sequence: committed.entry.sequence,
            classification: committed.classification,
            spawned: spawned.map(|s| s.name),
            snapshot,
        })))
    }

    async fn retrieve(&self, input: &str) -> Vec<MemorySnippet> {
        let timeout = self.config.retrieve_timeout;
        let retrieved = tokio::time::timeout(
            timeout,
            self.memory.retrieve(input, self.config.retrieve_limit),
        )
        .await
        .unwrap_or_else(|_| Err(ServiceError::timeout("memory", timeout)));
        match retrieved {
            Ok(snippets) => snippets,
            Err(e) => {
                tracing::warn!(
                    stage = "retrieve",
                    error = %e,
                    "Memory retrieval failed, continuing without it"
                );
                Vec::new()
            }
        }
    }

    /// The commit point. Applies the proposal to a working copy, appends the
    /// event, then swaps the live state. Refusals and invalid deltas append a
    /// rejected event and leave the state alone.
    async fn validate(
        &self,
        session: &mut SessionContext,
        turn: u32,
        classified: ClassificationResult,
        proposed: Result<(ClassificationResult, Proposal), RuleRejection>,
        seed: u64,
    ) -> Result<Committed, TurnError> {
        let actor = session.state.player_id().clone();

        let (constrained, proposal) = match proposed {
            Ok(proposed) => proposed,
            Err(rejection) => {
                let entry = self
                    .reject(session, turn, actor, &classified.action, &rejection.0, None)
                    .await?;
                return Ok(Committed {
                    entry,
                    classification: classified,
                    proposal: None,
                    applied: None,
                });
            }
        };

        let (next, applied) = match session.state.apply_turn(&proposal.delta) {
            Ok(applied) => applied,
            Err(e) => {
                let entry = self
                    .reject(session, turn, actor, &constrained.action, &e.to_string(), Some(seed))
                    .await?;
                return Ok(Committed {
                    entry,
                    classification: constrained,
                    proposal: Some(proposal),
                    applied: None,
                });
            }
        };

        let entry = session
            .ledger
            .append_event(
                PendingEvent::accepted(
                    turn,
                    actor,
                    constrained.action.clone(),
                    applied.delta.clone(),
                    seed,
                    proposal.summary.clone(),
                )
                .with_difficulty(constrained.difficulty),
            )
            .await?;
        session.state = next;
        tracing::info!(
            session_id = %session.ledger.session_id(),
            turn,
            sequence = entry.sequence,
            action = %constrained.action.action,
            changes = applied.delta.len(),
            "Turn committed"
        );

        for dead in &applied.deaths {
            let name = session
                .state
                .entity(dead)
                .map(|e| e.name.clone())
                .unwrap_or_else(|| dead.to_string());
            let content =
                serde_json::json!({ "entity": dead, "name": name, "event": entry.sequence });
            session
                .ledger
                .append_canon(CanonRecord::new(CanonKind::Death, turn, content.to_string()))
                .await?;
        }
        for (quest, outcome) in applied.resolved_quests() {
            let content =
                serde_json::json!({ "quest": quest, "outcome": outcome, "event": entry.sequence });
            session
                .ledger
                .append_canon(CanonRecord::new(
                    CanonKind::QuestResolved,
                    turn,
                    content.to_string(),
                ))
                .await?;
        }

        Ok(Committed {
            entry,
            classification: constrained,
            proposal: Some(proposal),
            applied: Some(applied),
        })
    }

    async fn reject(
        &self,
        session: &mut SessionContext,
        turn: u32,
        actor: EntityId,
        action: &ActionDescriptor,
        reason: &str,
        seed: Option<u64>,
    ) -> Result<EventLedgerEntry, TurnError> {
        tracing::debug!(turn, action = %action.action, reason, "Action refused");
        Ok(session
            .ledger
            .append_event(PendingEvent::rejected(turn, actor, action.clone(), reason, seed))
            .await?)
    }

    async fn commit_spawn(
        &self,
        session: &mut SessionContext,
        plan: SpawnPlan,
    ) -> Result<Option<SpawnPlan>, TurnError> {
        let (next, applied) = match session.state.apply_delta(&plan.delta) {
            Ok(applied) => applied,
            Err(e) => {
                tracing::warn!(
                    trigger = %plan.trigger,
                    error = %e,
                    "Director spawn does not fit the world, skipping"
                );
                return Ok(None);
            }
        };
        let turn = session.state.turn();
        let entry = session
            .ledger
            .append_event(PendingEvent::director_spawn(
                turn,
                session.state.player_id().clone(),
                plan.trigger.clone(),
                applied.delta,
                plan.description.clone(),
            ))
            .await?;
        session.state = next;
        session.director.mark_fired(&plan.trigger, turn);
        tracing::info!(
            turn,
            sequence = entry.sequence,
            trigger = %plan.trigger,
            entity = %plan.entity_id,
            "Director spawned content"
        );
        Ok(Some(plan))
    }

    fn snapshot_reason(
        &self,
        state: &WorldState,
        previous_location: Option<&LocationId>,
        committed: &Committed,
    ) -> Option<SnapshotReason> {
        let action = &committed.classification.action;
        let rested = action.action == ActionType::Rest
            && is_long_rest(action)
            && committed.proposal.as_ref().is_some_and(|p| p.succeeded);
        if rested {
            return Some(SnapshotReason::LongRest);
        }

        let region_now = state
            .player_location()
            .ok()
            .and_then(|loc| state.region_of(loc));
        let region_before = previous_location.and_then(|loc| state.region_of(loc));
        if region_before.is_some() && region_now.is_some() && region_before != region_now {
            return Some(SnapshotReason::RegionChange);
        }

        if state.turn() > 0 && state.turn() % self.config.snapshot_interval == 0 {
            return Some(SnapshotReason::Interval);
        }
        None
    }

    async fn render(
        &self,
        state: &WorldState,
        input: &str,
        status: EventStatus,
        mechanical_summary: &str,
        snippets: &[MemorySnippet],
        spawned: Option<&str>,
    ) -> String {
        let location = state
            .player_location()
            .ok()
            .and_then(|id| state.location(id));
        let request = NarrationRequest {
            player_input: input.to_string(),
            status,
            mechanical_summary: mechanical_summary.to_string(),
            location_name: location.map(|l| l.name.clone()).unwrap_or_default(),
            location_description: location.map(|l| l.description.clone()).unwrap_or_default(),
            snippets: snippets.to_vec(),
            spawned: spawned.map(str::to_string),
        };

        let timeout = self.config.render_timeout;
        let narrated = tokio::time::timeout(timeout, self.narrator.narrate(request))
            .await
            .unwrap_or_else(|_| Err(ServiceError::timeout("narrator", timeout)));
        match narrated {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => mechanical_summary.to_string(),
            Err(e) => {
                tracing::warn!(
                    stage = "render",
                    error = %e,
                    "Narration unavailable, using the mechanical summary"
                );
                mechanical_summary.to_string()
            }
        }
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), TurnError> {
    if cancel.is_cancelled() {
        return Err(TurnError::Cancelled);
    }
    Ok(())
}

/// One-paragraph scene description for the classifier.
fn scene_context(state: &WorldState) -> String {
    let Some(location) = state
        .player_location()
        .ok()
        .and_then(|id| state.location(id))
    else {
        return format!("Turn {}.", state.turn());
    };
    let present: Vec<&str> = state
        .others_alive_at(&location.id)
        .map(|e| e.name.as_str())
        .collect();
    let exits: Vec<&str> = location.exits.keys().map(String::as_str).collect();
    let mut scene = format!("Turn {}. The player is at {}.", state.turn(), location.name);
    if !present.is_empty() {
        scene.push_str(&format!(" Present: {}.", present.join(", ")));
    }
    if !exits.is_empty() {
        scene.push_str(&format!(" Exits: {}.", exits.join(", ")));
    }
    scene
}

fn mechanical_summary(
    committed: &Committed,
    spawned: Option<&SpawnPlan>,
    snapshot: Option<&SnapshotSummary>,
) -> String {
    let mut lines = Vec::new();
    match &committed.entry.rejection_reason {
        Some(reason) => lines.push(reason.clone()),
        None => {
            if let Some(proposal) = &committed.proposal {
                lines.push(proposal.summary.clone());
            }
        }
    }
    if let Some(proposal) = &committed.proposal {
        lines.extend(proposal.dice.iter().map(|d| format!("  [{d}]")));
    }
    if let Some(applied) = &committed.applied {
        lines.extend(applied.clamps.iter().map(|c| format!("  ({c})")));
    }
    if let Some(plan) = spawned {
        lines.push(format!("{}.", plan.description));
    }
    if let Some(snapshot) = snapshot {
        lines.push(format!("(snapshot saved: turn {} ({}))", snapshot.turn, snapshot.reason));
    }
    lines.join("\n")
}
