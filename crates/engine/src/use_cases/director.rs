//! Director trigger scheduler.
//!
//! Runs after every committed turn. At most one trigger fires per turn: the
//! ready trigger whose condition holds with the highest weighted pacing
//! score, ties going to the one registered first. The chosen trigger asks
//! the content generator for an entity, which joins the same turn as a
//! `director_spawn` event.

use std::sync::Arc;
use std::time::Duration;

use chronicle_domain::{
    DirectorTrigger, EntityId, EventKind, EventLedgerEntry, PacingContext, SpawnRequest,
    StateChange, StateDelta, WorldState,
};

use crate::infrastructure::ports::{ContentGeneratorPort, ServiceError};

/// A spawn ready to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnPlan {
    pub trigger: String,
    pub entity_id: EntityId,
    pub name: String,
    pub delta: StateDelta,
    pub description: String,
}

pub struct Director {
    generator: Arc<dyn ContentGeneratorPort>,
    triggers: Vec<DirectorTrigger>,
    timeout: Duration,
}

impl Director {
    pub fn new(
        generator: Arc<dyn ContentGeneratorPort>,
        triggers: Vec<DirectorTrigger>,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            triggers,
            timeout,
        }
    }

    pub fn triggers(&self) -> &[DirectorTrigger] {
        &self.triggers
    }

    /// Index of the trigger that would fire in `ctx`, if any.
    pub fn select(&self, ctx: &PacingContext) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (index, trigger) in self.triggers.iter().enumerate() {
            if !trigger.is_ready(ctx.turn) || !trigger.condition.holds(ctx) {
                continue;
            }
            let score = trigger.score(ctx);
            if score <= 0.0 {
                continue;
            }
            // Strictly greater: an equal score never displaces an earlier trigger.
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((index, score));
            }
        }
        best.map(|(index, _)| index)
    }

    /// Pick a trigger and generate its content. Nothing is marked fired; the
    /// caller does that once the spawn is committed.
    pub async fn plan(&self, state: &WorldState, recent_combat: usize) -> Option<SpawnPlan> {
        let ctx = match PacingContext::from_state(state, recent_combat) {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::warn!(error = %e, "Director could not read the pacing context");
                return None;
            }
        };
        let trigger = &self.triggers[self.select(&ctx)?];
        tracing::debug!(
            trigger = %trigger.name,
            tension = ctx.tension,
            turn = ctx.turn,
            "Director trigger selected"
        );

        let location = ctx.location.clone();
        let location_name = state
            .location(&location)
            .map(|l| l.name.clone())
            .unwrap_or_else(|| location.to_string());
        let request = SpawnRequest {
            trigger: trigger.name.clone(),
            category: trigger.category,
            context: ctx.clone(),
            location_name: location_name.clone(),
        };

        let generated = tokio::time::timeout(self.timeout, self.generator.generate(request))
            .await
            .unwrap_or_else(|_| Err(ServiceError::timeout("content_generator", self.timeout)));
        let descriptor = match generated {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::warn!(
                    trigger = %trigger.name,
                    turn = ctx.turn,
                    error = %e,
                    "Director generation failed, skipping spawn"
                );
                return None;
            }
        };

        let entity_id = spawn_id(state, &descriptor.name, ctx.turn);
        let name = descriptor.name.clone();
        let entity = descriptor.into_entity(entity_id.clone(), location);
        Some(SpawnPlan {
            trigger: trigger.name.clone(),
            description: format!("{} appears at {}", name, location_name),
            delta: StateDelta::new().with(StateChange::SpawnEntity {
                entity: Box::new(entity),
            }),
            entity_id,
            name,
        })
    }

    pub fn mark_fired(&mut self, trigger: &str, turn: u32) {
        if let Some(t) = self.triggers.iter_mut().find(|t| t.name == trigger) {
            t.mark_fired(turn);
        }
    }

    /// Reset cooldowns and replay them from the `director_spawn` events on
    /// the current timeline.
    pub fn rebuild<'a>(&mut self, events: impl IntoIterator<Item = &'a EventLedgerEntry>) {
        for trigger in &mut self.triggers {
            trigger.reset();
        }
        for event in events {
            if event.kind != EventKind::DirectorSpawn {
                continue;
            }
            if let Some(name) = &event.trigger {
                self.mark_fired(name, event.turn);
            }
        }
    }
}

/// `<slug>_t<turn>`, suffixed further if the world already has that id.
fn spawn_id(state: &WorldState, name: &str, turn: u32) -> EntityId {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    let slug = if slug.is_empty() { "spawn".to_string() } else { slug };

    let base = format!("{slug}_t{turn}");
    let mut candidate = EntityId::new(base.clone());
    let mut n = 2;
    while state.entity(&candidate).is_some() {
        candidate = EntityId::new(format!("{base}_{n}"));
        n += 1;
    }
    candidate
}
