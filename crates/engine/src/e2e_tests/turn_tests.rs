//! Whole turns through the application: classification, resolution, commit,
//! director and rendering.

use std::time::Duration;

use chronicle_domain::{
    ActionType, ClassificationSource, DifficultyClass, DirectorTrigger, EventStatus,
    PacingContext, SpawnCategory, TriggerCondition,
};

use super::{arena, E2ETestContext, FixedPlausibility, ScriptedClassifier};
use crate::use_cases::director::Director;

#[tokio::test]
async fn attacking_the_goblin_commits_one_event_and_spawns_nothing() {
    let ctx = E2ETestContext::setup().await;
    let session = ctx.new_session().await;

    let outcome = ctx.turn(&session, "attack goblin").await;

    assert_eq!(outcome.status, EventStatus::Accepted);
    assert_eq!(outcome.classification.source, ClassificationSource::Pattern);
    assert!(outcome.spawned.is_none());
    assert_eq!(ctx.generator.calls(), 0);

    let s = session.lock().await;
    assert_eq!(s.ledger().event_head(), 1);
    let goblin = s.state().entity(&"goblin".into()).expect("goblin");
    assert_eq!(goblin.hp().map(|hp| hp.current()), Some(8));

    let events = s.ledger().recent_events(5).await.expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].turn, 1);
    assert!(events[0].rng_seed.is_some());
    assert_eq!(outcome.narrative, outcome.mechanical_summary);
}

#[tokio::test]
async fn gibberish_becomes_a_hard_attempt() {
    let ctx = E2ETestContext::setup_with(
        ScriptedClassifier::answering("attack", 0.1),
        FixedPlausibility(5),
    )
    .await;
    let session = ctx.new_session().await;

    let outcome = ctx.turn(&session, "asdlkfj").await;

    let classified = &outcome.classification;
    assert_eq!(classified.action.action, ActionType::Attempt);
    assert_eq!(classified.source, ClassificationSource::Plausibility);
    assert!((classified.confidence - 0.1).abs() < 1e-6);
    assert_eq!(classified.plausibility, Some(5));
    let dc = classified.difficulty.expect("difficulty");
    assert_eq!(dc, DifficultyClass::from_plausibility(5));
    assert!(dc.value() >= 25, "{dc} is not hard");
    assert!(!classified.degraded);

    assert_eq!(outcome.status, EventStatus::Accepted);
    assert_eq!(session.lock().await.ledger().event_head(), 1);
}

#[tokio::test]
async fn a_stalled_classifier_still_yields_a_turn_within_budget() {
    let ctx = E2ETestContext::setup_with(
        ScriptedClassifier::stalled(Duration::from_secs(30)),
        FixedPlausibility(50),
    )
    .await;
    let session = ctx.new_session().await;

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        ctx.turn(&session, "xyzzy plugh"),
    )
    .await
    .expect("the turn finished within its budget");

    assert_eq!(outcome.classification.action.action, ActionType::Attempt);
    assert!(outcome.classification.degraded);
    assert_eq!(outcome.status, EventStatus::Accepted);
}

#[tokio::test]
async fn sessions_do_not_share_state() {
    let ctx = E2ETestContext::setup().await;
    let first = ctx.new_session().await;
    let second = ctx.new_session().await;

    ctx.turn(&first, "attack goblin").await;

    let second = second.lock().await;
    assert_eq!(second.state(), &arena());
    assert_eq!(second.ledger().event_head(), 0);
    assert_eq!(ctx.app.sessions.saved().await.expect("saved").len(), 2);
}

#[tokio::test]
async fn the_pacing_hook_fires_on_the_tenth_turn() {
    let ctx = E2ETestContext::setup().await;
    let session = ctx.new_session().await;

    for turn in 1..=10 {
        let outcome = ctx.turn(&session, "look").await;
        if turn < 10 {
            assert!(outcome.spawned.is_none(), "spawn on turn {turn}");
        } else {
            assert_eq!(outcome.spawned.as_deref(), Some("Crow"));
        }
    }
    assert_eq!(ctx.generator.calls(), 1);

    let s = session.lock().await;
    let crow = s.state().entity(&"crow_t10".into()).expect("crow");
    assert_eq!(crow.location.as_str(), "clearing");
    assert_eq!(s.ledger().event_head(), 11);
}

#[tokio::test]
async fn tied_triggers_always_resolve_to_the_first_registered() {
    let ctx = E2ETestContext::setup().await;
    let pacing = PacingContext::from_state(&arena(), 0).expect("context");
    let triggers = || {
        ["first", "second", "third"]
            .into_iter()
            .map(|name| {
                DirectorTrigger::new(
                    name,
                    SpawnCategory::Flavor,
                    TriggerCondition::TensionAtLeast { threshold: 0.0 },
                    3,
                    1.0,
                )
            })
            .collect::<Vec<_>>()
    };

    for _ in 0..50 {
        let director = Director::new(ctx.generator.clone(), triggers(), Duration::from_secs(1));
        assert_eq!(director.select(&pacing), Some(0));
    }

    let mut director = Director::new(ctx.generator.clone(), triggers(), Duration::from_secs(1));
    director.mark_fired("first", pacing.turn);
    assert_eq!(director.select(&pacing), Some(1));
}
