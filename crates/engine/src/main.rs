//! Chronicle Engine - line-oriented REPL.
//!
//! `chronicle-engine` starts a new session in the starter world;
//! `chronicle-engine <session-id>` resumes a saved one.

use std::io::Write;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chronicle_domain::SessionId;
use chronicle_engine::app::{starter_world, App};
use chronicle_engine::infrastructure::config::EngineConfig;
use chronicle_engine::use_cases::turn::{MetaReply, TurnError, TurnReply};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv_from_repo_root();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chronicle_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = EngineConfig::from_env();
    tracing::info!(
        database = %config.database_path,
        model = %config.ollama_model,
        verification = ?config.chain_verification,
        "Starting Chronicle Engine"
    );

    let app = App::connect(config).await.context("opening the ledger store")?;

    let session = match std::env::args().nth(1) {
        Some(id) => {
            let id: SessionId = id.parse().context("session id must be a UUID")?;
            app.sessions
                .open(id)
                .await
                .with_context(|| format!("loading session {id}"))?
        }
        None => app
            .sessions
            .create("New adventure", starter_world()?)
            .await
            .context("creating a session")?,
    };
    let session_id = session.lock().await.id();
    println!("Session {session_id}. Type \"help\" for commands.\n");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = cancel.cancelled() => None,
        };
        let Some(line) = line else { break };

        let result = session
            .lock()
            .await
            .play(&app.play_turn, &line, &cancel)
            .await;
        match result {
            Ok(TurnReply::Ignored) => {}
            Ok(TurnReply::Turn(outcome)) => {
                println!("\n{}\n", outcome.narrative);
                if outcome.narrative != outcome.mechanical_summary {
                    for line in outcome.mechanical_summary.lines() {
                        println!("  | {line}");
                    }
                    println!();
                }
            }
            Ok(TurnReply::Meta(MetaReply::Text(text))) => println!("{text}\n"),
            Ok(TurnReply::Meta(MetaReply::Rewound {
                label, loop_count, ..
            })) => {
                println!("Time folds back to {label}. (loop {loop_count})\n");
            }
            Ok(TurnReply::Meta(MetaReply::Quit)) => break,
            Err(TurnError::Cancelled) => break,
            Err(e) if e.is_fatal() => {
                eprintln!("\nThe chronicle cannot continue: {e}");
                return Err(e.into());
            }
            Err(e) => eprintln!("{e}"),
        }
    }

    println!("Farewell. Resume with: chronicle-engine {session_id}");
    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
