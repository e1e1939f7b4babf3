//! One live game session.

use tokio_util::sync::CancellationToken;

use chronicle_domain::{SessionId, WorldState};

use crate::repositories::LedgerEngine;
use crate::use_cases::turn::{MetaReply, PlayTurn, SessionContext, TurnError, TurnReply};

/// A session's world, ledger cursor and director, plus its halt latch.
///
/// Turns are strictly sequential: callers hold the session behind a mutex
/// and every turn, snapshot and rewind takes `&mut self`.
pub struct GameSession {
    context: SessionContext,
    /// Label of the latest snapshot on the timeline
    last_good: Option<String>,
    halted: bool,
}

impl GameSession {
    pub fn new(context: SessionContext, last_good: Option<String>) -> Self {
        Self {
            context,
            last_good,
            halted: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.context.ledger.session_id()
    }

    pub fn state(&self) -> &WorldState {
        &self.context.state
    }

    pub fn ledger(&self) -> &LedgerEngine {
        &self.context.ledger
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn last_good(&self) -> Option<&str> {
        self.last_good.as_deref()
    }

    /// Run one input. After a fatal error the session refuses every further
    /// input with [`TurnError::SessionHalted`].
    pub async fn play(
        &mut self,
        turn: &PlayTurn,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnReply, TurnError> {
        if self.halted {
            return Err(TurnError::SessionHalted {
                last_good: self.last_good.clone(),
            });
        }

        match turn.execute(&mut self.context, input, cancel).await {
            Ok(reply) => {
                match &reply {
                    TurnReply::Turn(outcome) => {
                        if let Some(s) = &outcome.snapshot {
                            self.last_good = Some(format!("turn {} ({})", s.turn, s.reason));
                        }
                    }
                    TurnReply::Meta(MetaReply::Rewound { label, .. }) => {
                        self.last_good = Some(label.clone());
                    }
                    _ => {}
                }
                Ok(reply)
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(
                    session_id = %self.id(),
                    error = %e,
                    last_good = self.last_good.as_deref().unwrap_or("none"),
                    "Session halted"
                );
                self.halted = true;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
