//! Commands about the game rather than in it. None of them creates a turn.

use chronicle_domain::{MetaCommand, SnapshotId, WorldState};

use crate::infrastructure::ports::SnapshotSummary;
use crate::repositories::LedgerError;

use super::{SessionContext, TurnError};

/// The answer to a meta command.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaReply {
    Text(String),
    Rewound {
        snapshot_id: SnapshotId,
        label: String,
        turn: u32,
        loop_count: u32,
    },
    Quit,
}

const HELP: &str = "\
Type what you want to do: \"go north\", \"attack the goblin\", \"talk to mara\",
\"cast fire bolt on goblin\", \"buy rope\", \"rest long\", or anything else you can imagine.

  inventory (i)     what you carry
  character         your condition and abilities
  snapshots         saved points on this timeline
  rewind [target]   return to the latest snapshot, or one named by turn or id
  help              this text
  quit              leave the game";

pub(super) async fn handle(
    session: &mut SessionContext,
    command: MetaCommand,
) -> Result<MetaReply, TurnError> {
    tracing::debug!(command = ?command, "Meta command");
    match command {
        MetaCommand::Help => Ok(MetaReply::Text(HELP.to_string())),
        MetaCommand::Quit => Ok(MetaReply::Quit),
        MetaCommand::Inventory => Ok(MetaReply::Text(describe_inventory(&session.state))),
        MetaCommand::Character => Ok(MetaReply::Text(describe_character(&session.state))),
        MetaCommand::Snapshots => {
            let snapshots = session.ledger.timeline_snapshots().await?;
            Ok(MetaReply::Text(describe_snapshots(&snapshots)))
        }
        MetaCommand::Rewind(target) => rewind(session, target.as_deref()).await,
    }
}

async fn rewind(
    session: &mut SessionContext,
    target: Option<&str>,
) -> Result<MetaReply, TurnError> {
    let timeline = session.ledger.timeline_snapshots().await?;
    let chosen = match target {
        None => timeline.last().map(|s| s.id),
        Some(name) => {
            let everything = session.ledger.list_snapshots().await?;
            resolve_snapshot(&timeline, &everything, name)
        }
    };
    let Some(snapshot_id) = chosen else {
        let text = match target {
            Some(name) => format!("No snapshot matches \"{name}\"."),
            None => "There is no snapshot to return to.".to_string(),
        };
        return Ok(MetaReply::Text(text));
    };

    let actor = session.state.player_id().clone();
    let snapshot = match session.ledger.rewind(snapshot_id, actor).await {
        Ok(snapshot) => snapshot,
        Err(LedgerError::SnapshotNotFound(id)) => {
            return Ok(MetaReply::Text(format!("Snapshot {id} is gone.")));
        }
        Err(e) => return Err(e.into()),
    };

    session.state = snapshot.state.clone();
    let timeline_events = session
        .ledger
        .recent_events(session.ledger.lineage().len() as usize)
        .await?;
    session.director.rebuild(&timeline_events);

    Ok(MetaReply::Rewound {
        snapshot_id,
        label: snapshot.label(),
        turn: snapshot.turn,
        loop_count: session.ledger.loop_count(),
    })
}

/// A named rewind target: `turn 20` / `20` picks the latest timeline snapshot
/// at that turn, anything else is matched as an id prefix.
fn resolve_snapshot(
    timeline: &[SnapshotSummary],
    everything: &[SnapshotSummary],
    name: &str,
) -> Option<SnapshotId> {
    let name = name.trim().to_lowercase();
    let turn = name.strip_prefix("turn").unwrap_or(&name).trim();
    if let Ok(turn) = turn.parse::<u32>() {
        return timeline.iter().rev().find(|s| s.turn == turn).map(|s| s.id);
    }
    if name.len() < 4 {
        return None;
    }
    everything
        .iter()
        .find(|s| s.id.to_string().starts_with(&name))
        .map(|s| s.id)
}

fn describe_inventory(state: &WorldState) -> String {
    let Ok(player) = state.player() else {
        return "You have nothing.".to_string();
    };
    if player.inventory.is_empty() {
        return "You carry nothing.".to_string();
    }
    let mut lines = vec!["You carry:".to_string()];
    for (item, quantity) in &player.inventory {
        let worn = if player.equipped.contains(item) { " (equipped)" } else { "" };
        lines.push(format!("  {quantity} x {item}{worn}"));
    }
    lines.join("\n")
}

fn describe_character(state: &WorldState) -> String {
    let Ok(player) = state.player() else {
        return "There is no one to describe.".to_string();
    };
    let mut lines = vec![format!("{} (turn {})", player.name, state.turn())];
    for (kind, pool) in &player.resources {
        lines.push(format!("  {kind}: {}/{}", pool.current(), pool.max()));
    }
    if !player.stats.is_empty() {
        let stats: Vec<String> = player
            .stats
            .iter()
            .map(|(name, value)| format!("{name} {value:+}"))
            .collect();
        lines.push(format!("  {}", stats.join(", ")));
    }
    if !player.conditions.is_empty() {
        let conditions: Vec<String> = player.conditions.iter().map(ToString::to_string).collect();
        lines.push(format!("  conditions: {}", conditions.join(", ")));
    }
    lines.join("\n")
}

fn describe_snapshots(snapshots: &[SnapshotSummary]) -> String {
    if snapshots.is_empty() {
        return "No snapshots yet.".to_string();
    }
    let mut lines = vec!["Snapshots on this timeline:".to_string()];
    for (index, s) in snapshots.iter().enumerate() {
        let id = s.id.to_string();
        lines.push(format!(
            "  {}. turn {} ({}) [{}]",
            index + 1,
            s.turn,
            s.reason,
            id.get(..8).unwrap_or(&id)
        ));
    }
    lines.join("\n")
}
