use serde::{Deserialize, Serialize};

use super::{EventKind, EventLedgerEntry};

/// The event sequences that make up the current timeline.
///
/// The event ledger only grows. After a rewind the entries between the
/// snapshot and the fork stay in the ledger but drop out of the lineage, so
/// "recent history" and cooldown bookkeeping only see the timeline the player
/// is actually on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    /// Inclusive, ascending, non-overlapping ranges
    segments: Vec<(u64, u64)>,
}

impl Lineage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the full event ledger in sequence order.
    pub fn rebuild<'a>(events: impl IntoIterator<Item = &'a EventLedgerEntry>) -> Self {
        let mut lineage = Self::new();
        for event in events {
            lineage.record(event);
        }
        lineage
    }

    /// Account for a freshly appended event. A fork puts back the timeline
    /// its snapshot was taken on, which may be a branch an earlier fork left.
    pub fn record(&mut self, event: &EventLedgerEntry) {
        if event.kind == EventKind::Fork {
            if let Some(fork) = &event.fork {
                if fork.timeline.is_empty() {
                    self.cut_to(fork.event_offset);
                } else {
                    self.segments = fork.timeline.segments.clone();
                }
            }
        }
        self.push(event.sequence);
    }

    pub fn push(&mut self, sequence: u64) {
        match self.segments.last_mut() {
            Some((_, end)) if *end + 1 == sequence => *end = sequence,
            Some((_, end)) if *end >= sequence => {}
            _ => self.segments.push((sequence, sequence)),
        }
    }

    /// Drop every sequence after `offset`.
    pub fn cut_to(&mut self, offset: u64) {
        self.segments.retain(|(start, _)| *start <= offset);
        if let Some((_, end)) = self.segments.last_mut() {
            *end = (*end).min(offset);
        }
    }

    pub fn contains(&self, sequence: u64) -> bool {
        self.segments
            .iter()
            .any(|(start, end)| (*start..=*end).contains(&sequence))
    }

    pub fn len(&self) -> u64 {
        self.segments.iter().map(|(start, end)| end - start + 1).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn head(&self) -> Option<u64> {
        self.segments.last().map(|(_, end)| *end)
    }

    /// The last `n` sequences on the timeline, oldest first.
    pub fn recent(&self, n: usize) -> Vec<u64> {
        let mut out: Vec<u64> = self
            .segments
            .iter()
            .rev()
            .flat_map(|(start, end)| (*start..=*end).rev())
            .take(n)
            .collect();
        out.reverse();
        out
    }

    pub fn segments(&self) -> &[(u64, u64)] {
        &self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{EntityId, SessionId, SnapshotId};
    use crate::ledger::{ForkMarker, PendingEvent};
    use crate::value_objects::{ActionDescriptor, ActionType, StateDelta};
    use chrono::Utc;

    fn turn(sequence: u64) -> EventLedgerEntry {
        let action = ActionDescriptor::new(ActionType::Look, "look");
        let player = EntityId::new("player");
        PendingEvent::accepted(sequence as u32, player, action, StateDelta::new(), 0, "")
            .into_entry(SessionId::new(), sequence, Utc::now())
    }

    fn fork_to(sequence: u64, event_offset: u64, timeline: Lineage) -> EventLedgerEntry {
        let marker = ForkMarker {
            snapshot_id: SnapshotId::new(),
            event_offset,
            turn: event_offset as u32,
            loop_count: 1,
            timeline,
        };
        PendingEvent::fork(EntityId::new("player"), marker)
            .into_entry(SessionId::new(), sequence, Utc::now())
    }

    fn fork(sequence: u64, event_offset: u64) -> EventLedgerEntry {
        fork_to(sequence, event_offset, Lineage::new())
    }

    #[test]
    fn contiguous_events_form_one_segment() {
        let events: Vec<_> = (1..=5).map(turn).collect();
        let lineage = Lineage::rebuild(&events);
        assert_eq!(lineage.segments(), &[(1, 5)]);
        assert_eq!(lineage.len(), 5);
    }

    #[test]
    fn a_fork_cuts_the_abandoned_branch() {
        let mut events: Vec<_> = (1..=25).map(turn).collect();
        events.push(fork(26, 20));
        events.push(turn(27));
        let lineage = Lineage::rebuild(&events);

        assert_eq!(lineage.segments(), &[(1, 20), (26, 27)]);
        assert!(!lineage.contains(21));
        assert!(!lineage.contains(25));
        assert!(lineage.contains(26));
        assert_eq!(lineage.recent(3), vec![20, 26, 27]);
        assert_eq!(lineage.head(), Some(27));
    }

    #[test]
    fn rewinding_to_genesis_keeps_only_the_fork() {
        let mut events: Vec<_> = (1..=3).map(turn).collect();
        events.push(fork(4, 0));
        let lineage = Lineage::rebuild(&events);
        assert_eq!(lineage.segments(), &[(4, 4)]);
    }

    #[test]
    fn a_fork_can_return_to_an_abandoned_branch() {
        // 1-2, snapshot, 3-4, snapshot, back to 2, then forward to 4 again.
        let mut events: Vec<_> = (1..=4).map(turn).collect();
        let at_two = Lineage::rebuild(&events[..2]);
        let at_four = Lineage::rebuild(&events);
        events.push(fork_to(5, 2, at_two));
        events.push(fork_to(6, 4, at_four));

        let lineage = Lineage::rebuild(&events);
        assert_eq!(lineage.segments(), &[(1, 4), (6, 6)]);
        assert!(lineage.contains(3));
        assert!(!lineage.contains(5));
        assert_eq!(lineage.recent(3), vec![3, 4, 6]);
    }
}
