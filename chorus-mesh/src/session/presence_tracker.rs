use crate::signaling::PresenceEvent;
use chorus_core::ParticipantId;
use std::collections::BTreeSet;

/// Roster changes caused by one presence event.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RosterDelta {
    pub added: Vec<ParticipantId>,
    pub removed: Vec<ParticipantId>,
}

impl RosterDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Difference between who is present and who has a peer connection.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub to_connect: Vec<ParticipantId>,
    pub to_teardown: Vec<ParticipantId>,
}

/// Who is in the voice session right now, regardless of negotiation progress.
///
/// The local participant is never part of its own roster.
#[derive(Debug)]
pub struct PresenceTracker {
    local: ParticipantId,
    roster: BTreeSet<ParticipantId>,
}

impl PresenceTracker {
    pub fn new(local: ParticipantId) -> Self {
        Self {
            local,
            roster: BTreeSet::new(),
        }
    }

    pub fn apply(&mut self, event: &PresenceEvent) -> RosterDelta {
        let mut delta = RosterDelta::default();
        match event {
            PresenceEvent::Snapshot(present) => {
                let incoming: BTreeSet<ParticipantId> = present
                    .iter()
                    .filter(|id| **id != self.local)
                    .cloned()
                    .collect();
                delta.removed = self.roster.difference(&incoming).cloned().collect();
                delta.added = incoming.difference(&self.roster).cloned().collect();
                self.roster = incoming;
            }
            PresenceEvent::Joined(id) | PresenceEvent::Heartbeat(id) => {
                if self.mark_present(id) {
                    delta.added.push(id.clone());
                }
            }
            PresenceEvent::Left(id) => {
                if self.mark_absent(id) {
                    delta.removed.push(id.clone());
                }
            }
        }
        delta
    }

    /// Returns `true` if the participant was not known to be present.
    pub fn mark_present(&mut self, id: &ParticipantId) -> bool {
        *id != self.local && self.roster.insert(id.clone())
    }

    pub fn mark_absent(&mut self, id: &ParticipantId) -> bool {
        self.roster.remove(id)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.roster.contains(id)
    }

    /// Present participants, in id order.
    pub fn participants(&self) -> impl Iterator<Item = &ParticipantId> {
        self.roster.iter()
    }

    pub fn reconcile(&self, connected: &[ParticipantId]) -> Reconciliation {
        let connected: BTreeSet<&ParticipantId> = connected.iter().collect();
        Reconciliation {
            to_connect: self
                .roster
                .iter()
                .filter(|id| !connected.contains(id))
                .cloned()
                .collect(),
            to_teardown: connected
                .into_iter()
                .filter(|id| !self.roster.contains(*id))
                .cloned()
                .collect(),
        }
    }

    pub fn clear(&mut self) {
        self.roster.clear();
    }
}
