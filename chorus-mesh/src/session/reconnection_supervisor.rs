use crate::peer::PeerTable;
use chorus_core::ParticipantId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAt(Instant),
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Backing off until the instant.
    Waiting(Instant),
    /// A fresh attempt is under way.
    Retrying,
    GaveUp,
}

#[derive(Debug)]
struct RetryState {
    failures: u32,
    phase: Phase,
}

/// Failure bookkeeping for the peers of one session.
///
/// Each failure schedules exactly one retry after a fixed backoff. Once the number of
/// consecutive failures exceeds `max_attempts` the peer is given up on until it rejoins.
#[derive(Debug)]
pub struct ReconnectionSupervisor {
    backoff: Duration,
    max_attempts: Option<u32>,
    negotiation_timeout: Duration,
    peers: HashMap<ParticipantId, RetryState>,
}

impl ReconnectionSupervisor {
    pub fn new(backoff: Duration, max_attempts: Option<u32>, negotiation_timeout: Duration) -> Self {
        Self {
            backoff,
            max_attempts,
            negotiation_timeout,
            peers: HashMap::new(),
        }
    }

    pub fn on_failed(&mut self, id: &ParticipantId, now: Instant) -> RetryDecision {
        let state = self.peers.entry(id.clone()).or_insert(RetryState {
            failures: 0,
            phase: Phase::Retrying,
        });
        state.failures += 1;

        if self.max_attempts.is_some_and(|max| state.failures > max) {
            state.phase = Phase::GaveUp;
            return RetryDecision::GiveUp;
        }
        let at = now + self.backoff;
        state.phase = Phase::Waiting(at);
        RetryDecision::RetryAt(at)
    }

    pub fn on_connected(&mut self, id: &ParticipantId) {
        self.peers.remove(id);
    }

    pub fn forget(&mut self, id: &ParticipantId) {
        self.peers.remove(id);
    }

    /// The remote side started a new attempt on its own. Keeps the failure count.
    pub fn cancel_wait(&mut self, id: &ParticipantId) {
        if let Some(state) = self.peers.get_mut(id) {
            state.phase = Phase::Retrying;
        }
    }

    /// A fresh `Join` gives an abandoned peer a new budget of attempts.
    pub fn reset_if_given_up(&mut self, id: &ParticipantId) -> bool {
        let given_up = self
            .peers
            .get(id)
            .is_some_and(|state| state.phase == Phase::GaveUp);
        if given_up {
            self.peers.remove(id);
        }
        given_up
    }

    /// No new connection may be created for a participant that is backing off or given up.
    pub fn is_blocked(&self, id: &ParticipantId) -> bool {
        self.peers
            .get(id)
            .is_some_and(|state| matches!(state.phase, Phase::Waiting(_) | Phase::GaveUp))
    }

    pub fn is_given_up(&self, id: &ParticipantId) -> bool {
        self.peers
            .get(id)
            .is_some_and(|state| state.phase == Phase::GaveUp)
    }

    pub fn failures(&self, id: &ParticipantId) -> u32 {
        self.peers.get(id).map(|state| state.failures).unwrap_or(0)
    }

    /// Participants whose backoff elapsed. They move to `Retrying`.
    pub fn due(&mut self, now: Instant) -> Vec<ParticipantId> {
        let mut due = Vec::new();
        for (id, state) in self.peers.iter_mut() {
            if let Phase::Waiting(at) = state.phase {
                if at <= now {
                    state.phase = Phase::Retrying;
                    due.push(id.clone());
                }
            }
        }
        due.sort();
        due
    }

    /// Peers stuck short of `Connected` for longer than the negotiation timeout.
    pub fn expired(&self, peers: &PeerTable, now: Instant) -> Vec<ParticipantId> {
        let mut expired: Vec<ParticipantId> = peers
            .iter()
            .filter(|(_, entry)| entry.connection.is_timed_out(now, self.negotiation_timeout))
            .map(|(id, _)| id.clone())
            .collect();
        expired.sort();
        expired
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }
}
