use crate::error::MeshError;
use crate::signaling::{PresenceEvent, SignalingEvent, SignalingTransport, Subscription, SubscriptionId};
use async_trait::async_trait;
use bytes::Bytes;
use chorus_core::{ParticipantId, SessionId};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Payloads kept per session for [`MemorySignalingHub::transcript`].
pub const TRANSCRIPT_CAPACITY: usize = 1024;

struct Member {
    subscription: SubscriptionId,
    participant: ParticipantId,
    tx: mpsc::UnboundedSender<SignalingEvent>,
}

struct HubInner {
    sessions: DashMap<SessionId, Vec<Member>>,
    transcripts: DashMap<SessionId, VecDeque<Bytes>>,
    transcript_capacity: usize,
    reachable: AtomicBool,
}

/// In-process signaling transport.
///
/// Every participant of every session shares one hub. Published payloads are delivered to
/// all subscribers of the session, the publisher included.
#[derive(Clone)]
pub struct MemorySignalingHub {
    inner: Arc<HubInner>,
}

impl Default for MemorySignalingHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySignalingHub {
    pub fn new() -> Self {
        Self::with_transcript_capacity(TRANSCRIPT_CAPACITY)
    }

    /// A hub remembering at most `capacity` published payloads per session.
    pub fn with_transcript_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                sessions: DashMap::new(),
                transcripts: DashMap::new(),
                transcript_capacity: capacity,
                reachable: AtomicBool::new(true),
            }),
        }
    }

    /// While unreachable, subscribe and publish fail with `TransportUnavailable`.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Tells everyone else that `participant` left, without touching its subscription.
    pub fn evict_presence(&self, session: &SessionId, participant: &ParticipantId) {
        self.notify_others(session, participant, PresenceEvent::Left(participant.clone()));
    }

    pub fn heartbeat(&self, session: &SessionId, participant: &ParticipantId) {
        self.notify_others(
            session,
            participant,
            PresenceEvent::Heartbeat(participant.clone()),
        );
    }

    pub fn subscriber_count(&self, session: &SessionId) -> usize {
        self.inner
            .sessions
            .get(session)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    /// The most recent payloads published to `session`, in publish order.
    pub fn transcript(&self, session: &SessionId) -> Vec<Bytes> {
        self.inner
            .transcripts
            .get(session)
            .map(|payloads| payloads.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn ensure_reachable(&self) -> Result<(), MeshError> {
        if self.inner.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MeshError::TransportUnavailable(
                "in-memory hub is unreachable".to_owned(),
            ))
        }
    }

    fn notify_others(&self, session: &SessionId, participant: &ParticipantId, event: PresenceEvent) {
        let Some(members) = self.inner.sessions.get(session) else {
            return;
        };
        for member in members.iter().filter(|m| &m.participant != participant) {
            let _ = member.tx.send(SignalingEvent::Presence(event.clone()));
        }
    }
}

#[async_trait]
impl SignalingTransport for MemorySignalingHub {
    async fn subscribe(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
    ) -> Result<Subscription, MeshError> {
        self.ensure_reachable()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriptionId::new();

        let mut members = self.inner.sessions.entry(session.clone()).or_default();
        let mut present: Vec<ParticipantId> = members
            .iter()
            .map(|m| m.participant.clone())
            .filter(|p| p != participant)
            .collect();
        present.sort();
        present.dedup();

        let _ = tx.send(SignalingEvent::Presence(PresenceEvent::Snapshot(present)));
        for member in members.iter().filter(|m| &m.participant != participant) {
            let _ = member
                .tx
                .send(SignalingEvent::Presence(PresenceEvent::Joined(participant.clone())));
        }
        members.push(Member {
            subscription: id,
            participant: participant.clone(),
            tx,
        });

        info!("{} subscribed to session {}", participant, session);
        Ok(Subscription { id, events: rx })
    }

    async fn publish(&self, session: &SessionId, payload: Bytes) -> Result<(), MeshError> {
        self.ensure_reachable()?;

        if self.inner.transcript_capacity > 0 {
            let mut transcript = self.inner.transcripts.entry(session.clone()).or_default();
            if transcript.len() == self.inner.transcript_capacity {
                transcript.pop_front();
            }
            transcript.push_back(payload.clone());
        }

        if let Some(mut members) = self.inner.sessions.get_mut(session) {
            members.retain(|member| {
                member
                    .tx
                    .send(SignalingEvent::Message(payload.clone()))
                    .is_ok()
            });
        }
        Ok(())
    }

    async fn unsubscribe(&self, subscription: SubscriptionId) {
        let mut departed = None;

        for mut entry in self.inner.sessions.iter_mut() {
            let members = entry.value_mut();
            let Some(index) = members.iter().position(|m| m.subscription == subscription) else {
                continue;
            };
            let member = members.remove(index);
            let still_present = members.iter().any(|m| m.participant == member.participant);
            if !still_present {
                departed = Some((entry.key().clone(), member.participant));
            }
            break;
        }

        if let Some((session, participant)) = departed {
            debug!("{} unsubscribed from session {}", participant, session);
            self.notify_others(&session, &participant, PresenceEvent::Left(participant.clone()));
        }
    }
}
