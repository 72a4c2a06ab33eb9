use crate::error::MeshError;
use async_trait::async_trait;
use bytes::Bytes;
use chorus_core::{ParticipantId, SessionId};
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Transport-level presence, independent of any negotiation progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// Everyone present at the moment of subscribing.
    Snapshot(Vec<ParticipantId>),
    Joined(ParticipantId),
    Left(ParticipantId),
    /// Periodic liveness. Implies presence.
    Heartbeat(ParticipantId),
}

#[derive(Debug, Clone)]
pub enum SignalingEvent {
    Presence(PresenceEvent),
    /// An encoded signaling message, still to be decoded by the receiver.
    Message(Bytes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live subscription to one session's presence and message stream.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<SignalingEvent>,
}

/// Session-scoped, ordered, at-least-once messaging with presence notifications.
///
/// Publishing is a broadcast; receivers filter addressed messages themselves.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn subscribe(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
    ) -> Result<Subscription, MeshError>;

    async fn publish(&self, session: &SessionId, payload: Bytes) -> Result<(), MeshError>;

    async fn unsubscribe(&self, subscription: SubscriptionId);
}
