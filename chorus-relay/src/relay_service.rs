use axum::extract::ws::Message;
use chorus_core::codec::{self, DecodeError};
use chorus_core::{ParticipantId, RelayFrame, SessionId};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("malformed signal: {0}")]
    Malformed(#[from] DecodeError),

    #[error("signal claims to be from {claimed} but arrived on {actual}'s connection")]
    Spoofed {
        claimed: ParticipantId,
        actual: ParticipantId,
    },
}

type Members = HashMap<ParticipantId, mpsc::UnboundedSender<Message>>;

struct RelayInner {
    sessions: DashMap<SessionId, Members>,
}

/// Shared routing table of every connected participant, grouped by session.
#[derive(Clone)]
pub struct RelayService {
    inner: Arc<RelayInner>,
}

impl Default for RelayService {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RelayInner {
                sessions: DashMap::new(),
            }),
        }
    }

    /// Registers a connection and pushes the presence snapshot to it.
    ///
    /// A second connection for the same participant replaces the first one, which is
    /// closed. Everyone else hears `Joined` only for a participant that was not present.
    pub fn add_participant(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
        tx: mpsc::UnboundedSender<Message>,
    ) {
        let mut members = self.inner.sessions.entry(session.clone()).or_default();

        let mut present: Vec<ParticipantId> = members
            .keys()
            .filter(|id| *id != participant)
            .cloned()
            .collect();
        present.sort();
        send_frame(&tx, &RelayFrame::Snapshot {
            participants: present,
        });

        match members.insert(participant.clone(), tx) {
            Some(previous) => {
                info!(
                    "{} reconnected to session {}, closing the old connection",
                    participant, session
                );
                let _ = previous.send(Message::Close(None));
            }
            None => {
                info!("{} joined session {}", participant, session);
                let joined = RelayFrame::Joined {
                    participant: participant.clone(),
                };
                for (id, member) in members.iter() {
                    if id != participant {
                        send_frame(member, &joined);
                    }
                }
            }
        }
    }

    /// Drops a connection. Ignored when `tx` is no longer the registered one for
    /// `participant`, i.e. the connection was already replaced.
    pub fn remove_participant(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
        tx: &mpsc::UnboundedSender<Message>,
    ) {
        let Some(mut members) = self.inner.sessions.get_mut(session) else {
            return;
        };
        let current = members
            .get(participant)
            .is_some_and(|registered| registered.same_channel(tx));
        if !current {
            debug!("Stale connection of {} closed", participant);
            return;
        }

        members.remove(participant);
        info!("{} left session {}", participant, session);
        let left = RelayFrame::Left {
            participant: participant.clone(),
        };
        for member in members.values() {
            send_frame(member, &left);
        }
        drop(members);

        self.inner
            .sessions
            .remove_if(session, |_, members| members.is_empty());
    }

    /// Forwards a payload published by `sender`.
    ///
    /// Addressed messages go to their recipient only, broadcasts to everyone but the
    /// sender. Returns how many connections the payload was queued on.
    pub fn route(
        &self,
        session: &SessionId,
        sender: &ParticipantId,
        payload: &[u8],
    ) -> Result<usize, RouteError> {
        let message = codec::decode(payload)?;
        if message.from() != sender {
            return Err(RouteError::Spoofed {
                claimed: message.from().clone(),
                actual: sender.clone(),
            });
        }

        let Some(members) = self.inner.sessions.get(session) else {
            return Ok(0);
        };
        let to = message.to().cloned();
        let op = message.op();
        let frame = RelayFrame::Signal { message };

        let delivered = match to {
            Some(to) => match members.get(&to) {
                Some(member) => usize::from(send_frame(member, &frame)),
                None => {
                    debug!("Dropping {} from {} to absent {}", op, sender, to);
                    0
                }
            },
            None => members
                .iter()
                .filter(|(id, _)| *id != sender)
                .filter(|(_, member)| send_frame(member, &frame))
                .count(),
        };
        Ok(delivered)
    }

    pub fn participants(&self, session: &SessionId) -> Vec<ParticipantId> {
        let mut participants: Vec<ParticipantId> = self
            .inner
            .sessions
            .get(session)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default();
        participants.sort();
        participants
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }
}

fn send_frame(tx: &mpsc::UnboundedSender<Message>, frame: &RelayFrame) -> bool {
    let text = codec::encode_frame(frame);
    if tx.send(Message::Text(text.into())).is_err() {
        warn!("Failed to queue relay frame, connection is gone");
        return false;
    }
    true
}
