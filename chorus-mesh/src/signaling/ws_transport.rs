use crate::error::MeshError;
use crate::signaling::{PresenceEvent, SignalingEvent, SignalingTransport, Subscription, SubscriptionId};
use async_trait::async_trait;
use bytes::Bytes;
use chorus_core::codec;
use chorus_core::{ParticipantId, RelayFrame, SessionId};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

struct RelayLink {
    subscription: SubscriptionId,
    outgoing: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
}

/// Signaling over a WebSocket connection to a `chorus-relay` server.
///
/// One connection is opened per subscribed session, at
/// `{base_url}/ws/{session}/{participant}`.
pub struct WsSignalingTransport {
    base_url: String,
    links: DashMap<SessionId, RelayLink>,
}

impl WsSignalingTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            links: DashMap::new(),
        }
    }

    fn endpoint(&self, session: &SessionId, participant: &ParticipantId) -> String {
        format!("{}/ws/{}/{}", self.base_url, session, participant)
    }
}

#[async_trait]
impl SignalingTransport for WsSignalingTransport {
    async fn subscribe(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
    ) -> Result<Subscription, MeshError> {
        let url = self.endpoint(session, participant);
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| MeshError::TransportUnavailable(format!("{url}: {e}")))?;
        info!("Connected to relay at {}", url);

        let (mut sink, mut source) = stream.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let (events_tx, events) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if sink.send(msg).await.is_err() || closing {
                    break;
                }
            }
        });

        let reader = tokio::spawn(async move {
            while let Some(Ok(msg)) = source.next().await {
                let frame = match msg {
                    Message::Text(text) => codec::decode_frame(text.as_bytes()),
                    Message::Binary(data) => codec::decode_frame(&data),
                    Message::Close(_) => break,
                    _ => continue,
                };
                let event = match frame {
                    Ok(RelayFrame::Snapshot { participants }) => {
                        SignalingEvent::Presence(PresenceEvent::Snapshot(participants))
                    }
                    Ok(RelayFrame::Joined { participant }) => {
                        SignalingEvent::Presence(PresenceEvent::Joined(participant))
                    }
                    Ok(RelayFrame::Left { participant }) => {
                        SignalingEvent::Presence(PresenceEvent::Left(participant))
                    }
                    Ok(RelayFrame::Signal { message }) => {
                        SignalingEvent::Message(codec::encode(&message))
                    }
                    Err(e) => {
                        warn!("Dropping unreadable relay frame: {}", e);
                        continue;
                    }
                };
                if events_tx.send(event).is_err() {
                    break;
                }
            }
            debug!("Relay connection closed");
        });

        let subscription = SubscriptionId::new();
        let previous = self.links.insert(
            session.clone(),
            RelayLink {
                subscription,
                outgoing,
                reader,
            },
        );
        if let Some(previous) = previous {
            let _ = previous.outgoing.send(Message::Close(None));
            previous.reader.abort();
        }

        Ok(Subscription {
            id: subscription,
            events,
        })
    }

    async fn publish(&self, session: &SessionId, payload: Bytes) -> Result<(), MeshError> {
        let link = self.links.get(session).ok_or_else(|| {
            MeshError::TransportUnavailable(format!("not subscribed to session {session}"))
        })?;
        let text = String::from_utf8(payload.to_vec())
            .map_err(|e| MeshError::TransportUnavailable(format!("payload is not UTF-8: {e}")))?;
        link.outgoing
            .send(Message::text(text))
            .map_err(|_| MeshError::TransportUnavailable("relay connection closed".to_owned()))
    }

    async fn unsubscribe(&self, subscription: SubscriptionId) {
        let session = self
            .links
            .iter()
            .find(|link| link.subscription == subscription)
            .map(|link| link.key().clone());
        let Some(session) = session else {
            return;
        };
        if let Some((_, link)) = self.links.remove(&session) {
            let _ = link.outgoing.send(Message::Close(None));
            link.reader.abort();
            info!("Left relay session {}", session);
        }
    }
}
