use chorus_core::{IceCandidate, ParticipantId, SessionId, SignalingMessage, codec};
use chorus_mesh::{MemorySignalingHub, SignalingEvent, SignalingTransport, Subscription};
use std::time::Duration;

/// A participant scripted by hand straight on the hub, without a coordinator.
pub struct RawParticipant {
    pub id: ParticipantId,
    session: SessionId,
    hub: MemorySignalingHub,
    subscription: Subscription,
    generation: u32,
}

impl RawParticipant {
    pub async fn join(hub: &MemorySignalingHub, session: &SessionId, id: &str) -> Self {
        let id = ParticipantId::from(id);
        let subscription = hub.subscribe(session, &id).await.unwrap();
        Self {
            id,
            session: session.clone(),
            hub: hub.clone(),
            subscription,
            generation: 1,
        }
    }

    pub async fn send(&self, message: SignalingMessage) {
        self.hub
            .publish(&self.session, codec::encode(&message))
            .await
            .unwrap();
    }

    pub fn instance(&self) -> String {
        format!("{}#{}", self.id, self.generation)
    }

    pub async fn announce(&self, name: &str) {
        self.send(SignalingMessage::Join {
            from: self.id.clone(),
            display_name: name.into(),
            instance: self.instance(),
            reply: false,
        })
        .await;
    }

    /// Announces a restarted process under the same id, as if the relay swapped connections.
    pub async fn rejoin(&mut self, name: &str) {
        self.generation += 1;
        self.announce(name).await;
    }

    pub async fn reconnect(&self, to: &ParticipantId) {
        self.send(SignalingMessage::Reconnect {
            from: self.id.clone(),
            to: to.clone(),
        })
        .await;
    }

    pub async fn offer(&self, to: &ParticipantId, sdp: &str) {
        self.send(SignalingMessage::Offer {
            from: self.id.clone(),
            to: to.clone(),
            sdp: sdp.to_owned(),
        })
        .await;
    }

    pub async fn answer(&self, to: &ParticipantId, sdp: &str) {
        self.send(SignalingMessage::Answer {
            from: self.id.clone(),
            to: to.clone(),
            sdp: sdp.to_owned(),
        })
        .await;
    }

    pub async fn candidate(&self, to: &ParticipantId, candidate: &str) {
        self.send(SignalingMessage::IceCandidate {
            from: self.id.clone(),
            to: to.clone(),
            candidate: IceCandidate::new(candidate),
        })
        .await;
    }

    pub async fn leave(&self) {
        self.send(SignalingMessage::Leave {
            from: self.id.clone(),
        })
        .await;
    }

    /// Next decoded message addressed to us that matches `predicate`.
    pub async fn next_message<F>(&mut self, timeout_ms: u64, predicate: F) -> Option<SignalingMessage>
    where
        F: Fn(&SignalingMessage) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let event = tokio::time::timeout_at(deadline, self.subscription.events.recv())
                .await
                .ok()??;
            let SignalingEvent::Message(payload) = event else {
                continue;
            };
            let Ok(message) = codec::decode(&payload) else {
                continue;
            };
            if message.is_for(&self.id) && predicate(&message) {
                return Some(message);
            }
        }
    }

    pub async fn next_offer(&mut self, timeout_ms: u64) -> Option<(ParticipantId, String)> {
        match self
            .next_message(timeout_ms, |m| matches!(m, SignalingMessage::Offer { .. }))
            .await?
        {
            SignalingMessage::Offer { from, sdp, .. } => Some((from, sdp)),
            _ => None,
        }
    }

    pub async fn next_answer(&mut self, timeout_ms: u64) -> Option<(ParticipantId, String)> {
        match self
            .next_message(timeout_ms, |m| matches!(m, SignalingMessage::Answer { .. }))
            .await?
        {
            SignalingMessage::Answer { from, sdp, .. } => Some((from, sdp)),
            _ => None,
        }
    }

    pub async fn unsubscribe(self) {
        self.hub.unsubscribe(self.subscription.id).await;
    }
}
