use crate::audio::LocalAudioSource;
use crate::config::MeshConfig;
use crate::error::MeshError;
use crate::identity::LocalIdentity;
use crate::media::{MediaTransportFactory, PeerEvent, PeerEventKind, PeerEventSink, SdpKind};
use crate::peer::{
    CandidateDisposition, NegotiationState, OfferDisposition, PeerConnection, PeerEntry, PeerLink,
    PeerOp, PeerTable, Role,
};
use crate::session::{
    Outbox, PeerStatus, PresenceTracker, ReconnectionSupervisor, RetryDecision, RosterEntry,
    SessionCommand, SessionEvent,
};
use crate::signaling::{SignalingEvent, SignalingTransport, SubscriptionId};
use bytes::Bytes;
use chorus_core::{IceCandidate, ParticipantId, ParticipantName, SessionId, SignalingMessage, codec};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// State of the local actor for the lifetime of one joined session.
pub struct LocalSessionState {
    pub session_id: SessionId,
    pub local: LocalIdentity,
    pub is_joined: bool,
    pub is_muted: bool,
    /// Tells this join apart from earlier ones under the same participant id.
    pub instance: String,
    pub audio_source: Arc<dyn LocalAudioSource>,
}

/// Collaborators a coordinator is started with.
pub struct CoordinatorParts {
    pub state: LocalSessionState,
    pub config: MeshConfig,
    pub signaling: Arc<dyn SignalingTransport>,
    pub subscription: SubscriptionId,
    pub signaling_rx: mpsc::UnboundedReceiver<SignalingEvent>,
    pub media: Arc<dyn MediaTransportFactory>,
    pub commands: mpsc::Receiver<SessionCommand>,
    pub events: broadcast::Sender<SessionEvent>,
}

/// Single owner of a session's peer table.
///
/// Signaling events, peer transport events, local commands and the supervision tick are
/// all handled on this one task, so no two events can race on the same peer.
pub struct SessionCoordinator {
    state: LocalSessionState,
    config: MeshConfig,
    signaling: Arc<dyn SignalingTransport>,
    subscription: SubscriptionId,
    signaling_rx: mpsc::UnboundedReceiver<SignalingEvent>,
    signaling_open: bool,
    media: Arc<dyn MediaTransportFactory>,
    commands: mpsc::Receiver<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    peer_tx: mpsc::UnboundedSender<PeerEvent>,
    peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
    peers: PeerTable,
    presence: PresenceTracker,
    supervisor: ReconnectionSupervisor,
    outbox: Outbox,
    names: HashMap<ParticipantId, ParticipantName>,
    instances: HashMap<ParticipantId, String>,
    statuses: HashMap<ParticipantId, PeerStatus>,
    next_epoch: u64,
}

impl SessionCoordinator {
    pub fn new(parts: CoordinatorParts) -> Self {
        let CoordinatorParts {
            state,
            config,
            signaling,
            subscription,
            signaling_rx,
            media,
            commands,
            events,
        } = parts;

        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let outbox = Outbox::spawn(
            signaling.clone(),
            state.session_id.clone(),
            &config,
            events.clone(),
        );
        let presence = PresenceTracker::new(state.local.id.clone());
        let supervisor = ReconnectionSupervisor::new(
            config.retry_backoff,
            config.max_retry_attempts,
            config.negotiation_timeout,
        );

        Self {
            state,
            config,
            signaling,
            subscription,
            signaling_rx,
            signaling_open: true,
            media,
            commands,
            events,
            peer_tx,
            peer_rx,
            peers: PeerTable::new(),
            presence,
            supervisor,
            outbox,
            names: HashMap::new(),
            instances: HashMap::new(),
            statuses: HashMap::new(),
            next_epoch: 0,
        }
    }

    pub async fn run(mut self) {
        info!(
            "Session {} event loop started for {}",
            self.state.session_id, self.state.local.id
        );

        let mut tick = tokio::time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let leave_reply = loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(SessionCommand::Leave { reply }) => break Some(reply),
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("Session handle dropped. Leaving session {}.", self.state.session_id);
                            break None;
                        }
                    }
                }

                evt = self.signaling_rx.recv(), if self.signaling_open => {
                    match evt {
                        Some(e) => self.handle_signaling_event(e).await,
                        None => {
                            warn!("Signaling subscription for {} closed", self.state.session_id);
                            self.signaling_open = false;
                            self.emit(SessionEvent::SignalingError {
                                message: "signaling subscription closed".to_owned(),
                            });
                        }
                    }
                }

                Some(evt) = self.peer_rx.recv() => {
                    self.handle_peer_event(evt).await;
                }

                _ = tick.tick() => self.on_tick().await,
            }
        };

        self.shutdown().await;
        if let Some(reply) = leave_reply {
            let _ = reply.send(());
        }
        info!("Session {} event loop finished", self.state.session_id);
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::SetMuted { muted, reply } => {
                self.set_muted(muted).await;
                let _ = reply.send(());
            }
            SessionCommand::Roster { reply } => {
                let _ = reply.send(self.roster());
            }
            SessionCommand::Leave { reply } => {
                // Handled by the run loop; a late duplicate only needs an answer.
                let _ = reply.send(());
            }
        }
    }

    async fn set_muted(&mut self, muted: bool) {
        if self.state.is_muted == muted {
            return;
        }
        self.state.is_muted = muted;
        for (_, entry) in self.peers.iter_mut() {
            entry.connection.set_muted(muted);
            if let Some(link) = &entry.link {
                link.set_outgoing_enabled(!muted).await;
            }
        }
        info!("Local microphone {}", if muted { "muted" } else { "unmuted" });
        self.emit(SessionEvent::MuteChanged { muted });
    }

    fn roster(&self) -> Vec<RosterEntry> {
        self.presence
            .participants()
            .map(|id| RosterEntry {
                participant: id.clone(),
                name: self.display_name(id),
                status: self.status_of(id),
            })
            .collect()
    }

    fn status_of(&self, id: &ParticipantId) -> PeerStatus {
        match self.peers.get(id) {
            Some(entry) => match entry.connection.state() {
                NegotiationState::Connected => PeerStatus::Connected,
                NegotiationState::Failed | NegotiationState::Closed => PeerStatus::Failed,
                _ => PeerStatus::Connecting,
            },
            None if self.supervisor.is_blocked(id) => PeerStatus::Failed,
            None => PeerStatus::Connecting,
        }
    }

    fn display_name(&self, id: &ParticipantId) -> ParticipantName {
        self.names
            .get(id)
            .cloned()
            .unwrap_or_else(|| ParticipantName::from(id))
    }

    // Signaling

    async fn handle_signaling_event(&mut self, event: SignalingEvent) {
        match event {
            SignalingEvent::Presence(presence) => {
                let delta = self.presence.apply(&presence);
                if delta.is_empty() {
                    return;
                }
                for id in &delta.added {
                    self.on_present(id);
                }
                for id in &delta.removed {
                    info!("{} is no longer present", id);
                    self.teardown(id, true).await;
                }
                self.reconcile().await;
            }
            SignalingEvent::Message(payload) => self.handle_payload(payload).await,
        }
    }

    async fn handle_payload(&mut self, payload: Bytes) {
        let message = match codec::decode(&payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping signal: {}", MeshError::MalformedSignal(e));
                return;
            }
        };
        if !message.is_for(&self.state.local.id) {
            return;
        }
        debug!("Received {} from {}", message.op(), message.from());

        match message {
            SignalingMessage::Join {
                from,
                display_name,
                instance,
                reply,
            } => {
                self.on_remote_join(from, display_name, instance, reply)
                    .await;
            }
            SignalingMessage::Reconnect { from, .. } => self.on_reconnect(from).await,
            SignalingMessage::Leave { from } => {
                info!("{} left session {}", from, self.state.session_id);
                let was_present = self.presence.mark_absent(&from);
                self.teardown(&from, was_present).await;
            }
            SignalingMessage::Offer { from, sdp, .. } => self.on_offer(from, sdp).await,
            SignalingMessage::Answer { from, sdp, .. } => self.on_answer(from, sdp),
            SignalingMessage::IceCandidate {
                from, candidate, ..
            } => self.on_remote_candidate(from, candidate),
        }
    }

    async fn on_remote_join(
        &mut self,
        from: ParticipantId,
        display_name: ParticipantName,
        instance: String,
        reply: bool,
    ) {
        let previously_named = self.names.insert(from.clone(), display_name).is_some();
        let previous = if instance.is_empty() {
            None
        } else {
            self.instances.insert(from.clone(), instance.clone())
        };
        let first_sighting = match &previous {
            Some(previous) => previous != &instance,
            None if instance.is_empty() => !previously_named,
            None => true,
        };
        let restarted = previous.is_some_and(|previous| previous != instance);

        // Joiners have not seen our own Join; introduce ourselves once per join of theirs.
        if !reply && first_sighting {
            self.outbox.send(self.join_message(true));
        }

        if restarted {
            // Same id, new process: whatever we hold for it is dead.
            info!("{} restarted, replacing its connection", from);
            self.close_peer(&from).await;
            self.supervisor.forget(&from);
        } else if !reply && self.supervisor.reset_if_given_up(&from) {
            info!("{} rejoined, retrying from scratch", from);
        }
        if self.presence.mark_present(&from) {
            self.on_present(&from);
        }
        self.ensure_peer(&from).await;
    }

    /// The responding side lost its connection to us and asks for a fresh offer.
    async fn on_reconnect(&mut self, from: ParticipantId) {
        if Role::for_pair(&self.state.local.id, &from) != Role::Initiator {
            debug!("{}", MeshError::StaleSignal { op: "Reconnect", from });
            return;
        }
        if self.presence.mark_present(&from) {
            self.on_present(&from);
        }
        let negotiating = self.peers.get(&from).is_some_and(|entry| {
            !matches!(
                entry.connection.state(),
                NegotiationState::Connected | NegotiationState::Failed
            )
        });
        if negotiating {
            debug!("Already negotiating with {}, ignoring Reconnect", from);
            return;
        }

        info!("{} asked to reconnect", from);
        self.supervisor.reset_if_given_up(&from);
        self.supervisor.cancel_wait(&from);
        self.close_peer(&from).await;
        self.create_peer(&from, Role::Initiator).await;
    }

    async fn on_offer(&mut self, from: ParticipantId, sdp: String) {
        if self.presence.mark_present(&from) {
            self.on_present(&from);
        }

        let disposition = self
            .peers
            .get(&from)
            .map(|entry| entry.connection.offer_disposition(&sdp));
        match disposition {
            Some(OfferDisposition::Apply) => {}
            Some(OfferDisposition::Duplicate) => {
                debug!("Ignoring duplicate offer from {}", from);
                return;
            }
            Some(OfferDisposition::Glare) => {
                debug!("Ignoring offer from {} while our own offer is in flight", from);
                return;
            }
            Some(OfferDisposition::Replace) => {
                info!("{} renegotiates, replacing the existing connection", from);
                self.close_peer(&from).await;
                self.create_peer(&from, Role::Responder).await;
            }
            None => {
                self.supervisor.reset_if_given_up(&from);
                self.supervisor.cancel_wait(&from);
                self.create_peer(&from, Role::Responder).await;
            }
        }

        let Some(entry) = self.peers.get_mut(&from) else {
            return;
        };
        if !entry
            .connection
            .request_remote_description(SdpKind::Offer, &sdp)
        {
            debug!("{}", MeshError::StaleSignal { op: "Offer", from });
            return;
        }
        if let Some(link) = &entry.link {
            link.submit(PeerOp::ApplyRemoteDescription {
                kind: SdpKind::Offer,
                sdp,
            });
            link.submit(PeerOp::CreateLocalDescription(SdpKind::Answer));
        }
    }

    fn on_answer(&mut self, from: ParticipantId, sdp: String) {
        let Some(entry) = self.peers.get_mut(&from) else {
            debug!("{}", MeshError::StaleSignal { op: "Answer", from });
            return;
        };
        if !entry
            .connection
            .request_remote_description(SdpKind::Answer, &sdp)
        {
            debug!("{}", MeshError::StaleSignal { op: "Answer", from });
            return;
        }
        if let Some(link) = &entry.link {
            link.submit(PeerOp::ApplyRemoteDescription {
                kind: SdpKind::Answer,
                sdp,
            });
        }
    }

    fn on_remote_candidate(&mut self, from: ParticipantId, candidate: IceCandidate) {
        let Some(entry) = self.peers.get_mut(&from) else {
            debug!("Dropping ICE candidate from {} without a connection", from);
            return;
        };
        match entry.connection.on_remote_candidate(candidate) {
            CandidateDisposition::Apply(candidate) => {
                if let Some(link) = &entry.link {
                    link.submit(PeerOp::AddCandidate(candidate));
                }
            }
            CandidateDisposition::Buffered => {
                debug!(
                    "Buffered ICE candidate from {} ({} pending)",
                    from,
                    entry.connection.pending_remote_candidates()
                );
            }
            CandidateDisposition::Duplicate => {
                debug!("Ignoring duplicate ICE candidate from {}", from);
            }
            CandidateDisposition::Rejected => {
                debug!("{}", MeshError::StaleSignal {
                    op: "IceCandidate",
                    from,
                });
            }
        }
    }

    // Peer events

    async fn handle_peer_event(&mut self, event: PeerEvent) {
        let PeerEvent {
            participant,
            epoch,
            kind,
        } = event;

        let Some(entry) = self.peers.get_mut(&participant) else {
            discard_peer_event(&participant, epoch, kind);
            return;
        };
        if entry.connection.epoch() != epoch {
            discard_peer_event(&participant, epoch, kind);
            return;
        }

        match kind {
            PeerEventKind::LocalDescription { kind, sdp } => {
                let held_back = entry.connection.on_local_description_set();
                let from = self.state.local.id.clone();
                let to = participant.clone();
                self.outbox.send(match kind {
                    SdpKind::Offer => SignalingMessage::Offer { from, to, sdp },
                    SdpKind::Answer => SignalingMessage::Answer { from, to, sdp },
                });
                for candidate in held_back {
                    self.outbox.send(self.candidate_message(&participant, candidate));
                }
            }
            PeerEventKind::RemoteDescriptionApplied { kind } => {
                debug!("Remote {:?} from {} applied", kind, participant);
                let buffered = entry.connection.on_remote_description_set();
                if let Some(link) = &entry.link {
                    for candidate in buffered {
                        link.submit(PeerOp::AddCandidate(candidate));
                    }
                }
            }
            PeerEventKind::OperationFailed { operation, error } => {
                warn!("{} for {} failed: {}", operation, participant, error);
                entry.connection.fail();
            }
            PeerEventKind::LocalCandidate(candidate) => {
                if let Some(candidate) = entry.connection.on_local_candidate(candidate) {
                    self.outbox.send(self.candidate_message(&participant, candidate));
                }
            }
            PeerEventKind::StateChanged(transport) => {
                debug!("Transport to {} is {:?}", participant, transport);
                entry.connection.on_transport_state(transport);
            }
            PeerEventKind::RemoteTrack(audio) => {
                debug!("Remote track {} from {}", audio.track_id(), participant);
                entry.connection.on_remote_track(audio);
            }
        }

        self.after_transition(&participant).await;
    }

    /// Reacts to whatever state the peer's connection ended up in.
    async fn after_transition(&mut self, id: &ParticipantId) {
        let Some(entry) = self.peers.get(id) else {
            return;
        };
        match entry.connection.state() {
            NegotiationState::Connected => {
                if self.statuses.get(id) != Some(&PeerStatus::Connected) {
                    info!("Connected to {}", id);
                    self.supervisor.on_connected(id);
                    if let Some(audio) = entry.connection.remote_audio().cloned() {
                        self.emit(SessionEvent::RemoteAudioAvailable {
                            participant: id.clone(),
                            audio,
                        });
                    }
                    self.set_status(id, PeerStatus::Connected);
                }
            }
            NegotiationState::Failed => self.fail_peer(id).await,
            _ => {}
        }
    }

    // Peer lifecycle

    /// Starts a connection to a present participant unless one exists or it is backing off.
    async fn ensure_peer(&mut self, id: &ParticipantId) {
        if self.peers.contains(id) || self.supervisor.is_blocked(id) {
            return;
        }
        let role = Role::for_pair(&self.state.local.id, id);
        self.create_peer(id, role).await;
    }

    async fn create_peer(&mut self, id: &ParticipantId, role: Role) {
        if self.peers.contains(id) {
            return;
        }
        self.next_epoch += 1;
        let epoch = self.next_epoch;
        let sink = PeerEventSink::new(id.clone(), epoch, self.peer_tx.clone());

        let link = PeerLink::spawn(
            self.media.clone(),
            self.state.audio_source.clone(),
            self.state.is_muted,
            sink,
        );
        let mut connection =
            PeerConnection::new(id.clone(), role, epoch, self.state.is_muted, Instant::now());
        connection.begin();
        if role == Role::Initiator {
            link.submit(PeerOp::CreateLocalDescription(SdpKind::Offer));
        }
        info!("Created {:?} connection to {} (attempt {})", role, id, epoch);

        if let Err(rejected) = self.peers.insert(PeerEntry::new(connection, link)) {
            if let Some(link) = rejected.link {
                link.shutdown().await;
            }
            return;
        }
        self.set_status(id, PeerStatus::Connecting);
    }

    /// Removes a failed peer and schedules the next attempt.
    async fn fail_peer(&mut self, id: &ParticipantId) {
        if !self.close_peer(id).await {
            return;
        }
        self.schedule_retry(id);
    }

    fn schedule_retry(&mut self, id: &ParticipantId) {
        match self.supervisor.on_failed(id, Instant::now()) {
            RetryDecision::RetryAt(_) => {
                info!(
                    "Connection to {} failed, retrying in {:?}",
                    id, self.config.retry_backoff
                );
            }
            RetryDecision::GiveUp => {
                warn!(
                    "Giving up on {} after {} failed attempts",
                    id,
                    self.supervisor.failures(id)
                );
                self.emit(SessionEvent::PeerUnreachable {
                    participant: id.clone(),
                });
            }
        }
        self.set_status(id, PeerStatus::Failed);
    }

    /// Closes and removes a peer. Returns whether there was one.
    async fn close_peer(&mut self, id: &ParticipantId) -> bool {
        let Some(entry) = self.peers.remove(id) else {
            return false;
        };
        self.close_entry(entry).await;
        true
    }

    async fn close_entry(&mut self, entry: PeerEntry) {
        let PeerEntry {
            mut connection,
            link,
        } = entry;
        let id = connection.participant_id().clone();
        if let Some(link) = link {
            link.shutdown().await;
        }
        if connection.close() {
            self.emit(SessionEvent::RemoteAudioReleased {
                participant: id.clone(),
            });
        }
        debug!("Closed connection to {}", id);
    }

    /// Drops everything about a participant that left.
    async fn teardown(&mut self, id: &ParticipantId, was_present: bool) {
        self.close_peer(id).await;
        self.supervisor.forget(id);
        self.names.remove(id);
        self.instances.remove(id);
        let had_status = self.statuses.remove(id).is_some();
        if was_present || had_status {
            self.emit(SessionEvent::ParticipantLeft {
                participant: id.clone(),
            });
        }
    }

    fn on_present(&mut self, id: &ParticipantId) {
        info!("{} is present in session {}", id, self.state.session_id);
        self.emit(SessionEvent::ParticipantJoined {
            participant: id.clone(),
            name: self.display_name(id),
        });
    }

    async fn reconcile(&mut self) {
        let plan = self.presence.reconcile(&self.peers.ids());
        for id in plan.to_teardown {
            info!("Tearing down {}, no longer in the roster", id);
            self.teardown(&id, false).await;
        }
        for id in plan.to_connect {
            self.ensure_peer(&id).await;
        }
    }

    async fn on_tick(&mut self) {
        let now = Instant::now();

        for id in self.supervisor.expired(&self.peers, now) {
            warn!("{}", MeshError::NegotiationTimeout(id.clone()));
            if let Some(entry) = self.peers.get_mut(&id) {
                entry.connection.fail();
            }
            self.fail_peer(&id).await;
        }

        for id in self.supervisor.due(now) {
            if self.presence.contains(&id) {
                info!("Retrying connection to {}", id);
                self.ensure_peer(&id).await;
                let responder = Role::for_pair(&self.state.local.id, &id) == Role::Responder;
                if responder && self.peers.contains(&id) {
                    // The initiator may still think the old connection is fine.
                    self.outbox.send(SignalingMessage::Reconnect {
                        from: self.state.local.id.clone(),
                        to: id.clone(),
                    });
                }
            } else {
                self.supervisor.forget(&id);
            }
        }

        self.reconcile().await;
    }

    // Leave

    async fn shutdown(&mut self) {
        let session = self.state.session_id.clone();
        self.outbox.send(SignalingMessage::Leave {
            from: self.state.local.id.clone(),
        });

        for entry in self.peers.drain() {
            self.close_entry(entry).await;
        }

        self.outbox.flush(self.config.publish_flush_timeout).await;

        self.signaling.unsubscribe(self.subscription).await;
        self.presence.clear();
        self.supervisor.clear();
        self.statuses.clear();
        self.instances.clear();
        self.state.is_joined = false;

        info!("{} left session {}", self.state.local.id, session);
        self.emit(SessionEvent::Left { session });
    }

    // Helpers

    fn join_message(&self, reply: bool) -> SignalingMessage {
        SignalingMessage::Join {
            from: self.state.local.id.clone(),
            display_name: self.state.local.name.clone(),
            instance: self.state.instance.clone(),
            reply,
        }
    }

    fn candidate_message(&self, to: &ParticipantId, candidate: IceCandidate) -> SignalingMessage {
        SignalingMessage::IceCandidate {
            from: self.state.local.id.clone(),
            to: to.clone(),
            candidate,
        }
    }

    fn set_status(&mut self, id: &ParticipantId, status: PeerStatus) {
        if self.statuses.insert(id.clone(), status) != Some(status) {
            self.emit(SessionEvent::PeerStatusChanged {
                participant: id.clone(),
                status,
            });
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine, nobody is watching.
        let _ = self.events.send(event);
    }
}

fn discard_peer_event(participant: &ParticipantId, epoch: u64, kind: PeerEventKind) {
    debug!(
        "Discarding event from replaced connection to {} (attempt {})",
        participant, epoch
    );
    if let PeerEventKind::RemoteTrack(audio) = kind {
        audio.release();
    }
}
