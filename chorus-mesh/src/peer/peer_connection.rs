use crate::audio::RemoteAudio;
use crate::media::{SdpKind, TransportState};
use chorus_core::{IceCandidate, ParticipantId};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Negotiation progress of one peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    New,
    /// We initiate and have not produced our offer yet.
    AwaitingLocalOffer,
    /// The remote side initiates and we wait for its offer.
    AwaitingRemoteOffer,
    /// Exactly one of the two descriptions is in place.
    Negotiating,
    Connected,
    Failed,
    Closed,
}

impl NegotiationState {
    /// Still working towards `Connected`.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            Self::New | Self::AwaitingLocalOffer | Self::AwaitingRemoteOffer | Self::Negotiating
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

/// Which side of a pair sends the offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    /// The participant with the greater id initiates. Both sides compute the same answer,
    /// so simultaneous discovery never produces two offers.
    pub fn for_pair(local: &ParticipantId, remote: &ParticipantId) -> Self {
        if local > remote {
            Self::Initiator
        } else {
            Self::Responder
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum CandidateDisposition {
    /// Remote description is in place, hand the candidate to the transport now.
    Apply(IceCandidate),
    /// Queued until the remote description is applied.
    Buffered,
    Duplicate,
    /// The connection is failed or closed.
    Rejected,
}

/// What to do with an inbound offer given the existing connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferDisposition {
    Apply,
    /// Same offer delivered again.
    Duplicate,
    /// We initiate for this pair and our own negotiation is in flight.
    Glare,
    /// The remote side started over; replace this connection.
    Replace,
}

/// State machine of the media connection to one remote participant.
///
/// Pure bookkeeping: transport operations are issued by the coordinator through the peer's
/// driver, and their completions are fed back here.
#[derive(Debug)]
pub struct PeerConnection {
    participant_id: ParticipantId,
    role: Role,
    epoch: u64,
    state: NegotiationState,
    local_description_set: bool,
    remote_description_set: bool,
    remote_sdp: Option<String>,
    pending_remote_candidates: VecDeque<IceCandidate>,
    seen_remote_candidates: HashSet<IceCandidate>,
    pending_local_candidates: Vec<IceCandidate>,
    transport_connected: bool,
    staged_remote_audio: Option<RemoteAudio>,
    remote_audio: Option<RemoteAudio>,
    is_muted: bool,
    created_at: Instant,
}

impl PeerConnection {
    pub fn new(
        participant_id: ParticipantId,
        role: Role,
        epoch: u64,
        is_muted: bool,
        created_at: Instant,
    ) -> Self {
        Self {
            participant_id,
            role,
            epoch,
            state: NegotiationState::New,
            local_description_set: false,
            remote_description_set: false,
            remote_sdp: None,
            pending_remote_candidates: VecDeque::new(),
            seen_remote_candidates: HashSet::new(),
            pending_local_candidates: Vec::new(),
            transport_connected: false,
            staged_remote_audio: None,
            remote_audio: None,
            is_muted,
            created_at,
        }
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn local_description_set(&self) -> bool {
        self.local_description_set
    }

    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    pub fn pending_remote_candidates(&self) -> usize {
        self.pending_remote_candidates.len()
    }

    pub fn remote_audio(&self) -> Option<&RemoteAudio> {
        self.remote_audio.as_ref()
    }

    pub fn is_muted(&self) -> bool {
        self.is_muted
    }

    /// Leaves `New` according to the role.
    pub fn begin(&mut self) -> NegotiationState {
        if self.state == NegotiationState::New {
            self.state = match self.role {
                Role::Initiator => NegotiationState::AwaitingLocalOffer,
                Role::Responder => NegotiationState::AwaitingRemoteOffer,
            };
        }
        self.state
    }

    pub fn offer_disposition(&self, sdp: &str) -> OfferDisposition {
        if self.remote_sdp.as_deref() == Some(sdp) {
            return OfferDisposition::Duplicate;
        }
        match (self.role, self.state) {
            (Role::Responder, state) if state.is_pending() && self.remote_sdp.is_none() => {
                OfferDisposition::Apply
            }
            (Role::Initiator, state) if state.is_pending() => OfferDisposition::Glare,
            _ => OfferDisposition::Replace,
        }
    }

    pub fn accepts_answer(&self) -> bool {
        self.role == Role::Initiator
            && matches!(
                self.state,
                NegotiationState::AwaitingLocalOffer | NegotiationState::Negotiating
            )
            && self.remote_sdp.is_none()
    }

    /// Records that `sdp` is about to be applied as the remote description.
    ///
    /// Returns `false` when the description is stale or a duplicate and must be dropped.
    pub fn request_remote_description(&mut self, kind: SdpKind, sdp: &str) -> bool {
        let accepted = match kind {
            SdpKind::Offer => self.offer_disposition(sdp) == OfferDisposition::Apply,
            SdpKind::Answer => self.accepts_answer(),
        };
        if accepted {
            self.remote_sdp = Some(sdp.to_owned());
        }
        accepted
    }

    /// The local description was installed and may be published. Returns local candidates
    /// gathered before that point, to be sent right after the description.
    pub fn on_local_description_set(&mut self) -> Vec<IceCandidate> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        self.local_description_set = true;
        self.advance_to_negotiating();
        self.try_connect();
        std::mem::take(&mut self.pending_local_candidates)
    }

    /// The remote description was applied. Returns buffered remote candidates in arrival
    /// order, to be applied next.
    pub fn on_remote_description_set(&mut self) -> Vec<IceCandidate> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        self.remote_description_set = true;
        self.advance_to_negotiating();
        self.try_connect();
        self.pending_remote_candidates.drain(..).collect()
    }

    pub fn on_remote_candidate(&mut self, candidate: IceCandidate) -> CandidateDisposition {
        if self.state.is_terminal() {
            return CandidateDisposition::Rejected;
        }
        if !self.seen_remote_candidates.insert(candidate.clone()) {
            return CandidateDisposition::Duplicate;
        }
        if self.remote_description_set {
            CandidateDisposition::Apply(candidate)
        } else {
            self.pending_remote_candidates.push_back(candidate);
            CandidateDisposition::Buffered
        }
    }

    /// Returns the candidate if it may be published now; otherwise it is held back until the
    /// local description is out.
    pub fn on_local_candidate(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.state.is_terminal() {
            return None;
        }
        if self.local_description_set {
            Some(candidate)
        } else {
            self.pending_local_candidates.push(candidate);
            None
        }
    }

    pub fn on_transport_state(&mut self, transport: TransportState) {
        match transport {
            TransportState::Connected => {
                self.transport_connected = true;
                self.try_connect();
            }
            TransportState::Disconnected => self.transport_connected = false,
            TransportState::Failed | TransportState::Closed => {
                self.fail();
            }
            TransportState::New | TransportState::Connecting => {}
        }
    }

    pub fn on_remote_track(&mut self, audio: RemoteAudio) {
        if self.state.is_terminal() || self.remote_audio.is_some() || self.staged_remote_audio.is_some()
        {
            audio.release();
            return;
        }
        self.staged_remote_audio = Some(audio);
        self.try_connect();
    }

    pub fn set_muted(&mut self, muted: bool) -> bool {
        let changed = self.is_muted != muted;
        self.is_muted = muted;
        changed
    }

    /// Moves to `Failed`. Returns `false` if already failed or closed.
    pub fn fail(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = NegotiationState::Failed;
        true
    }

    /// Moves to `Closed` and releases remote audio. Returns whether audio had been exposed.
    pub fn close(&mut self) -> bool {
        self.state = NegotiationState::Closed;
        self.pending_remote_candidates.clear();
        self.pending_local_candidates.clear();
        if let Some(staged) = self.staged_remote_audio.take() {
            staged.release();
        }
        match self.remote_audio.take() {
            Some(audio) => {
                audio.release();
                true
            }
            None => false,
        }
    }

    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        self.state.is_pending() && now.saturating_duration_since(self.created_at) >= timeout
    }

    fn advance_to_negotiating(&mut self) {
        if matches!(
            self.state,
            NegotiationState::New
                | NegotiationState::AwaitingLocalOffer
                | NegotiationState::AwaitingRemoteOffer
        ) {
            self.state = NegotiationState::Negotiating;
        }
    }

    fn try_connect(&mut self) {
        if self.state == NegotiationState::Negotiating
            && self.local_description_set
            && self.remote_description_set
            && self.transport_connected
            && self.staged_remote_audio.is_some()
        {
            self.remote_audio = self.staged_remote_audio.take();
            self.state = NegotiationState::Connected;
        }
    }
}
