use crate::audio::RemoteAudio;
use crate::media::{SdpKind, TransportState};
use chorus_core::{IceCandidate, ParticipantId};
use tokio::sync::mpsc;

/// Everything a peer's transport and driver report back to the session coordinator.
#[derive(Debug)]
pub enum PeerEventKind {
    LocalDescription { kind: SdpKind, sdp: String },
    RemoteDescriptionApplied { kind: SdpKind },
    OperationFailed { operation: &'static str, error: String },
    LocalCandidate(IceCandidate),
    StateChanged(TransportState),
    RemoteTrack(RemoteAudio),
}

#[derive(Debug)]
pub struct PeerEvent {
    pub participant: ParticipantId,
    /// Attempt number of the connection that produced the event. Events from a replaced
    /// connection carry an older epoch and are discarded.
    pub epoch: u64,
    pub kind: PeerEventKind,
}

/// Where one peer connection attempt posts its events.
#[derive(Debug, Clone)]
pub struct PeerEventSink {
    participant: ParticipantId,
    epoch: u64,
    tx: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerEventSink {
    pub fn new(participant: ParticipantId, epoch: u64, tx: mpsc::UnboundedSender<PeerEvent>) -> Self {
        Self {
            participant,
            epoch,
            tx,
        }
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns `false` once the session is gone.
    pub fn emit(&self, kind: PeerEventKind) -> bool {
        self.tx
            .send(PeerEvent {
                participant: self.participant.clone(),
                epoch: self.epoch,
                kind,
            })
            .is_ok()
    }
}
