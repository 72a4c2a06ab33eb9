use crate::audio::RemoteAudio;
use chorus_core::{ParticipantId, ParticipantName, SessionId};

/// Per-peer connection state as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerStatus {
    Connecting,
    Connected,
    Failed,
}

impl PeerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub participant: ParticipantId,
    pub name: ParticipantName,
    pub status: PeerStatus,
}

/// Roster and connection changes, for UI consumption.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ParticipantJoined {
        participant: ParticipantId,
        name: ParticipantName,
    },
    ParticipantLeft {
        participant: ParticipantId,
    },
    PeerStatusChanged {
        participant: ParticipantId,
        status: PeerStatus,
    },
    /// Attach playback to `audio`. Emitted exactly when the peer becomes connected.
    RemoteAudioAvailable {
        participant: ParticipantId,
        audio: RemoteAudio,
    },
    /// Detach playback. The handle has been released.
    RemoteAudioReleased {
        participant: ParticipantId,
    },
    /// Retries for this peer are exhausted until it joins again.
    PeerUnreachable {
        participant: ParticipantId,
    },
    MuteChanged {
        muted: bool,
    },
    /// Publishing a signal kept failing. Reported once until publishing recovers.
    SignalingError {
        message: String,
    },
    Left {
        session: SessionId,
    },
}
