use crate::model::participant::{ParticipantId, ParticipantName};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// A trickle-ICE candidate as carried on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, Hash, Eq, PartialEq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}

/// Messages exchanged between mesh participants over the signaling transport.
///
/// `Join` and `Leave` are broadcasts. Every other variant is addressed to exactly one
/// participant through `to`.
///
/// A `Join` carries the `instance` of the sender's session handle, fresh on every join, so
/// a participant that comes back under the same id is told apart from a repeated
/// announcement. `reply` marks the introduction sent back to somebody else's `Join`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", content = "d")]
pub enum SignalingMessage {
    Join {
        from: ParticipantId,
        display_name: ParticipantName,
        #[serde(default)]
        instance: String,
        #[serde(default)]
        reply: bool,
    },
    Leave {
        from: ParticipantId,
    },
    Offer {
        from: ParticipantId,
        to: ParticipantId,
        sdp: String,
    },
    Answer {
        from: ParticipantId,
        to: ParticipantId,
        sdp: String,
    },
    IceCandidate {
        from: ParticipantId,
        to: ParticipantId,
        candidate: IceCandidate,
    },
    /// Asks the initiating side of the pair to start a fresh negotiation.
    Reconnect {
        from: ParticipantId,
        to: ParticipantId,
    },
}

impl SignalingMessage {
    pub const OPS: [&'static str; 6] = [
        "Join",
        "Leave",
        "Offer",
        "Answer",
        "IceCandidate",
        "Reconnect",
    ];

    pub fn from(&self) -> &ParticipantId {
        match self {
            Self::Join { from, .. }
            | Self::Leave { from }
            | Self::Offer { from, .. }
            | Self::Answer { from, .. }
            | Self::IceCandidate { from, .. }
            | Self::Reconnect { from, .. } => from,
        }
    }

    pub fn to(&self) -> Option<&ParticipantId> {
        match self {
            Self::Join { .. } | Self::Leave { .. } => None,
            Self::Offer { to, .. }
            | Self::Answer { to, .. }
            | Self::IceCandidate { to, .. }
            | Self::Reconnect { to, .. } => Some(to),
        }
    }

    pub fn op(&self) -> &'static str {
        match self {
            Self::Join { .. } => "Join",
            Self::Leave { .. } => "Leave",
            Self::Offer { .. } => "Offer",
            Self::Answer { .. } => "Answer",
            Self::IceCandidate { .. } => "IceCandidate",
            Self::Reconnect { .. } => "Reconnect",
        }
    }

    /// Whether a participant with id `local` should process this message.
    ///
    /// Rejects our own echoes and messages addressed to somebody else.
    pub fn is_for(&self, local: &ParticipantId) -> bool {
        if self.from() == local {
            return false;
        }
        match self.to() {
            Some(to) => to == local,
            None => true,
        }
    }
}
