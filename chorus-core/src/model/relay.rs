use crate::model::participant::ParticipantId;
use crate::model::signaling::SignalingMessage;
use serde::{Deserialize, Serialize};

/// Frames a relay server pushes to a subscribed participant.
///
/// Participants publish bare [`SignalingMessage`]s; the relay answers with presence
/// changes and forwarded messages wrapped in this envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", content = "d")]
pub enum RelayFrame {
    /// Everyone already present, sent once right after subscribing.
    Snapshot { participants: Vec<ParticipantId> },
    Joined { participant: ParticipantId },
    Left { participant: ParticipantId },
    Signal { message: SignalingMessage },
}
