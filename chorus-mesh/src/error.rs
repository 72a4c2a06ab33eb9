use chorus_core::{DecodeError, ParticipantId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    /// The signaling channel cannot be reached. Fatal to `join`.
    #[error("signaling transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The local audio source could not be opened. Fatal to `join`.
    #[error("local audio capture denied: {0}")]
    MediaCaptureDenied(String),

    /// A single peer did not reach `Connected` in time. Recovered by retry.
    #[error("negotiation with {0} timed out")]
    NegotiationTimeout(ParticipantId),

    #[error("malformed signal: {0}")]
    MalformedSignal(#[from] DecodeError),

    #[error("stale {op} from {from}")]
    StaleSignal {
        op: &'static str,
        from: ParticipantId,
    },

    #[error("media transport error: {0}")]
    Media(String),

    #[error("voice session is no longer running")]
    SessionClosed,
}
