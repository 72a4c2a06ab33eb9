mod participant;
mod relay;
mod session;
mod signaling;

pub use participant::{ParticipantId, ParticipantName};
pub use relay::RelayFrame;
pub use session::SessionId;
pub use signaling::{IceCandidate, IceServerConfig, SignalingMessage};
