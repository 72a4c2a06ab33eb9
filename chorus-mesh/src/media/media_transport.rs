use crate::audio::LocalAudioSource;
use crate::media::PeerEventSink;
use anyhow::Result;
use async_trait::async_trait;
use chorus_core::IceCandidate;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Connectivity of the underlying media transport, as reported by its callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// One bidirectional media transport to exactly one remote participant.
///
/// Callbacks (local candidates, state changes, remote tracks) are delivered through the
/// [`PeerEventSink`] the transport was created with.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Creates an offer or answer and installs it as the local description.
    async fn create_local_description(&self, kind: SdpKind) -> Result<String>;

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn add_local_track(&self, source: Arc<dyn LocalAudioSource>) -> Result<()>;

    /// Silences (or resumes) the outgoing track without renegotiating.
    async fn set_outgoing_enabled(&self, enabled: bool);

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait MediaTransportFactory: Send + Sync {
    async fn create(&self, sink: PeerEventSink) -> Result<Arc<dyn MediaTransport>>;
}
