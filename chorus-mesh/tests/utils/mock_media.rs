use anyhow::{Result, bail};
use async_trait::async_trait;
use chorus_core::{IceCandidate, ParticipantId};
use chorus_mesh::{
    LocalAudioSource, MediaTransport, MediaTransportFactory, PeerEventKind, PeerEventSink,
    RemoteAudio, SdpKind, TransportState,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_SDP: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default, Clone)]
pub struct MockTransportState {
    pub local_description: Option<SdpKind>,
    pub remote_description: Option<(SdpKind, String)>,
    pub remote_description_calls: usize,
    pub candidates: Vec<IceCandidate>,
    pub rejected_candidates: usize,
    pub local_tracks: usize,
    pub outgoing_enabled: bool,
    pub closed: bool,
    connected: bool,
}

/// Media transport that connects as soon as both descriptions are in place.
///
/// Rejects ICE candidates that arrive before the remote description, like a real one.
pub struct MockTransport {
    sink: PeerEventSink,
    state: Mutex<MockTransportState>,
}

impl MockTransport {
    fn new(sink: PeerEventSink) -> Self {
        Self {
            sink,
            state: Mutex::new(MockTransportState {
                outgoing_enabled: true,
                ..Default::default()
            }),
        }
    }

    pub fn participant(&self) -> &ParticipantId {
        self.sink.participant()
    }

    pub fn epoch(&self) -> u64 {
        self.sink.epoch()
    }

    pub fn snapshot(&self) -> MockTransportState {
        self.state.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Reports a transport failure, as ICE would after losing the path.
    pub fn fail(&self) {
        self.sink
            .emit(PeerEventKind::StateChanged(TransportState::Failed));
    }

    fn maybe_connect(&self, state: &mut MockTransportState) {
        if state.connected || state.local_description.is_none() || state.remote_description.is_none()
        {
            return;
        }
        state.connected = true;
        self.sink
            .emit(PeerEventKind::StateChanged(TransportState::Connecting));
        self.sink
            .emit(PeerEventKind::StateChanged(TransportState::Connected));
        self.sink.emit(PeerEventKind::RemoteTrack(RemoteAudio::new(
            self.participant().clone(),
            format!("mock-track-{}", self.epoch()),
        )));
    }
}

#[async_trait]
impl MediaTransport for MockTransport {
    async fn create_local_description(&self, kind: SdpKind) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            bail!("transport closed");
        }
        if kind == SdpKind::Answer && state.remote_description.is_none() {
            bail!("cannot answer without a remote offer");
        }
        let n = NEXT_SDP.fetch_add(1, Ordering::SeqCst);
        state.local_description = Some(kind);

        // Gathering starts right away, before the description is handed out.
        self.sink
            .emit(PeerEventKind::LocalCandidate(IceCandidate {
                candidate: format!("candidate:{n} 1 udp 2122260223 10.0.0.1 {} typ host", 40000 + n),
                sdp_mid: Some("0".to_owned()),
                sdp_m_line_index: Some(0),
            }));
        self.maybe_connect(&mut state);
        Ok(format!("v=0\r\no=mock {n} 0 IN IP4 0.0.0.0\r\na=mock:{kind:?}\r\n"))
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            bail!("transport closed");
        }
        state.remote_description_calls += 1;
        state.remote_description = Some((kind, sdp));
        self.maybe_connect(&mut state);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.remote_description.is_none() {
            state.rejected_candidates += 1;
            bail!("remote description not set");
        }
        state.candidates.push(candidate);
        Ok(())
    }

    async fn add_local_track(&self, _source: Arc<dyn LocalAudioSource>) -> Result<()> {
        self.state.lock().unwrap().local_tracks += 1;
        Ok(())
    }

    async fn set_outgoing_enabled(&self, enabled: bool) {
        self.state.lock().unwrap().outgoing_enabled = enabled;
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Factory recording every transport it hands out.
#[derive(Clone, Default)]
pub struct MockMediaFactory {
    transports: Arc<Mutex<Vec<Arc<MockTransport>>>>,
    failing: Arc<AtomicBool>,
}

impl MockMediaFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// While failing, `create` returns an error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn transports(&self) -> Vec<Arc<MockTransport>> {
        self.transports.lock().unwrap().clone()
    }

    pub fn transports_for(&self, participant: &ParticipantId) -> Vec<Arc<MockTransport>> {
        self.transports()
            .into_iter()
            .filter(|t| t.participant() == participant)
            .collect()
    }

    pub fn latest_for(&self, participant: &ParticipantId) -> Option<Arc<MockTransport>> {
        self.transports_for(participant).pop()
    }

    pub fn open_transports_for(&self, participant: &ParticipantId) -> usize {
        self.transports_for(participant)
            .iter()
            .filter(|t| !t.is_closed())
            .count()
    }
}

#[async_trait]
impl MediaTransportFactory for MockMediaFactory {
    async fn create(&self, sink: PeerEventSink) -> Result<Arc<dyn MediaTransport>> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("media stack unavailable");
        }
        let transport = Arc::new(MockTransport::new(sink));
        self.transports.lock().unwrap().push(transport.clone());
        Ok(transport)
    }
}
