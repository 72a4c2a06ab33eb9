use crate::audio::{LocalAudioSource, RemoteAudio};
use crate::config::MeshConfig;
use crate::media::{
    MediaTransport, MediaTransportFactory, PeerEventKind, PeerEventSink, SdpKind, TransportState,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chorus_core::{IceCandidate, IceServerConfig, ParticipantId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MediaEngine};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// Builds [`WebRtcTransport`]s from the session's ICE configuration.
#[derive(Clone)]
pub struct WebRtcMediaFactory {
    ice_servers: Vec<IceServerConfig>,
    include_loopback_candidates: bool,
}

impl WebRtcMediaFactory {
    pub fn new(config: &MeshConfig) -> Self {
        Self {
            ice_servers: config.ice_servers.clone(),
            include_loopback_candidates: config.include_loopback_candidates,
        }
    }
}

#[async_trait]
impl MediaTransportFactory for WebRtcMediaFactory {
    async fn create(&self, sink: PeerEventSink) -> Result<Arc<dyn MediaTransport>> {
        let transport =
            WebRtcTransport::new(sink, &self.ice_servers, self.include_loopback_candidates).await?;
        Ok(Arc::new(transport))
    }
}

/// Audio-only `RTCPeerConnection` to one remote participant.
pub struct WebRtcTransport {
    participant: ParticipantId,
    peer_connection: Arc<RTCPeerConnection>,
    outgoing_enabled: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WebRtcTransport {
    pub async fn new(
        sink: PeerEventSink,
        ice_servers: &[IceServerConfig],
        include_loopback_candidates: bool,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let mut setting_engine = SettingEngine::default();
        setting_engine.set_include_loopback_candidate(include_loopback_candidates);

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting_engine)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .context("Failed to create RTCPeerConnection")?,
        );
        let participant = sink.participant().clone();

        let state_sink = sink.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let sink = state_sink.clone();
                Box::pin(async move {
                    info!(
                        "Peer connection state for {} changed to {:?}",
                        sink.participant(),
                        s
                    );
                    sink.emit(PeerEventKind::StateChanged(map_state(s)));
                })
            },
        ));

        let ice_sink = sink.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let sink = ice_sink.clone();
            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                sink.emit(PeerEventKind::LocalCandidate(IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                }));
            })
        }));

        let track_sink = sink;
        peer_connection.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let sink = track_sink.clone();
            Box::pin(async move {
                if track.kind() != RTPCodecType::Audio {
                    debug!("Ignoring non-audio track from {}", sink.participant());
                    return;
                }

                let audio = RemoteAudio::new(sink.participant().clone(), track.id().to_string());
                let reader = tokio::spawn({
                    let audio = audio.clone();
                    async move {
                        while let Ok((packet, _)) = track.read_rtp().await {
                            if !audio.push(packet.payload) {
                                break;
                            }
                        }
                    }
                });
                audio.attach_reader(reader);

                if !sink.emit(PeerEventKind::RemoteTrack(audio.clone())) {
                    audio.release();
                }
            })
        }));

        Ok(Self {
            participant,
            peer_connection,
            outgoing_enabled: Arc::new(AtomicBool::new(true)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    fn track_task(&self, task: JoinHandle<()>) {
        match self.tasks.lock() {
            Ok(mut tasks) => tasks.push(task),
            Err(_) => task.abort(),
        }
    }
}

#[async_trait]
impl MediaTransport for WebRtcTransport {
    async fn create_local_description(&self, kind: SdpKind) -> Result<String> {
        let description = match kind {
            SdpKind::Offer => self.peer_connection.create_offer(None).await?,
            SdpKind::Answer => self.peer_connection.create_answer(None).await?,
        };
        self.peer_connection
            .set_local_description(description.clone())
            .await
            .context("Failed to set local description")?;
        Ok(description.sdp)
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()> {
        let description = match kind {
            SdpKind::Offer => RTCSessionDescription::offer(sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(sdp)?,
        };
        self.peer_connection
            .set_remote_description(description)
            .await
            .context("Failed to set remote description")?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn add_local_track(&self, source: Arc<dyn LocalAudioSource>) -> Result<()> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                rtcp_feedback: vec![],
            },
            "audio".to_owned(),
            format!("chorus-{}", source.label()),
        ));

        let sender = self
            .peer_connection
            .add_track(track.clone() as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .context("Failed to add local audio track")?;

        // RTCP has to be drained for the interceptors to work.
        self.track_task(tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        }));

        let mut frames = source.frames();
        let enabled = self.outgoing_enabled.clone();
        let participant = self.participant.clone();
        self.track_task(tokio::spawn(async move {
            loop {
                match frames.recv().await {
                    Ok(frame) => {
                        if !enabled.load(Ordering::Relaxed) {
                            continue;
                        }
                        let sample = Sample {
                            data: frame.data,
                            duration: frame.duration,
                            ..Default::default()
                        };
                        if let Err(e) = track.write_sample(&sample).await {
                            warn!("Failed to write audio sample to {}: {}", participant, e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Outgoing track to {} skipped {} frames", participant, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));

        Ok(())
    }

    async fn set_outgoing_enabled(&self, enabled: bool) {
        self.outgoing_enabled.store(enabled, Ordering::Relaxed);
    }

    async fn close(&self) -> Result<()> {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.peer_connection.close().await?;
        Ok(())
    }
}

fn map_state(state: RTCPeerConnectionState) -> TransportState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => TransportState::New,
        RTCPeerConnectionState::Connecting => TransportState::Connecting,
        RTCPeerConnectionState::Connected => TransportState::Connected,
        RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
        RTCPeerConnectionState::Failed => TransportState::Failed,
        RTCPeerConnectionState::Closed => TransportState::Closed,
    }
}
