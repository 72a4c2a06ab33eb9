use crate::audio::LocalAudioSource;
use crate::media::{MediaTransport, MediaTransportFactory, PeerEventKind, PeerEventSink, SdpKind};
use chorus_core::IceCandidate;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A media operation queued for one peer's transport.
#[derive(Debug)]
pub enum PeerOp {
    CreateLocalDescription(SdpKind),
    ApplyRemoteDescription { kind: SdpKind, sdp: String },
    AddCandidate(IceCandidate),
}

impl PeerOp {
    fn name(&self) -> &'static str {
        match self {
            Self::CreateLocalDescription(SdpKind::Offer) => "create_offer",
            Self::CreateLocalDescription(SdpKind::Answer) => "create_answer",
            Self::ApplyRemoteDescription { .. } => "set_remote_description",
            Self::AddCandidate(_) => "add_ice_candidate",
        }
    }
}

#[derive(Default)]
struct LinkTransport {
    transport: Option<Arc<dyn MediaTransport>>,
    outgoing_enabled: bool,
}

/// Handle on one peer's transport and the task that runs its operations in order.
///
/// The driver task builds the transport itself, so a slow media stack only ever holds up
/// the peer it belongs to. Operations for different peers run concurrently; those for one
/// peer never overlap.
pub struct PeerLink {
    slot: Arc<Mutex<LinkTransport>>,
    ops: mpsc::UnboundedSender<PeerOp>,
    driver: JoinHandle<()>,
}

impl PeerLink {
    pub fn spawn(
        factory: Arc<dyn MediaTransportFactory>,
        audio_source: Arc<dyn LocalAudioSource>,
        muted: bool,
        sink: PeerEventSink,
    ) -> Self {
        let (ops, mut ops_rx) = mpsc::unbounded_channel::<PeerOp>();
        let slot = Arc::new(Mutex::new(LinkTransport {
            transport: None,
            outgoing_enabled: !muted,
        }));
        let shared = slot.clone();

        let driver = tokio::spawn(async move {
            let driven = match factory.create(sink.clone()).await {
                Ok(transport) => transport,
                Err(e) => {
                    sink.emit(PeerEventKind::OperationFailed {
                        operation: "create_transport",
                        error: format!("{e:#}"),
                    });
                    return;
                }
            };
            {
                let mut slot = shared.lock().await;
                if !slot.outgoing_enabled {
                    driven.set_outgoing_enabled(false).await;
                }
                slot.transport = Some(driven.clone());
            }
            if let Err(e) = driven.add_local_track(audio_source).await {
                sink.emit(PeerEventKind::OperationFailed {
                    operation: "add_local_track",
                    error: format!("{e:#}"),
                });
                return;
            }

            while let Some(op) = ops_rx.recv().await {
                let operation = op.name();
                let result = match op {
                    PeerOp::CreateLocalDescription(kind) => driven
                        .create_local_description(kind)
                        .await
                        .map(|sdp| sink.emit(PeerEventKind::LocalDescription { kind, sdp })),
                    PeerOp::ApplyRemoteDescription { kind, sdp } => driven
                        .set_remote_description(kind, sdp)
                        .await
                        .map(|_| sink.emit(PeerEventKind::RemoteDescriptionApplied { kind })),
                    PeerOp::AddCandidate(candidate) => {
                        if let Err(e) = driven.add_ice_candidate(candidate).await {
                            warn!("Failed to add ICE candidate for {}: {:?}", sink.participant(), e);
                        }
                        continue;
                    }
                };
                match result {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        sink.emit(PeerEventKind::OperationFailed {
                            operation,
                            error: format!("{e:#}"),
                        });
                        break;
                    }
                }
            }
            debug!("Driver for {} (epoch {}) stopped", sink.participant(), sink.epoch());
        });

        Self { slot, ops, driver }
    }

    /// Returns `false` when the driver already stopped.
    pub fn submit(&self, op: PeerOp) -> bool {
        self.ops.send(op).is_ok()
    }

    /// Applies right away once the transport exists, otherwise as soon as it is built.
    pub async fn set_outgoing_enabled(&self, enabled: bool) {
        let mut slot = self.slot.lock().await;
        slot.outgoing_enabled = enabled;
        if let Some(transport) = &slot.transport {
            transport.set_outgoing_enabled(enabled).await;
        }
    }

    /// Cancels in-flight operations and closes the transport, if one was built.
    pub async fn shutdown(self) {
        self.driver.abort();
        let _ = self.driver.await;
        let transport = self.slot.lock().await.transport.take();
        if let Some(transport) = transport {
            if let Err(e) = transport.close().await {
                warn!("Error while closing media transport: {:?}", e);
            }
        }
    }
}
