use bytes::Bytes;
use chorus_core::ParticipantId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct RemoteAudioInner {
    participant: ParticipantId,
    track_id: String,
    // The only sender. Taking it on release ends the stream for every sink.
    packets: Mutex<Option<broadcast::Sender<Bytes>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    released: AtomicBool,
}

/// Audio arriving from one remote participant.
///
/// Owned by that participant's peer connection and released when it closes. Playback sinks
/// attach with [`RemoteAudio::subscribe`] and see the stream end on release.
#[derive(Debug, Clone)]
pub struct RemoteAudio {
    inner: Arc<RemoteAudioInner>,
}

impl RemoteAudio {
    pub fn new(participant: ParticipantId, track_id: impl Into<String>) -> Self {
        let (packets, _) = broadcast::channel(128);
        Self {
            inner: Arc::new(RemoteAudioInner {
                participant,
                track_id: track_id.into(),
                packets: Mutex::new(Some(packets)),
                reader: Mutex::new(None),
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.inner.participant
    }

    pub fn track_id(&self) -> &str {
        &self.inner.track_id
    }

    /// Hands an encoded payload to every attached sink. Returns `false` once released.
    pub fn push(&self, payload: Bytes) -> bool {
        let Ok(packets) = self.inner.packets.lock() else {
            return false;
        };
        match packets.as_ref() {
            Some(tx) => {
                // Lagging or absent playback sinks are not our concern.
                let _ = tx.send(payload);
                true
            }
            None => false,
        }
    }

    /// Ties the task reading the underlying track to this handle's lifetime.
    pub fn attach_reader(&self, reader: JoinHandle<()>) {
        if self.is_released() {
            reader.abort();
            return;
        }
        if let Ok(mut slot) = self.inner.reader.lock() {
            if let Some(previous) = slot.replace(reader) {
                previous.abort();
            }
        }
    }

    /// A receiver of the payloads pushed from now on. Already closed after release.
    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        let sender = self
            .inner
            .packets
            .lock()
            .ok()
            .and_then(|packets| packets.as_ref().map(broadcast::Sender::subscribe));
        match sender {
            Some(rx) => rx,
            None => broadcast::channel(1).1,
        }
    }

    /// Stops the reader and detaches every playback sink.
    pub fn release(&self) {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut slot) = self.inner.reader.lock() {
            if let Some(reader) = slot.take() {
                reader.abort();
            }
        }
        if let Ok(mut packets) = self.inner.packets.lock() {
            packets.take();
        }
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }
}
