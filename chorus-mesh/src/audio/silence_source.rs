use crate::audio::{AudioFrame, LocalAudioSource};
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// An Opus frame that decodes to 20ms of silence.
const OPUS_SILENCE: [u8; 3] = [0xf8, 0xff, 0xfe];
const FRAME_DURATION: Duration = Duration::from_millis(20);

/// A local source producing silence at the regular Opus frame rate.
///
/// Stands in for a microphone where capture is not wired up, and keeps RTP flowing so
/// remote tracks get announced.
pub struct SilenceSource {
    tx: broadcast::Sender<AudioFrame>,
    ticker: JoinHandle<()>,
}

impl SilenceSource {
    /// Must be called inside a tokio runtime.
    pub fn start() -> Self {
        let (tx, _) = broadcast::channel(64);
        let ticker_tx = tx.clone();

        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(FRAME_DURATION);
            loop {
                interval.tick().await;
                // No receivers simply means no outgoing track yet.
                let _ = ticker_tx.send(AudioFrame {
                    data: Bytes::from_static(&OPUS_SILENCE),
                    duration: FRAME_DURATION,
                });
            }
        });

        Self { tx, ticker }
    }
}

impl LocalAudioSource for SilenceSource {
    fn label(&self) -> &str {
        "silence"
    }

    fn frames(&self) -> broadcast::Receiver<AudioFrame> {
        self.tx.subscribe()
    }
}

impl Drop for SilenceSource {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}
