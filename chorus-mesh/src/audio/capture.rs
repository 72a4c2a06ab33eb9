use crate::error::MeshError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// One encoded (Opus) frame of local audio.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub data: Bytes,
    pub duration: Duration,
}

/// The local microphone, shared read-only by every outgoing track.
pub trait LocalAudioSource: Send + Sync {
    fn label(&self) -> &str;

    /// A fresh receiver of encoded frames. Each outgoing track holds its own.
    fn frames(&self) -> broadcast::Receiver<AudioFrame>;
}

/// Grants (or refuses) access to the local audio source.
#[async_trait]
pub trait MediaCapture: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn LocalAudioSource>, MeshError>;
}

/// Capture that always hands out the same, already opened source.
pub struct StaticCapture {
    source: Arc<dyn LocalAudioSource>,
}

impl StaticCapture {
    pub fn new(source: Arc<dyn LocalAudioSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl MediaCapture for StaticCapture {
    async fn open(&self) -> Result<Arc<dyn LocalAudioSource>, MeshError> {
        Ok(self.source.clone())
    }
}

/// Capture for an actor whose microphone permission was refused.
pub struct DeniedCapture {
    reason: String,
}

impl DeniedCapture {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl MediaCapture for DeniedCapture {
    async fn open(&self) -> Result<Arc<dyn LocalAudioSource>, MeshError> {
        Err(MeshError::MediaCaptureDenied(self.reason.clone()))
    }
}
