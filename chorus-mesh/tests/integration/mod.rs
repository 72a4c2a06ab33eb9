pub mod recovery_tests;

use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

use chorus_core::SessionId;
use chorus_mesh::{
    LocalIdentity, MeshConfig, MemorySignalingHub, SilenceSource, StaticCapture, VoiceClient,
    VoiceSession,
};

use crate::utils::MockMediaFactory;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Short timings so recovery paths run within a test.
pub fn test_config() -> MeshConfig {
    MeshConfig {
        ice_servers: Vec::new(),
        negotiation_timeout: Duration::from_secs(5),
        retry_backoff: Duration::from_millis(300),
        max_retry_attempts: Some(3),
        tick_interval: Duration::from_millis(50),
        publish_attempts: 2,
        publish_retry_delay: Duration::from_millis(10),
        publish_flush_timeout: Duration::from_millis(500),
        ..MeshConfig::default()
    }
}

/// One participant's client wired to a shared hub and its own mock media stack.
pub struct TestPeer {
    pub client: VoiceClient,
    pub media: MockMediaFactory,
}

impl TestPeer {
    pub fn new(hub: &MemorySignalingHub, id: &str, name: &str, config: MeshConfig) -> Self {
        let media = MockMediaFactory::new();
        let client = VoiceClient::new(
            Arc::new(LocalIdentity::new(id, name)),
            Arc::new(hub.clone()),
            Arc::new(media.clone()),
            Arc::new(StaticCapture::new(Arc::new(SilenceSource::start()))),
            config,
        );
        Self { client, media }
    }

    pub async fn join(&self, session: &SessionId) -> VoiceSession {
        self.client
            .join(session.clone())
            .await
            .expect("join should succeed")
    }
}
