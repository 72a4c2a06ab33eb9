use chorus_core::{ParticipantId, SessionId};
use chorus_relay::RelayService;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Timeout for a frame to arrive (ms).
pub const FRAME_TIMEOUT_MS: u64 = 2000;

/// A relay served on an ephemeral loopback port for the duration of a test.
pub struct RelayHarness {
    pub addr: SocketAddr,
    pub service: RelayService,
    server: JoinHandle<()>,
}

impl RelayHarness {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let service = RelayService::new();
        let server = tokio::spawn({
            let service = service.clone();
            async move {
                let _ = chorus_relay::serve(listener, service).await;
            }
        });
        Self {
            addr,
            service,
            server,
        }
    }

    pub fn base_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn url(&self, session: &SessionId, participant: &ParticipantId) -> String {
        format!("{}/ws/{}/{}", self.base_url(), session, participant)
    }

    /// Waits until the relay's table for `session` equals `expected`.
    pub async fn wait_for_participants(&self, session: &SessionId, expected: &[&str]) -> bool {
        let expected: Vec<ParticipantId> = expected
            .iter()
            .map(|id| ParticipantId::from(*id))
            .collect();
        let deadline = tokio::time::Instant::now() + Duration::from_millis(FRAME_TIMEOUT_MS);
        while tokio::time::Instant::now() < deadline {
            if self.service.participants(session) == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for RelayHarness {
    fn drop(&mut self) {
        self.server.abort();
    }
}
