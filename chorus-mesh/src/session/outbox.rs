use crate::config::MeshConfig;
use crate::error::MeshError;
use crate::session::SessionEvent;
use crate::signaling::SignalingTransport;
use chorus_core::{SessionId, SignalingMessage, codec};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

enum OutboxItem {
    Publish(SignalingMessage),
    Flush(oneshot::Sender<()>),
}

/// Publishes outbound signals in order on a task of its own, so the coordinator never waits
/// on the signaling transport.
pub struct Outbox {
    tx: mpsc::UnboundedSender<OutboxItem>,
    task: JoinHandle<()>,
}

impl Outbox {
    pub fn spawn(
        signaling: Arc<dyn SignalingTransport>,
        session: SessionId,
        config: &MeshConfig,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let attempts = config.publish_attempts.max(1);
        let retry_delay = config.publish_retry_delay;

        let task = tokio::spawn(async move {
            let mut failing = false;
            while let Some(item) = rx.recv().await {
                let message = match item {
                    OutboxItem::Publish(message) => message,
                    OutboxItem::Flush(done) => {
                        let _ = done.send(());
                        continue;
                    }
                };

                match publish(signaling.as_ref(), &session, &message, attempts, retry_delay).await {
                    Ok(()) => failing = false,
                    Err(e) => {
                        error!(
                            "Giving up on publishing {} to session {}: {}",
                            message.op(),
                            session,
                            e
                        );
                        if !failing {
                            failing = true;
                            let _ = events.send(SessionEvent::SignalingError {
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
        });

        Self { tx, task }
    }

    pub fn send(&self, message: SignalingMessage) {
        debug!("Queueing {} for {:?}", message.op(), message.to());
        if self.tx.send(OutboxItem::Publish(message)).is_err() {
            warn!("Outbox is closed, dropping signal");
        }
    }

    /// Waits until everything queued so far was published or given up on.
    pub async fn flush(&self, timeout: Duration) {
        let (done, flushed) = oneshot::channel();
        if self.tx.send(OutboxItem::Flush(done)).is_ok()
            && tokio::time::timeout(timeout, flushed).await.is_err()
        {
            warn!("Timed out flushing outbound signals");
        }
    }
}

impl Drop for Outbox {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn publish(
    signaling: &dyn SignalingTransport,
    session: &SessionId,
    message: &SignalingMessage,
    attempts: u32,
    retry_delay: Duration,
) -> Result<(), MeshError> {
    let payload = codec::encode(message);
    let mut attempt = 1;
    loop {
        match signaling.publish(session, payload.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < attempts => {
                warn!(
                    "Publishing {} failed (attempt {}/{}): {}",
                    message.op(),
                    attempt,
                    attempts,
                    e
                );
                attempt += 1;
                tokio::time::sleep(retry_delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
