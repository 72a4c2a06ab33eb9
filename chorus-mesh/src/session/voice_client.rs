use crate::audio::MediaCapture;
use crate::config::MeshConfig;
use crate::error::MeshError;
use crate::identity::{IdentityProvider, LocalIdentity};
use crate::media::MediaTransportFactory;
use crate::session::{
    CoordinatorParts, LocalSessionState, RosterEntry, SessionCommand, SessionCoordinator,
    SessionEvent,
};
use crate::signaling::SignalingTransport;
use chorus_core::{SessionId, SignalingMessage, codec};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Entry point for joining voice sessions.
pub struct VoiceClient {
    identity: Arc<dyn IdentityProvider>,
    signaling: Arc<dyn SignalingTransport>,
    media: Arc<dyn MediaTransportFactory>,
    capture: Arc<dyn MediaCapture>,
    config: MeshConfig,
}

impl VoiceClient {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        signaling: Arc<dyn SignalingTransport>,
        media: Arc<dyn MediaTransportFactory>,
        capture: Arc<dyn MediaCapture>,
        config: MeshConfig,
    ) -> Self {
        Self {
            identity,
            signaling,
            media,
            capture,
            config,
        }
    }

    /// Joins `session_id` and starts meshing with everyone in it.
    ///
    /// Fails with [`MeshError::MediaCaptureDenied`] if the microphone cannot be opened and
    /// with [`MeshError::TransportUnavailable`] if the signaling channel cannot be reached.
    /// Per-peer trouble never fails a join.
    pub async fn join(&self, session_id: impl Into<SessionId>) -> Result<VoiceSession, MeshError> {
        let session_id = session_id.into();
        let local = self.identity.identify();

        let audio_source = self.capture.open().await?;
        let subscription = self.signaling.subscribe(&session_id, &local.id).await?;

        let instance = Uuid::new_v4().to_string();
        let join = SignalingMessage::Join {
            from: local.id.clone(),
            display_name: local.name.clone(),
            instance: instance.clone(),
            reply: false,
        };
        if let Err(e) = self
            .signaling
            .publish(&session_id, codec::encode(&join))
            .await
        {
            warn!("Could not announce {} in {}: {}", local.id, session_id, e);
            self.signaling.unsubscribe(subscription.id).await;
            return Err(e);
        }
        info!("{} ({}) joined session {}", local.name, local.id, session_id);

        let (commands_tx, commands) = mpsc::channel(64);
        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));

        let coordinator = SessionCoordinator::new(CoordinatorParts {
            state: LocalSessionState {
                session_id: session_id.clone(),
                local: local.clone(),
                is_joined: true,
                is_muted: false,
                instance,
                audio_source,
            },
            config: self.config.clone(),
            signaling: self.signaling.clone(),
            subscription: subscription.id,
            signaling_rx: subscription.events,
            media: self.media.clone(),
            commands,
            events: events.clone(),
        });
        let task = tokio::spawn(coordinator.run());

        Ok(VoiceSession {
            session_id,
            local,
            commands: commands_tx,
            events,
            task,
        })
    }
}

/// A joined voice session.
///
/// Dropping the handle leaves the session in the background; [`VoiceSession::leave`] waits
/// for the teardown to finish.
pub struct VoiceSession {
    session_id: SessionId,
    local: LocalIdentity,
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    task: JoinHandle<()>,
}

impl VoiceSession {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn local_participant(&self) -> &LocalIdentity {
        &self.local
    }

    /// Events emitted from now on.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Silences or resumes the outgoing audio towards every peer.
    pub async fn set_muted(&self, muted: bool) -> Result<(), MeshError> {
        let (reply, done) = oneshot::channel();
        self.request(SessionCommand::SetMuted { muted, reply }, done)
            .await
    }

    /// Everyone present, with the state of our connection to them.
    pub async fn roster(&self) -> Result<Vec<RosterEntry>, MeshError> {
        let (reply, roster) = oneshot::channel();
        self.request(SessionCommand::Roster { reply }, roster).await
    }

    /// Announces the departure, closes every peer and cancels the subscription.
    pub async fn leave(self) -> Result<(), MeshError> {
        let (reply, done) = oneshot::channel();
        let result = self.request(SessionCommand::Leave { reply }, done).await;
        if let Err(e) = self.task.await {
            warn!("Session task for {} ended abnormally: {}", self.session_id, e);
        }
        result
    }

    async fn request<T>(
        &self,
        command: SessionCommand,
        response: oneshot::Receiver<T>,
    ) -> Result<T, MeshError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| MeshError::SessionClosed)?;
        response.await.map_err(|_| MeshError::SessionClosed)
    }
}
