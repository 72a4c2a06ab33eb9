use crate::RelayService;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chorus_core::{ParticipantId, SessionId};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((session, participant)): Path<(String, String)>,
    State(service): State<RelayService>,
) -> impl IntoResponse {
    let session = SessionId::from(session);
    let participant = ParticipantId::from(participant);

    ws.on_upgrade(move |socket| handle_socket(socket, session, participant, service))
}

async fn handle_socket(
    socket: WebSocket,
    session: SessionId,
    participant: ParticipantId,
    service: RelayService,
) {
    info!("New WebSocket connection: {} in {}", participant, session);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    service.add_participant(&session, &participant, tx.clone());

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let service = service.clone();
        let session = session.clone();
        let participant = participant.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                let routed = match &msg {
                    Message::Text(text) => {
                        service.route(&session, &participant, text.as_str().as_bytes())
                    }
                    Message::Binary(data) => service.route(&session, &participant, data),
                    Message::Close(_) => break,
                    _ => continue,
                };
                match routed {
                    Ok(delivered) => {
                        debug!("Relayed signal from {} to {} peers", participant, delivered)
                    }
                    Err(e) => warn!("Dropping signal from {}: {}", participant, e),
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    service.remove_participant(&session, &participant, &tx);
    info!("WebSocket disconnected: {} in {}", participant, session);
}
