use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use gitlink_types::events::ClientEvent;

use crate::hub::EventHub;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serve one pre-authenticated event socket until either side goes away.
/// The token was validated at the HTTP upgrade layer.
pub async fn handle_connection(socket: WebSocket, hub: EventHub, user_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut user_rx) = hub.register(&user_id).await;

    info!(user_id = %user_id, %conn_id, "Client connected to event socket");

    let ready = ClientEvent::Ready {
        user_id: user_id.clone(),
    };
    if send_event(&mut sender, &ready).await {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut pong_received = true;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = user_rx.recv() => {
                    let Some(event) = event else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                incoming = receiver.next() => {
                    match incoming {
                        Some(Ok(Message::Pong(_))) => pong_received = true,
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        // Clients have nothing to say on this socket.
                        Some(Ok(_)) => {}
                    }
                }
                _ = heartbeat.tick() => {
                    if std::mem::replace(&mut pong_received, false) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(user_id = %user_id, "Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    hub.unregister(&user_id, conn_id).await;
    info!(user_id = %user_id, %conn_id, "Client disconnected from event socket");
}

/// Returns false once the socket can no longer be written to.
async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &ClientEvent,
) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize client event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
