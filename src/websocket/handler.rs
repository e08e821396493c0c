//! WebSocket connection handling
//!
//! Each connection gets the current snapshot on connect, then every
//! broadcast message. Clients may send timer commands; their effect reaches
//! them through the broadcast like everyone else.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval_at, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::AppState;
use crate::logging::{log_websocket_connected, log_websocket_disconnected};
use crate::models::websocket_messages::{ClientMessage, ServerMessage};

/// Upgrade `GET /ws`
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let heartbeat = Duration::from_secs(state.config.websocket_heartbeat_interval);
    ws.on_upgrade(move |socket| handle_connection(socket, state, heartbeat))
}

async fn handle_connection(socket: WebSocket, state: AppState, heartbeat: Duration) {
    let connection_id = Uuid::new_v4().to_string();
    log_websocket_connected(&connection_id);

    let (mut sender, mut receiver) = socket.split();

    // Subscribe first so nothing falls between the snapshot and the stream
    let mut updates = state.timer.subscribe();
    let initial = ServerMessage::SessionUpdate(state.timer.snapshot().await);
    if send_message(&mut sender, &initial).await.is_err() {
        log_websocket_disconnected(&connection_id, "send failed");
        return;
    }

    let mut heartbeat = interval_at(Instant::now() + heartbeat, heartbeat);

    let reason = loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_message(&state, &text).await {
                            if send_message(&mut sender, &reply).await.is_err() {
                                break "send failed";
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break "client closed",
                    Some(Ok(_)) => {
                        // Pong, ping and binary frames carry nothing for us
                    }
                    Some(Err(e)) => {
                        warn!(connection_id = %connection_id, error = %e, "WebSocket receive error");
                        break "receive error";
                    }
                }
            }

            update = updates.recv() => {
                let message = match update {
                    Ok(message) => message,
                    Err(RecvError::Lagged(skipped)) => {
                        // Only the latest state matters after falling behind
                        warn!(connection_id = %connection_id, skipped, "Client lagged behind broadcasts");
                        ServerMessage::SessionUpdate(state.timer.snapshot().await)
                    }
                    Err(RecvError::Closed) => break "server shutting down",
                };

                if send_message(&mut sender, &message).await.is_err() {
                    break "send failed";
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break "heartbeat failed";
                }
            }
        }
    };

    log_websocket_disconnected(&connection_id, reason);
}

async fn send_message<S>(sender: &mut S, message: &ServerMessage) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let text = serde_json::to_string(message).map_err(|e| {
        warn!(error = %e, "Failed to serialize WebSocket message");
    })?;
    sender.send(Message::Text(text)).await.map_err(|_| ())
}

/// Apply a client command, returning the reply meant for that client only
pub async fn handle_client_message(state: &AppState, text: &str) -> Option<ServerMessage> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "Unparseable client message");
            return Some(ServerMessage::error("invalid_message", e.to_string()));
        }
    };

    match message {
        ClientMessage::Toggle => {
            state.timer.toggle().await;
            None
        }
        ClientMessage::Reset => {
            state.timer.reset().await;
            None
        }
        ClientMessage::NextMode => {
            state.timer.next_mode().await;
            None
        }
        ClientMessage::SwitchMode { mode } => {
            state.timer.switch_mode(mode).await;
            None
        }
        ClientMessage::GetSession => Some(ServerMessage::SessionUpdate(state.timer.snapshot().await)),
        ClientMessage::Ping => Some(ServerMessage::Pong {
            timestamp: chrono::Utc::now(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;
    use crate::config::Config;
    use crate::models::mode::Mode;

    #[tokio::test]
    async fn test_commands_are_broadcast() {
        let state = test_state(Config::default());
        let mut updates = state.timer.subscribe();

        let reply = handle_client_message(&state, r#"{"type":"switch_mode","mode":"break"}"#).await;
        assert!(reply.is_none());

        // The initial auth-state snapshot may arrive first
        let mut switched = None;
        for _ in 0..3 {
            if let ServerMessage::SessionUpdate(snapshot) = updates.recv().await.unwrap() {
                if snapshot.mode == Mode::ShortBreak {
                    switched = Some(snapshot);
                    break;
                }
            }
        }

        let snapshot = switched.expect("switch was broadcast");
        assert_eq!(snapshot.time, 300);
        assert!(!snapshot.is_running);
    }

    #[tokio::test]
    async fn test_direct_replies() {
        let state = test_state(Config::default());

        let reply = handle_client_message(&state, r#"{"type":"ping"}"#).await;
        assert!(matches!(reply, Some(ServerMessage::Pong { .. })));

        let reply = handle_client_message(&state, r#"{"type":"get_session"}"#).await;
        match reply {
            Some(ServerMessage::SessionUpdate(snapshot)) => assert_eq!(snapshot.mode, Mode::Focus),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_message_gets_error_reply() {
        let state = test_state(Config::default());

        let reply = handle_client_message(&state, r#"{"type":"launch"}"#).await;
        match reply {
            Some(ServerMessage::Error(error)) => assert_eq!(error.code, "invalid_message"),
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
