// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `/ws/agent`: the single push channel endpoint (spec §6). Grounded on the
//! teacher's `http::ws::ws_handler`/`handle_socket` pair — upgrade, then
//! `tokio::select!` between inbound client frames and the connection's
//! outbound queue — simplified to drop the auth/TLS layer the teacher
//! needed for its remote-control use case (spec: HTTP is localhost-only).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::push::PushBus;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Ping,
    Subscribe,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<crate::http::AppState>) -> Response {
    let push = state.push.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, push))
}

async fn handle_socket(mut socket: WebSocket, push: Arc<PushBus>) {
    let (id, mut rx) = push.register(None);
    debug!(connection_id = %id, "push connection established");
    if socket
        .send(Message::Text(
            serde_json::json!({"type": "connected", "data": {"sessionId": id}, "ts": chrono::Utc::now().timestamp_millis()}).to_string(),
        ))
        .await
        .is_err()
    {
        push.unregister(&id);
        return;
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => handle_client_frame(&push, &id, &text),
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(connection_id = %id, error = %e, "push connection read error");
                        break;
                    }
                }
            }
            envelope = rx.recv() => {
                match envelope {
                    Some(envelope) => {
                        let payload = match serde_json::to_string(&envelope) {
                            Ok(p) => p,
                            Err(e) => {
                                warn!(error = %e, "failed to serialize push envelope");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    push.unregister(&id);
    debug!(connection_id = %id, "push connection closed");
}

fn handle_client_frame(push: &PushBus, id: &str, text: &str) {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::Ping) => {
            push.send_by_id(id, "pong", serde_json::json!({}));
        }
        Ok(ClientFrame::Subscribe) => push.set_subscribed(id, true),
        Err(e) => warn!(connection_id = id, error = %e, "unrecognised push client frame"),
    }
}
