//! Real-time viewer channel.
//!
//! Every connected socket receives each canvas event as one JSON text frame
//! `{type, data, timestamp}`. Inbound frames are ignored apart from close.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::AppState;

/// `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move { viewer_session(socket, state).await })
}

async fn viewer_session(socket: WebSocket, state: AppState) {
    let events = state.engine.events();
    let mut feed = events.subscribe();
    debug!(viewers = events.viewer_count(), "Viewer connected");

    let (mut sink, mut inbound) = socket.split();
    let period = Duration::from_secs(state.config.server.ws_ping_interval_secs.max(1));
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            event = feed.recv() => match event {
                Ok(frame) => {
                    if sink.send(Message::Text(frame.as_ref().into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Viewer fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            frame = inbound.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = heartbeat.tick() => {
                if sink.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
        }
    }

    drop(feed);
    debug!(viewers = events.viewer_count(), "Viewer disconnected");
}
