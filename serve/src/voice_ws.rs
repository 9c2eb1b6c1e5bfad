//! WebSocket bridge for the voice session: text frames parse into client
//! frames (interrupts jump the queue by cancelling in-session), outbound
//! events go out as JSON text and audio as binary PCM16.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use valet::voice::{ClientFrame, Outbound};

use crate::app::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session = state.container.voice_session();
    let (inbound_tx, inbound_rx) = mpsc::channel::<ClientFrame>(16);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(64);

    let (ws_tx, mut ws_rx) = futures_split(socket);

    let session_task = tokio::spawn(async move { session.run(inbound_rx, outbound_tx).await });

    let writer = tokio::spawn(async move {
        while let Some(out) = outbound_rx.recv().await {
            let message = match out {
                Outbound::Event(value) => WsMessage::Text(value.to_string()),
                Outbound::Audio(bytes) => WsMessage::Binary(bytes),
                Outbound::Cancelled { reason } => {
                    WsMessage::Text(json!({"type": "cancel", "reason": reason}).to_string())
                }
                Outbound::Complete => WsMessage::Text(json!({"type": "complete"}).to_string()),
                Outbound::Error(message) => {
                    WsMessage::Text(json!({"type": "error", "message": message}).to_string())
                }
            };
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(received) = ws_rx.recv().await {
        let message = match received {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "ws read error (client closed?)");
                break;
            }
        };
        let text = match message {
            WsMessage::Text(t) => t,
            WsMessage::Binary(b) => String::from_utf8_lossy(&b).into_owned(),
            WsMessage::Close(_) => break,
            _ => continue,
        };
        match serde_json::from_str::<ClientFrame>(&text) {
            Ok(frame) => {
                if inbound_tx.send(frame).await.is_err() {
                    break;
                }
            }
            Err(e) => debug!(error = %e, "unparseable voice frame dropped"),
        }
    }

    // Closing the inbound channel lets the session finish and emit
    // client_disconnected before the writer drains.
    drop(inbound_tx);
    let _ = session_task.await;
    let _ = writer.await;
}

/// Splits a WebSocket into sender/receiver halves backed by plain channels so
/// the writer task owns the sink exclusively.
fn futures_split(
    socket: WebSocket,
) -> (
    mpsc::Sender<WsMessage>,
    mpsc::Receiver<Result<WsMessage, axum::Error>>,
) {
    use futures_util::{SinkExt, StreamExt};

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<WsMessage>(64);
    let (in_tx, in_rx) = mpsc::channel::<Result<WsMessage, axum::Error>>(64);

    tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });
    tokio::spawn(async move {
        while let Some(item) = stream.next().await {
            if in_tx.send(item).await.is_err() {
                break;
            }
        }
    });

    (out_tx, in_rx)
}
