// Common test utilities for integration tests
// Runs a scripted in-process chat server so session tests exercise the real
// WebSocket transport without external infrastructure.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use futures_util::{SinkExt, StreamExt};
use log::LevelFilter;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// How the scripted server reacts to an incoming chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerBehavior {
    /// ws_ready, then ack + delivered for every message frame; a chat_open
    /// frame triggers a peer message back.
    Ready,
    /// ws_ready, then ack + failed for every message frame.
    FailDelivery,
    /// Accept the socket and immediately drop it, before any ws_ready.
    DropBeforeReady,
    /// Accept the socket and keep it open without ever sending ws_ready.
    StallBeforeReady,
}

/// Spawn a chat server on an ephemeral port. Returns the ws:// endpoint and
/// a counter of accepted connections (used to verify connect idempotence).
pub async fn spawn_chat_server(behavior: ServerBehavior) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("test server addr");
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve_session(stream, behavior));
        }
    });

    (format!("ws://{}", addr), accepted)
}

async fn serve_session(stream: tokio::net::TcpStream, behavior: ServerBehavior) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let (mut sink, mut source) = ws.split();

    if behavior == ServerBehavior::DropBeforeReady {
        return;
    }

    if behavior == ServerBehavior::StallBeforeReady {
        // Drain frames so the socket stays healthy, but never signal
        // readiness; clients should give up on their own.
        while let Some(Ok(_)) = source.next().await {}
        return;
    }

    let _ = sink
        .send(WsMessage::Text(json!({"type": "ws_ready"}).to_string()))
        .await;

    while let Some(Ok(message)) = source.next().await {
        let WsMessage::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        match frame["type"].as_str() {
            Some("message") => {
                let local_id = frame["localId"].as_str().unwrap_or_default();
                let _ = sink
                    .send(WsMessage::Text(
                        json!({"type": "ack", "localId": local_id}).to_string(),
                    ))
                    .await;
                let outcome = match behavior {
                    ServerBehavior::FailDelivery => "failed",
                    _ => "delivered",
                };
                let _ = sink
                    .send(WsMessage::Text(
                        json!({"type": outcome, "localId": local_id}).to_string(),
                    ))
                    .await;
            }
            Some("chat_open") => {
                let with = frame["with"].as_str().unwrap_or("peer@x.com");
                let _ = sink
                    .send(WsMessage::Text(
                        json!({
                            "type": "message",
                            "from": with,
                            "text": "welcome",
                            "id": "srv-1"
                        })
                        .to_string(),
                    ))
                    .await;
            }
            _ => {}
        }
    }
}
