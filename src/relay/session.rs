//! Relay session (component H): a nearly transparent 1:1 tunnel between
//! one client WebSocket and one backend WebSocket, sniffing `traceId`
//! off client->server frames for logging only (§4.6). Grounded in the
//! teacher's `tokio_tungstenite::connect_async` outbound-connection
//! pattern used for the Slack socket-mode client.

use crate::health::Metrics;
use crate::protocol::ServerEvent;
use crate::queue::PreReadyQueue;
use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tracing::{info, warn};

pub struct RelaySession {
    pub trace_id: Option<String>,
    pub saw_start: bool,
    pub(crate) queue: PreReadyQueue,
}

impl RelaySession {
    pub fn new(queue_cap: usize) -> Self {
        Self { trace_id: None, saw_start: false, queue: PreReadyQueue::new(queue_cap) }
    }

    fn sniff(&mut self, text: &str) {
        if let Ok(event) = serde_json::from_str::<serde_json::Value>(text) {
            if event.get("type").and_then(|v| v.as_str()) == Some("start") {
                self.saw_start = true;
            }
            if let Some(trace_id) = event.get("traceId").and_then(|v| v.as_str()) {
                self.trace_id = Some(trace_id.to_string());
            }
        }
    }
}

/// Drive one client<->backend tunnel to completion. Forwards frames
/// byte-identically in both directions after the client->server sniff;
/// frames arriving from the client before the backend connection is
/// established are queued FIFO (§5) and flushed the moment it opens.
pub async fn run(client_socket: WebSocket, downstream_url: String, queue_cap: usize, metrics: Arc<Metrics>) {
    let mut session = RelaySession::new(queue_cap);
    metrics.session_started();
    let (mut client_tx, mut client_rx) = client_socket.split();

    let mut connect_fut = Box::pin(tokio_tungstenite::connect_async(downstream_url.clone()));
    let (mut backend_tx, mut backend_rx) = loop {
        tokio::select! {
            conn = &mut connect_fut => {
                match conn {
                    Ok((ws, _)) => break ws.split(),
                    Err(e) => {
                        warn!(error = %e, url = %downstream_url, "relay failed to reach backend");
                        let err = ServerEvent::error("backend connection closed");
                        if let Ok(text) = err.encode() {
                            let _ = client_tx.send(AxumMessage::Text(text.into())).await;
                        }
                        metrics.session_ended();
                        return;
                    }
                }
            }
            client_msg = client_rx.next() => {
                match client_msg {
                    Some(Ok(AxumMessage::Text(text))) => {
                        session.sniff(&text);
                        if session.queue.push(text.to_string()) {
                            metrics.queue_overflow();
                            warn!("relay pre-ready queue overflow while waiting for backend");
                        }
                    }
                    Some(Ok(AxumMessage::Close(_))) | None => {
                        metrics.session_ended();
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "client socket error while connecting to backend");
                        metrics.session_ended();
                        return;
                    }
                }
            }
        }
    };

    for queued in session.queue.drain() {
        if backend_tx.send(TungsteniteMessage::Text(queued.into())).await.is_err() {
            metrics.session_ended();
            return;
        }
    }

    loop {
        tokio::select! {
            client_msg = client_rx.next() => {
                match client_msg {
                    Some(Ok(AxumMessage::Text(text))) => {
                        session.sniff(&text);
                        if backend_tx.send(TungsteniteMessage::Text(text.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(AxumMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "client socket error");
                        break;
                    }
                }
            }
            backend_msg = backend_rx.next() => {
                match backend_msg {
                    Some(Ok(TungsteniteMessage::Text(text))) => {
                        if client_tx.send(AxumMessage::Text(text.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(TungsteniteMessage::Close(_))) | None => {
                        let err = ServerEvent::error("backend connection closed");
                        if let Ok(text) = err.encode() {
                            let _ = client_tx.send(AxumMessage::Text(text.into())).await;
                        }
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "backend socket error");
                        break;
                    }
                }
            }
        }
    }

    let _ = backend_tx.close().await;
    let _ = client_tx.close().await;
    metrics.session_ended();
    info!(trace_id = ?session.trace_id, saw_start = session.saw_start, stage = "teardown", "relay session closed");
}
