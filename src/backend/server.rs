//! Voice backend WebSocket server: accepts upstream (relay or bridge)
//! connections and drives one `BackendSession` per socket.

use crate::backend::asr::AsrEngine;
use crate::backend::session::BackendSession;
use crate::backend::tts::TtsEngine;
use crate::config::BackendConfig;
use crate::conversation::{ConversationCore, ReferenceConversation};
use crate::health::{backend_readiness, Metrics};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::sink::TranscriptSink;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

pub struct BackendState {
    pub config: BackendConfig,
    pub conversation: Arc<dyn ConversationCore>,
    pub asr: Arc<AsrEngine>,
    pub tts: Arc<TtsEngine>,
    pub metrics: Arc<Metrics>,
    pub sink: Arc<TranscriptSink>,
}

impl BackendState {
    pub fn new(config: BackendConfig) -> Self {
        let asr = Arc::new(AsrEngine::new(config.asr_binary_path.clone(), config.asr_model_path.clone()));
        let tts = Arc::new(TtsEngine::new(
            config.tts_binary_path.clone(),
            config.tts_model_path.clone(),
            config.tts_config_path.clone(),
        ));
        let sink = Arc::new(TranscriptSink::new(config.transcript_sink_url.clone()));
        Self {
            config,
            conversation: Arc::new(ReferenceConversation::new()),
            asr,
            tts,
            metrics: Arc::new(Metrics::new()),
            sink,
        }
    }
}

pub fn router(state: Arc<BackendState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<BackendState>>) -> impl IntoResponse {
    let snapshot = backend_readiness(&state.config);
    axum::Json(snapshot)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<BackendState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<BackendState>) {
    let (mut sink, mut stream) = socket.split();
    let mut session = BackendSession::new(
        &state.config,
        state.conversation.clone(),
        state.asr.clone(),
        state.tts.clone(),
        state.metrics.clone(),
        state.sink.clone(),
    );
    state.metrics.session_started();
    info!(session_id = %session.session_id, "backend session started");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ServerEvent>();

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event.encode() {
                Ok(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode server event"),
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => break,
            _ => continue,
        };
        match ClientEvent::decode(&text) {
            Ok(ClientEvent::End {}) => break,
            Ok(event) => session.handle(event, &tx).await,
            Err(e) => {
                let _ = tx.send(ServerEvent::error(e.as_event_message()));
            }
        }
    }

    drop(tx);
    let _ = send_task.await;
    state.metrics.session_ended();
    info!(session_id = %session.session_id, "backend session ended");
}
