//! Telephony bridge HTTP/WebSocket server: serves the TwiML-shaped voice
//! webhook response (§6.2) and accepts carrier media WebSocket upgrades.

use crate::bridge::session::run;
use crate::config::BridgeConfig;
use crate::health::Metrics;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

#[derive(Clone)]
pub struct BridgeState {
    pub config: BridgeConfig,
    pub media_ws_url: String,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: Arc<BridgeState>) -> Router {
    Router::new()
        .route("/voice", post(voice_webhook))
        .route("/media", get(ws_handler))
        .with_state(state)
}

async fn voice_webhook(State(state): State<Arc<BridgeState>>) -> Response {
    let twiml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect><Stream url="{}"/></Connect></Response>"#,
        state.media_ws_url
    );
    ([("Content-Type", "text/xml")], twiml).into_response()
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<BridgeState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        run(socket, state.config.clone(), None, state.metrics.clone()).await;
    })
}
