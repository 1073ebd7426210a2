//! Relay WebSocket server: accepts client connections and spawns one
//! `relay::session::run` tunnel per connection.

use crate::health::Metrics;
use crate::relay::session::run;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

#[derive(Clone)]
pub struct RelayState {
    pub downstream_url: String,
    pub queue_cap: usize,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: Arc<RelayState>) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        run(socket, state.downstream_url.clone(), state.queue_cap, state.metrics.clone()).await;
    })
}
