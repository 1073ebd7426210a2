//! Telephony bridge entry point.

use clap::Parser;
use std::sync::Arc;
use voxpipe::bridge::server::{router, BridgeState};
use voxpipe::config::BridgeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    voxpipe::trace::init_logging();

    let config = BridgeConfig::parse();
    println!(
        "voxpipe-bridge listening on {} -> downstream {}",
        config.listen_addr, config.downstream_url
    );

    let media_ws_url = format!("ws://{}/media", config.listen_addr);
    let state = Arc::new(BridgeState {
        config: config.clone(),
        media_ws_url,
        metrics: Arc::new(voxpipe::health::Metrics::new()),
    });
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
