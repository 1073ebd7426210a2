//! Relay entry point.

use clap::Parser;
use std::sync::Arc;
use voxpipe::config::RelayConfig;
use voxpipe::relay::server::{router, RelayState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    voxpipe::trace::init_logging();

    let config = RelayConfig::parse();
    println!(
        "voxpipe-relay listening on {} -> downstream {}",
        config.listen_addr, config.downstream_url
    );

    let state = Arc::new(RelayState {
        downstream_url: config.downstream_url.clone(),
        queue_cap: config.pre_ready_queue_cap,
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
