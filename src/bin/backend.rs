//! Voice backend entry point.

use clap::Parser;
use std::sync::Arc;
use voxpipe::backend::server::{router, BackendState};
use voxpipe::config::BackendConfig;
use voxpipe::health::backend_readiness;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    voxpipe::trace::init_logging();

    let config = BackendConfig::parse();
    let readiness = backend_readiness(&config);
    println!(
        "voxpipe-backend listening on {} (ready: {}, input {}Hz, output {}Hz)",
        config.listen_addr, readiness.ready, readiness.input_sample_rate, readiness.output_sample_rate
    );
    if !readiness.ready {
        for missing in &readiness.missing {
            tracing::warn!(missing = %missing, "backend readiness check failed");
        }
    }

    let state = Arc::new(BackendState::new(config.clone()));
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
