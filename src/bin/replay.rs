//! Golden replay harness entry point.

use clap::Parser;
use std::time::Duration;
use voxpipe::config::ReplayConfig;
use voxpipe::replay::run_replay;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    voxpipe::trace::init_logging();

    let config = ReplayConfig::parse();
    let report = run_replay(
        &config.target_url,
        &config.wav_path,
        config.send_commit,
        Duration::from_secs(config.timeout_secs),
    )
    .await?;

    let serialized = serde_json::to_string_pretty(&report)?;
    match &config.report_path {
        Some(path) => std::fs::write(path, &serialized)?,
        None => println!("{serialized}"),
    }

    if !report.saw_completed {
        anyhow::bail!("replay run did not observe response_completed");
    }
    Ok(())
}
