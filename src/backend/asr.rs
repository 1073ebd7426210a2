//! ASR subprocess orchestration (part of component I, §4.7 step 3).
//!
//! Grounded directly in the teacher's faster-whisper subprocess wrapper:
//! PCM -> WAV via `hound`, piped stdin/stdout, a bounded timeout, and a
//! retry that falls back to a plain-text-output invocation on first
//! failure (the teacher retries identically to ride out a model cold
//! start; here the second attempt also changes the invocation flags).

use anyhow::Context;
use std::time::Duration;
use tracing::{debug, info};

pub struct AsrEngine {
    binary_path: String,
    model_path: String,
    timeout: Duration,
}

impl AsrEngine {
    pub fn new(binary_path: impl Into<String>, model_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            model_path: model_path.into(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Transcribe 16kHz mono PCM16 samples. Empty input yields an empty
    /// transcript without spawning a subprocess (§4.7 step 2).
    pub async fn transcribe(&self, pcm: &[i16]) -> anyhow::Result<String> {
        if pcm.is_empty() {
            return Ok(String::new());
        }

        debug!(samples = pcm.len(), "transcribing utterance");
        let wav_dir = tempfile::tempdir().context("failed to create turn scratch directory")?;
        let wav_path = wav_dir.path().join("utterance.wav");
        write_wav(&wav_path, pcm, 16000)?;

        let mut last_err = None;
        for attempt in 0..2 {
            if attempt > 0 {
                info!(attempt = attempt + 1, "retrying asr transcription");
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            match self.run_once(&wav_path, attempt > 0).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    info!(attempt = attempt + 1, error = %e, "asr attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("asr transcription failed")))
    }

    async fn run_once(&self, wav_path: &std::path::Path, text_fallback: bool) -> anyhow::Result<String> {
        let mut cmd = tokio::process::Command::new(&self.binary_path);
        cmd.arg("--model")
            .arg(&self.model_path)
            .arg("--input")
            .arg(wav_path)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if text_fallback {
            cmd.arg("--output-format").arg("text");
        } else {
            cmd.arg("--output-format").arg("json");
        }

        let child = cmd.spawn().context("failed to spawn asr subprocess")?;
        // `kill_on_drop(true)` above means a timeout here drops the in-flight
        // `wait_with_output` future (and the `Child` it owns), which sends the
        // process a kill signal instead of leaving it orphaned (§5, §9).
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow::anyhow!("asr transcription timed out after {}s", self.timeout.as_secs()))?
            .context("failed to wait for asr subprocess")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!("asr subprocess exited with error: {}", preview(&stderr)));
        }

        if text_fallback {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let value: serde_json::Value = serde_json::from_slice(&output.stdout)
                .context("failed to parse asr json output")?;
            Ok(value.get("text").and_then(|v| v.as_str()).unwrap_or("").trim().to_string())
        }
    }
}

fn write_wav(path: &std::path::Path, samples: &[i16], sample_rate: u32) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).context("failed to create wav writer")?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

fn preview(s: &str) -> String {
    if s.len() > 800 {
        let cut = (0..=800).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0);
        format!("{}...", &s[..cut])
    } else {
        s.to_string()
    }
}
