//! TTS subprocess orchestration (part of component I, §4.7 step 7).
//!
//! The teacher's TTS client is HTTP-based (`tts_local.rs`); this spec
//! requires a subprocess engine instead, so the invocation shape follows
//! `asr.rs`/`stt_local.rs`'s subprocess pattern while the manual WAV
//! chunk parser is carried over from the teacher's `wav_to_pcm_i16`,
//! which already handles the streaming `0xFFFFFFFF` data-chunk-size case
//! some TTS engines emit on stdout.

use anyhow::Context;
use std::time::Duration;
use tracing::debug;

pub struct TtsEngine {
    binary_path: String,
    model_path: String,
    config_path: String,
    timeout: Duration,
}

impl TtsEngine {
    pub fn new(binary_path: impl Into<String>, model_path: impl Into<String>, config_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            model_path: model_path.into(),
            config_path: config_path.into(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Synthesize one chunk of text to mono PCM16 at `sample_rate`. No retry (§7).
    pub async fn synthesize(&self, text: &str, sample_rate: u32) -> anyhow::Result<Vec<i16>> {
        debug!(chars = text.len(), sample_rate, "synthesizing tts chunk");

        let child = tokio::process::Command::new(&self.binary_path)
            .arg("--model")
            .arg(&self.model_path)
            .arg("--config")
            .arg(&self.config_path)
            .arg("--sample-rate")
            .arg(sample_rate.to_string())
            .arg("--text")
            .arg(text)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn tts subprocess")?;

        // `kill_on_drop(true)` above means a timeout here drops the in-flight
        // `wait_with_output` future (and the `Child` it owns), which sends the
        // process a kill signal instead of leaving it orphaned (§5, §9).
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow::anyhow!("tts synthesis timed out after {}s", self.timeout.as_secs()))?
            .context("failed to wait for tts subprocess")?;

        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "tts subprocess exited with error: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        wav_to_pcm_i16(&output.stdout)
    }
}

/// Parse a WAV byte stream into mono PCM16 samples, tolerating the
/// streaming `0xFFFFFFFF` "unknown length" data-chunk-size marker some
/// TTS engines emit when writing to a pipe instead of a seekable file.
pub fn wav_to_pcm_i16(bytes: &[u8]) -> anyhow::Result<Vec<i16>> {
    if bytes.len() < 44 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        anyhow::bail!("not a RIFF/WAVE byte stream");
    }

    let mut pos = 12;
    let mut bits_per_sample = 16u16;
    let mut channels = 1u16;
    let mut data: Option<&[u8]> = None;

    while pos + 8 <= bytes.len() {
        let chunk_id = &bytes[pos..pos + 4];
        let mut chunk_size = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap()) as usize;
        let chunk_start = pos + 8;

        if chunk_id == b"fmt " {
            anyhow::ensure!(chunk_start + 16 <= bytes.len(), "truncated fmt chunk in wav stream");
            channels = u16::from_le_bytes(bytes[chunk_start + 2..chunk_start + 4].try_into().unwrap());
            bits_per_sample = u16::from_le_bytes(bytes[chunk_start + 14..chunk_start + 16].try_into().unwrap());
        } else if chunk_id == b"data" {
            if chunk_size == 0xFFFF_FFFF || chunk_start + chunk_size > bytes.len() {
                chunk_size = bytes.len() - chunk_start;
            }
            data = Some(&bytes[chunk_start..chunk_start + chunk_size]);
            break;
        }

        pos = chunk_start + chunk_size + (chunk_size % 2);
    }

    let data = data.ok_or_else(|| anyhow::anyhow!("wav stream has no data chunk"))?;

    let mut samples: Vec<i16> = match bits_per_sample {
        16 => data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect(),
        32 => data
            .chunks_exact(4)
            .map(|c| {
                let f = f32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                (f.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
            })
            .collect(),
        other => anyhow::bail!("unsupported bits_per_sample: {other}"),
    };

    if channels == 2 {
        samples = samples.chunks_exact(2).map(|c| ((c[0] as i32 + c[1] as i32) / 2) as i16).collect();
    }

    Ok(samples)
}
