//! Environment-driven configuration for the three service binaries.
//!
//! Each binary parses only the slice of `env` vars it needs via `clap`'s
//! `env` derive feature, the way a long-running daemon is configured by
//! its supervisor rather than a TOML file on disk.

use clap::Parser;
use std::net::SocketAddr;

/// Shared VAD/commit-detector tuning, reused by bridge and backend config structs.
#[derive(Parser, Debug, Clone)]
pub struct VadConfig {
    /// RMS gate above which a frame is considered speech.
    #[arg(long, env = "VAD_THRESHOLD", default_value_t = 0.012)]
    pub vad_threshold: f32,

    /// Silence duration after speech before an automatic commit fires.
    #[arg(long, env = "COMMIT_SILENCE_MS", default_value_t = 900)]
    pub commit_silence_ms: u64,

    /// Forced commit after this much continuous speech; 0 disables.
    #[arg(long, env = "MAX_UTTERANCE_MS", default_value_t = 0)]
    pub max_utterance_ms: u64,

    /// Drop outbound audio and interrupt the backend on caller speech.
    #[arg(long, env = "BARGE_IN", default_value_t = true)]
    pub barge_in: bool,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "voxpipe-bridge")]
pub struct BridgeConfig {
    /// Listen address for carrier media WebSocket upgrades.
    #[arg(long, env = "BRIDGE_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,

    /// WebSocket URL of the downstream relay (or backend, if relay is skipped).
    #[arg(long, env = "DOWNSTREAM_URL")]
    pub downstream_url: String,

    #[command(flatten)]
    pub vad: VadConfig,

    /// Bound on the pre-ready outbound send queue; oldest entry dropped on overflow.
    #[arg(long, env = "PRE_READY_QUEUE_CAP", default_value_t = 1000)]
    pub pre_ready_queue_cap: usize,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "voxpipe-relay")]
pub struct RelayConfig {
    /// Listen address for inbound client WebSocket connections.
    #[arg(long, env = "RELAY_LISTEN_ADDR", default_value = "0.0.0.0:8081")]
    pub listen_addr: SocketAddr,

    /// WebSocket URL of the voice backend this relay tunnels to.
    #[arg(long, env = "DOWNSTREAM_URL")]
    pub downstream_url: String,

    #[arg(long, env = "PRE_READY_QUEUE_CAP", default_value_t = 1000)]
    pub pre_ready_queue_cap: usize,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "voxpipe-backend")]
pub struct BackendConfig {
    /// Listen address for inbound relay/bridge WebSocket connections.
    #[arg(long, env = "BACKEND_LISTEN_ADDR", default_value = "0.0.0.0:8082")]
    pub listen_addr: SocketAddr,

    /// PCM rate accepted from upstream; fixed by protocol but kept configurable for tests.
    #[arg(long, env = "INPUT_SAMPLE_RATE", default_value_t = 16000)]
    pub input_sample_rate: u32,

    /// Default negotiated output sample rate when the client doesn't request one.
    #[arg(long, env = "OUTPUT_SAMPLE_RATE", default_value_t = 24000)]
    pub output_sample_rate: u32,

    /// Path to the ASR engine binary.
    #[arg(long, env = "ASR_BINARY_PATH")]
    pub asr_binary_path: String,

    /// Path to the ASR model file.
    #[arg(long, env = "ASR_MODEL_PATH")]
    pub asr_model_path: String,

    /// Path to the TTS engine binary.
    #[arg(long, env = "TTS_BINARY_PATH")]
    pub tts_binary_path: String,

    /// Path to the TTS model file.
    #[arg(long, env = "TTS_MODEL_PATH")]
    pub tts_model_path: String,

    /// Path to the TTS voice/config file.
    #[arg(long, env = "TTS_CONFIG_PATH")]
    pub tts_config_path: String,

    /// Optional external resampler binary used for TTS post-processing.
    #[arg(long, env = "RESAMPLER_BINARY_PATH")]
    pub resampler_binary_path: Option<String>,

    /// Optional HTTP endpoint that receives fire-and-forget transcript records.
    #[arg(long, env = "TRANSCRIPT_SINK_URL")]
    pub transcript_sink_url: Option<String>,
}

impl BackendConfig {
    /// §4.9: readiness is the conjunction of ASR/TTS binaries and model files existing.
    pub fn check_readiness(&self) -> Vec<String> {
        let mut missing = Vec::new();
        let paths = [
            ("asr binary", self.asr_binary_path.as_str()),
            ("asr model", self.asr_model_path.as_str()),
            ("tts binary", self.tts_binary_path.as_str()),
            ("tts model", self.tts_model_path.as_str()),
            ("tts config", self.tts_config_path.as_str()),
        ];
        for (label, path) in paths {
            match std::fs::metadata(path) {
                Ok(meta) if meta.len() > 0 || meta.is_dir() => {}
                Ok(_) => missing.push(format!("{label} is empty: {path}")),
                Err(_) => missing.push(format!("{label} not found: {path}")),
            }
        }
        missing
    }

    pub fn output_sample_rate_valid(&self) -> bool {
        matches!(self.output_sample_rate, 8000 | 16000 | 24000)
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "voxpipe-replay")]
pub struct ReplayConfig {
    /// WebSocket URL of the relay (or backend) to exercise.
    #[arg(long, env = "DOWNSTREAM_URL")]
    pub target_url: String,

    /// Path to a mono 16-bit PCM WAV file sampled at 16 kHz.
    #[arg(long)]
    pub wav_path: String,

    /// Whether to send an explicit `commit` after streaming the WAV.
    #[arg(long, default_value_t = true)]
    pub send_commit: bool,

    /// Maximum time to wait for `response_completed` before failing.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Where to write the JSON run report; stdout if omitted.
    #[arg(long)]
    pub report_path: Option<String>,
}
