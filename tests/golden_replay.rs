//! Golden replay harness (component K, §4.10 and §8 S6) exercised end
//! to end against a live backend: a 16 kHz mono WAV is streamed over a
//! real WebSocket and the resulting run report is checked for
//! determinism across two successive runs, matching S6's requirement
//! that repeated runs produce identical events modulo timing.

use std::io::Write as _;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use voxpipe::backend::server::{router, BackendState};
use voxpipe::config::BackendConfig;
use voxpipe::replay::run_replay;

fn write_fake_tts_binary(dir: &std::path::Path) -> String {
    let wav_path = dir.join("fixture.wav");
    let spec = hound::WavSpec { channels: 1, sample_rate: 24000, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
    let mut writer = hound::WavWriter::create(&wav_path, spec).unwrap();
    for i in 0..480i16 {
        writer.write_sample(i % 50).unwrap();
    }
    writer.finalize().unwrap();

    let script_path = dir.join("fake_tts.sh");
    let mut file = std::fs::File::create(&script_path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    writeln!(file, "cat \"{}\"", wav_path.display()).unwrap();
    drop(file);
    let mut perms = std::fs::metadata(&script_path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script_path, perms).unwrap();
    script_path.to_string_lossy().to_string()
}

/// A shell script standing in for the ASR engine: always reports a fixed
/// transcript in the JSON shape `asr.rs` expects from the non-fallback path.
fn write_fake_asr_binary(dir: &std::path::Path) -> String {
    let script_path = dir.join("fake_asr.sh");
    let mut file = std::fs::File::create(&script_path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    writeln!(file, "echo '{{\"text\":\"test tone\"}}'").unwrap();
    drop(file);
    let mut perms = std::fs::metadata(&script_path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script_path, perms).unwrap();
    script_path.to_string_lossy().to_string()
}

fn write_replay_wav(dir: &std::path::Path) -> String {
    let wav_path = dir.join("replay_input.wav");
    let spec = hound::WavSpec { channels: 1, sample_rate: 16000, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
    let mut writer = hound::WavWriter::create(&wav_path, spec).unwrap();
    for i in 0..3200i16 {
        // 200ms of a low-amplitude tone.
        writer.write_sample(((i as f32 * 0.2).sin() * 5000.0) as i16).unwrap();
    }
    writer.finalize().unwrap();
    wav_path.to_string_lossy().to_string()
}

async fn spawn_backend(dir: &std::path::Path) -> String {
    let tts_binary = write_fake_tts_binary(dir);
    let asr_binary = write_fake_asr_binary(dir);
    let model_stub = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml").to_string();

    let config = BackendConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        input_sample_rate: 16000,
        output_sample_rate: 24000,
        asr_binary_path: asr_binary,
        asr_model_path: model_stub.clone(),
        tts_binary_path: tts_binary,
        tts_model_path: model_stub.clone(),
        tts_config_path: model_stub,
        resampler_binary_path: None,
        transcript_sink_url: None,
    };

    let state = Arc::new(BackendState::new(config.clone()));
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("ws://{addr}/ws")
}

#[tokio::test]
async fn two_replay_runs_against_the_same_backend_produce_identical_reports() {
    let dir = tempfile::tempdir().unwrap();
    let wav_path = write_replay_wav(dir.path());

    let url_a = spawn_backend(dir.path()).await;
    let report_a = run_replay(&url_a, &wav_path, true, std::time::Duration::from_secs(10)).await.unwrap();

    let url_b = spawn_backend(dir.path()).await;
    let report_b = run_replay(&url_b, &wav_path, true, std::time::Duration::from_secs(10)).await.unwrap();

    assert!(report_a.saw_ready);
    assert!(report_a.saw_completed);
    assert_eq!(report_a.assistant_text, report_b.assistant_text);
    assert_eq!(report_a.audio_delta_chunks, report_b.audio_delta_chunks);
    assert_eq!(report_a.events, report_b.events);
}
