//! Integration test for the voice backend's wire protocol (§8 S1): a
//! real TCP listener and a real WebSocket client drive a text-only turn
//! end to end, the way the golden replay harness does against a live
//! server rather than calling `BackendSession` directly.

use futures_util::{SinkExt, StreamExt};
use std::io::Write as _;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;
use voxpipe::backend::server::{router, BackendState};
use voxpipe::config::BackendConfig;
use voxpipe::protocol::{ClientEvent, ServerEvent};

/// Writes a tiny shell script that `cat`s a pre-built single-channel
/// PCM16 WAV fixture, standing in for the real TTS engine subprocess.
fn write_fake_tts_binary(dir: &std::path::Path) -> String {
    let wav_path = dir.join("fixture.wav");
    let spec = hound::WavSpec { channels: 1, sample_rate: 24000, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
    let mut writer = hound::WavWriter::create(&wav_path, spec).unwrap();
    for i in 0..480i16 {
        writer.write_sample(i % 100).unwrap();
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

async fn spawn_backend() -> String {
    let dir = tempfile::tempdir().unwrap();
    let tts_binary = write_fake_tts_binary(dir.path());
    let model_stub = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml").to_string();

    let config = BackendConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        input_sample_rate: 16000,
        output_sample_rate: 24000,
        asr_binary_path: "/bin/true".into(),
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
async fn text_only_turn_follows_s1_ordering() {
    let url = spawn_backend().await;
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (mut tx, mut rx) = ws.split();

    tx.send(Message::Text(serde_json::to_string(&ClientEvent::Start {
        trace_id: None,
        call_sid: None,
        stream_sid: None,
        started_at: None,
        output_sample_rate: None,
    }).unwrap().into())).await.unwrap();

    tx.send(Message::Text(serde_json::to_string(&ClientEvent::Text { text: "hello".into() }).unwrap().into())).await.unwrap();
    tx.send(Message::Text(serde_json::to_string(&ClientEvent::Commit { instructions: None, reason: None }).unwrap().into())).await.unwrap();

    let mut events = Vec::new();
    let deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => panic!("timed out waiting for response_completed"),
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let event: ServerEvent = serde_json::from_str(&text).unwrap();
                        let done = matches!(event, ServerEvent::ResponseCompleted { .. });
                        events.push(event);
                        if done {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => panic!("socket closed before response_completed"),
                    _ => {}
                }
            }
        }
    }

    assert!(matches!(events[0], ServerEvent::Ready { .. }));
    assert!(events.iter().any(|e| matches!(e, ServerEvent::Transcript { text } if text == "hello")));

    let completed_idx = events.iter().position(|e| matches!(e, ServerEvent::TextCompleted { .. })).unwrap();
    let audio_idx = events.iter().position(|e| matches!(e, ServerEvent::AudioDelta { .. }));
    if let Some(audio_idx) = audio_idx {
        assert!(completed_idx < audio_idx, "text_completed must precede the first audio_delta");
    }
    assert!(matches!(events.last().unwrap(), ServerEvent::ResponseCompleted { .. }));

    let _ = tx.close().await;
}

#[tokio::test]
async fn commit_with_no_speech_completes_without_a_transcript() {
    let url = spawn_backend().await;
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (mut tx, mut rx) = ws.split();

    tx.send(Message::Text(serde_json::to_string(&ClientEvent::Start {
        trace_id: None,
        call_sid: None,
        stream_sid: None,
        started_at: None,
        output_sample_rate: None,
    }).unwrap().into())).await.unwrap();
    tx.send(Message::Text(serde_json::to_string(&ClientEvent::Commit { instructions: None, reason: None }).unwrap().into())).await.unwrap();

    let mut saw_ready = false;
    let mut saw_completed = false;
    let mut saw_transcript = false;
    let deadline = tokio::time::sleep(std::time::Duration::from_secs(5));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => panic!("timed out"),
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(&text).unwrap() {
                            ServerEvent::Ready { .. } => saw_ready = true,
                            ServerEvent::Transcript { .. } => saw_transcript = true,
                            ServerEvent::ResponseCompleted { .. } => { saw_completed = true; break; }
                            _ => {}
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }

    assert!(saw_ready);
    assert!(saw_completed);
    assert!(!saw_transcript, "no transcript should be emitted for an empty-audio commit");
    let _ = tx.close().await;
}
