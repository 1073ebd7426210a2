//! Golden replay harness (component K, §4.10): streams a WAV file to a
//! relay or backend over the wire protocol and assembles a deterministic
//! JSON run report. An offline testing aid, not part of the live pipeline.

use crate::codec::{base64_encode, pcm16_to_bytes};
use crate::protocol::{ClientEvent, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

const FRAME_SAMPLES: usize = 320; // 20ms @ 16kHz

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub trace_id: Option<String>,
    pub events: Vec<String>,
    pub ms: u128,
    pub saw_ready: bool,
    pub saw_completed: bool,
    pub assistant_text: String,
    pub audio_delta_chunks: usize,
}

pub async fn run_replay(
    target_url: &str,
    wav_path: &str,
    send_commit: bool,
    timeout: Duration,
) -> anyhow::Result<RunReport> {
    let mut reader = hound::WavReader::open(wav_path)?;
    let spec = reader.spec();
    anyhow::ensure!(spec.channels == 1, "replay wav must be mono");
    anyhow::ensure!(spec.sample_rate == 16000, "replay wav must be 16kHz");
    let samples: Vec<i16> = reader.samples::<i16>().collect::<Result<_, _>>()?;

    let (ws, _) = tokio_tungstenite::connect_async(target_url).await?;
    let (mut tx, mut rx) = ws.split();

    let started = Instant::now();
    let trace_id = crate::trace::generate_trace_id();
    let start_event = ClientEvent::Start {
        trace_id: Some(trace_id.clone()),
        call_sid: None,
        stream_sid: None,
        started_at: None,
        output_sample_rate: None,
    };
    tx.send(TungsteniteMessage::Text(serde_json::to_string(&start_event)?.into())).await?;

    for frame in samples.chunks(FRAME_SAMPLES) {
        let audio = base64_encode(&pcm16_to_bytes(frame));
        let event = ClientEvent::AudioChunk { audio };
        tx.send(TungsteniteMessage::Text(serde_json::to_string(&event)?.into())).await?;
    }

    if send_commit {
        let event = ClientEvent::Commit { instructions: None, reason: None };
        tx.send(TungsteniteMessage::Text(serde_json::to_string(&event)?.into())).await?;
    }

    let mut report = RunReport {
        trace_id: Some(trace_id),
        events: Vec::new(),
        ms: 0,
        saw_ready: false,
        saw_completed: false,
        assistant_text: String::new(),
        audio_delta_chunks: 0,
    };

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                anyhow::bail!("timed out after {}s waiting for response_completed", timeout.as_secs());
            }
            msg = rx.next() => {
                match msg {
                    Some(Ok(TungsteniteMessage::Text(text))) => {
                        let event: ServerEvent = serde_json::from_str(&text)?;
                        record_event(&mut report, &event);
                        if matches!(event, ServerEvent::ResponseCompleted { .. }) {
                            break;
                        }
                    }
                    Some(Ok(TungsteniteMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => anyhow::bail!("replay socket error: {e}"),
                }
            }
        }
    }

    report.ms = started.elapsed().as_millis();
    let _ = tx.close().await;
    Ok(report)
}

fn record_event(report: &mut RunReport, event: &ServerEvent) {
    match event {
        ServerEvent::Ready { .. } => {
            report.saw_ready = true;
            report.events.push("ready".into());
        }
        ServerEvent::Transcript { .. } => report.events.push("transcript".into()),
        ServerEvent::TextDelta { .. } => report.events.push("text_delta".into()),
        ServerEvent::TextCompleted { text } => {
            report.assistant_text = text.clone();
            report.events.push("text_completed".into());
        }
        ServerEvent::AudioDelta { .. } => {
            report.audio_delta_chunks += 1;
            report.events.push("audio_delta".into());
        }
        ServerEvent::ResponseCompleted { .. } => {
            report.saw_completed = true;
            report.events.push("response_completed".into());
        }
        ServerEvent::Error { .. } => report.events.push("error".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_event_tracks_ready_and_completed_flags() {
        let mut report = RunReport {
            trace_id: None,
            events: Vec::new(),
            ms: 0,
            saw_ready: false,
            saw_completed: false,
            assistant_text: String::new(),
            audio_delta_chunks: 0,
        };
        record_event(&mut report, &ServerEvent::Ready { input_sample_rate: 16000, output_sample_rate: 24000 });
        record_event(&mut report, &ServerEvent::AudioDelta { audio: "AAAA".into() });
        record_event(&mut report, &ServerEvent::AudioDelta { audio: "AAAA".into() });
        record_event(&mut report, &ServerEvent::ResponseCompleted { response_id: "r1".into() });

        assert!(report.saw_ready);
        assert!(report.saw_completed);
        assert_eq!(report.audio_delta_chunks, 2);
        assert_eq!(report.events, vec!["ready", "audio_delta", "audio_delta", "response_completed"]);
    }

    #[test]
    fn record_event_captures_final_assistant_text() {
        let mut report = RunReport {
            trace_id: None,
            events: Vec::new(),
            ms: 0,
            saw_ready: false,
            saw_completed: false,
            assistant_text: String::new(),
            audio_delta_chunks: 0,
        };
        record_event(&mut report, &ServerEvent::TextCompleted { text: "hello there".into() });
        assert_eq!(report.assistant_text, "hello there");
    }
}
