//! Voice backend session (component I): owns the per-connection turn
//! state machine described in §4.7. One `BackendSession` exists per
//! upstream WebSocket accepted by the backend server.

use crate::backend::asr::AsrEngine;
use crate::backend::text::{frame_pcm_20ms, split_sentences, split_words};
use crate::backend::tts::TtsEngine;
use crate::buffer::SessionBuffer;
use crate::codec::{base64_decode, base64_encode, bytes_to_pcm16, pcm16_to_bytes};
use crate::config::BackendConfig;
use crate::conversation::ConversationCore;
use crate::health::Metrics;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::sink::{TranscriptRecord, TranscriptSink};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

const TEXT_DELTA_MAX_LEN: usize = 80;
const TTS_CHUNK_MAX_LEN: usize = 180;

pub struct BackendSession {
    pub session_id: String,
    pub trace_id: String,
    pub call_id: Option<String>,
    pub stream_id: Option<String>,
    buffer: SessionBuffer,
    turn_index: u64,
    in_flight: bool,
    input_sample_rate: u32,
    output_sample_rate: u32,
    /// §7 `config` kind: set once at construction from the readiness check;
    /// a not-ready session stays open but refuses every turn.
    config_ready: bool,
    started_at: Instant,
    conversation: Arc<dyn ConversationCore>,
    asr: Arc<AsrEngine>,
    tts: Arc<TtsEngine>,
    metrics: Arc<Metrics>,
    sink: Arc<TranscriptSink>,
}

impl BackendSession {
    pub fn new(
        config: &BackendConfig,
        conversation: Arc<dyn ConversationCore>,
        asr: Arc<AsrEngine>,
        tts: Arc<TtsEngine>,
        metrics: Arc<Metrics>,
        sink: Arc<TranscriptSink>,
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            trace_id: crate::trace::generate_trace_id(),
            call_id: None,
            stream_id: None,
            buffer: SessionBuffer::new(),
            turn_index: 0,
            in_flight: false,
            input_sample_rate: config.input_sample_rate,
            output_sample_rate: config.output_sample_rate,
            config_ready: config.check_readiness().is_empty() && config.output_sample_rate_valid(),
            started_at: Instant::now(),
            conversation,
            asr,
            tts,
            metrics,
            sink,
        }
    }

    fn stage(&self, stage: &str) {
        info!(session_id = %self.session_id, trace_id = %self.trace_id, stage, ms = self.started_at.elapsed().as_millis() as u64, "turn stage");
    }

    /// Dispatch one inbound client event, emitting zero or more server
    /// events onto `out` in order. Turn work that involves subprocess
    /// I/O is awaited here; the caller's message loop is the one
    /// serialization point for this session (§5).
    pub async fn handle(&mut self, event: ClientEvent, out: &UnboundedSender<ServerEvent>) {
        match event {
            ClientEvent::Start { trace_id, call_sid, stream_sid, output_sample_rate, .. } => {
                if let Some(t) = trace_id {
                    self.trace_id = t;
                }
                self.call_id = call_sid;
                self.stream_id = stream_sid;
                if let Some(rate) = output_sample_rate {
                    if matches!(rate, 8000 | 16000 | 24000) {
                        self.output_sample_rate = rate;
                    }
                }
                let _ = out.send(ServerEvent::Ready {
                    input_sample_rate: self.input_sample_rate,
                    output_sample_rate: self.output_sample_rate,
                });
            }
            ClientEvent::AudioChunk { audio } => match base64_decode(&audio) {
                Ok(bytes) => {
                    if self.buffer.append(bytes_to_pcm16(&bytes)) {
                        self.metrics.queue_overflow();
                        warn!(session_id = %self.session_id, trace_id = %self.trace_id, "inbound pcm buffer overflow: turn dropped");
                        let _ = out.send(ServerEvent::error("overflow: inbound audio buffer exceeded cap, turn dropped"));
                    }
                }
                Err(e) => {
                    let _ = out.send(ServerEvent::error(format!("invalid audio_chunk payload: {e}")));
                }
            },
            ClientEvent::Commit { instructions, .. } => {
                if self.in_flight {
                    info!(session_id = %self.session_id, "commit ignored: turn already in flight");
                    return;
                }
                if !self.config_ready {
                    let _ = out.send(ServerEvent::error("config: asr/tts readiness check failed at startup"));
                    return;
                }
                let pcm = self.buffer.take_all();
                self.run_turn(TurnInput::Audio(pcm), instructions, out).await;
            }
            ClientEvent::Text { text } => {
                if self.in_flight {
                    info!(session_id = %self.session_id, "text ignored: turn already in flight");
                    return;
                }
                if !self.config_ready {
                    let _ = out.send(ServerEvent::error("config: asr/tts readiness check failed at startup"));
                    return;
                }
                self.run_turn(TurnInput::Text(text), None, out).await;
            }
            ClientEvent::End {} => {}
        }
    }

    async fn run_turn(&mut self, input: TurnInput, instructions: Option<String>, out: &UnboundedSender<ServerEvent>) {
        self.in_flight = true;
        let response_id = uuid::Uuid::new_v4().to_string();

        let user_text = match input {
            TurnInput::Text(text) => text,
            TurnInput::Audio(pcm) => {
                if pcm.is_empty() {
                    let _ = out.send(ServerEvent::ResponseCompleted { response_id });
                    info!(session_id = %self.session_id, "empty_transcript: no audio buffered at commit");
                    self.in_flight = false;
                    return;
                }
                self.stage("asr_start");
                let text = match self.asr.transcribe(&pcm).await {
                    Ok(text) => text,
                    Err(e) => {
                        self.metrics.turn_failed();
                        if e.to_string().contains("timed out") {
                            self.metrics.subprocess_timeout();
                        }
                        let _ = out.send(ServerEvent::error(format!("asr failed: {e}")));
                        self.in_flight = false;
                        return;
                    }
                };
                self.stage("asr_done");
                text
            }
        };

        if user_text.trim().is_empty() {
            let _ = out.send(ServerEvent::ResponseCompleted { response_id });
            info!(session_id = %self.session_id, "empty_transcript");
            self.in_flight = false;
            return;
        }

        let _ = out.send(ServerEvent::Transcript { text: user_text.clone() });

        self.stage("llm_start");
        let assistant_text = match self.conversation.respond(&user_text, instructions.as_deref()).await {
            Ok(text) => text,
            Err(e) => {
                self.metrics.turn_failed();
                let _ = out.send(ServerEvent::error(format!("conversation core failed: {e}")));
                self.in_flight = false;
                return;
            }
        };
        self.stage("llm_done");

        for chunk in split_words(&assistant_text, TEXT_DELTA_MAX_LEN) {
            let _ = out.send(ServerEvent::TextDelta { text: chunk });
        }
        let _ = out.send(ServerEvent::TextCompleted { text: assistant_text.clone() });

        self.stage("tts_start");
        let mut first_audio_logged = false;
        for chunk in split_sentences(&assistant_text, TTS_CHUNK_MAX_LEN) {
            match self.tts.synthesize(&chunk, self.output_sample_rate).await {
                Ok(pcm) => {
                    for frame in frame_pcm_20ms(&pcm, self.output_sample_rate) {
                        if !first_audio_logged {
                            self.stage("tts_first_audio");
                            first_audio_logged = true;
                        }
                        let audio = base64_encode(&pcm16_to_bytes(&frame));
                        let _ = out.send(ServerEvent::AudioDelta { audio });
                    }
                }
                Err(e) => {
                    // No retry for TTS (§7): stop synthesizing remaining chunks
                    // for this turn. text_completed has already been emitted,
                    // so the turn boundary stays unambiguous.
                    if e.to_string().contains("timed out") {
                        self.metrics.subprocess_timeout();
                    }
                    warn!(session_id = %self.session_id, error = %e, "tts synthesis failed for chunk");
                    let _ = out.send(ServerEvent::error(format!("tts failed: {e}")));
                    break;
                }
            }
        }
        self.stage("tts_done");

        let _ = out.send(ServerEvent::ResponseCompleted { response_id: response_id.clone() });
        self.stage("response_completed");

        self.sink.record(TranscriptRecord {
            call_id: self.call_id.clone(),
            turn_index: self.turn_index,
            trace_id: self.trace_id.clone(),
            user_text,
            assistant_text,
            response_id,
            instructions,
        });

        self.turn_index += 1;
        self.metrics.turn_completed();
        self.in_flight = false;
    }
}

enum TurnInput {
    Text(String),
    Audio(Vec<i16>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ReferenceConversation;
    use tokio::sync::mpsc::unbounded_channel;

    /// A non-empty, always-present file stands in for the asr/tts model and
    /// config paths so `config_ready` is true in tests that don't exercise
    /// the §4.9 readiness gate itself (see `config.rs` for that).
    fn existing_nonempty_file() -> String {
        concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml").to_string()
    }

    fn test_config() -> BackendConfig {
        BackendConfig {
            listen_addr: "0.0.0.0:8082".parse().unwrap(),
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            asr_binary_path: "/bin/false".into(),
            asr_model_path: existing_nonempty_file(),
            tts_binary_path: "/bin/false".into(),
            tts_model_path: existing_nonempty_file(),
            tts_config_path: existing_nonempty_file(),
            resampler_binary_path: None,
            transcript_sink_url: None,
        }
    }

    fn test_session() -> BackendSession {
        let config = test_config();
        BackendSession::new(
            &config,
            Arc::new(ReferenceConversation::new()),
            Arc::new(AsrEngine::new(&config.asr_binary_path, &config.asr_model_path)),
            Arc::new(TtsEngine::new(&config.tts_binary_path, &config.tts_model_path, &config.tts_config_path)),
            Arc::new(Metrics::new()),
            Arc::new(TranscriptSink::new(None)),
        )
    }

    #[tokio::test]
    async fn text_turn_emits_expected_event_order() {
        let mut session = test_session();
        let (tx, mut rx) = unbounded_channel();

        session.handle(ClientEvent::Start { trace_id: None, call_sid: None, stream_sid: None, started_at: None, output_sample_rate: None }, &tx).await;
        session.handle(ClientEvent::Text { text: "hello".into() }, &tx).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        assert!(matches!(events[0], ServerEvent::Ready { .. }));
        assert!(matches!(events[1], ServerEvent::Transcript { .. }));
        let completed_idx = events.iter().position(|e| matches!(e, ServerEvent::TextCompleted { .. })).unwrap();
        let response_idx = events.iter().position(|e| matches!(e, ServerEvent::ResponseCompleted { .. })).unwrap();
        assert!(completed_idx < response_idx);
        assert!(matches!(events.last().unwrap(), ServerEvent::ResponseCompleted { .. }));
    }

    #[tokio::test]
    async fn not_ready_session_emits_config_error_on_commit() {
        let mut config = test_config();
        config.asr_model_path = "/nonexistent/asr.model".into();
        let session_obj = BackendSession::new(
            &config,
            Arc::new(ReferenceConversation::new()),
            Arc::new(AsrEngine::new(&config.asr_binary_path, &config.asr_model_path)),
            Arc::new(TtsEngine::new(&config.tts_binary_path, &config.tts_model_path, &config.tts_config_path)),
            Arc::new(Metrics::new()),
            Arc::new(TranscriptSink::new(None)),
        );
        assert!(!session_obj.config_ready);

        let mut session = session_obj;
        let (tx, mut rx) = unbounded_channel();
        session.handle(ClientEvent::Commit { instructions: None, reason: None }, &tx).await;
        match rx.try_recv().unwrap() {
            ServerEvent::Error { error } => assert!(error.contains("config")),
            other => panic!("expected config error, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn second_commit_is_ignored_while_turn_in_flight() {
        let mut session = test_session();
        let (tx, _rx) = unbounded_channel();
        session.in_flight = true;
        session.handle(ClientEvent::Text { text: "ignored".into() }, &tx).await;
        assert!(session.in_flight); // unchanged, run_turn never entered
    }

    #[tokio::test]
    async fn commit_with_no_buffered_audio_completes_without_transcript() {
        let mut session = test_session();
        let (tx, mut rx) = unbounded_channel();
        session.handle(ClientEvent::Commit { instructions: None, reason: None }, &tx).await;
        let event = rx.try_recv().unwrap();
        assert!(matches!(event, ServerEvent::ResponseCompleted { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn start_negotiates_supported_output_rate() {
        let mut session = test_session();
        let (tx, mut rx) = unbounded_channel();
        session.handle(
            ClientEvent::Start { trace_id: None, call_sid: None, stream_sid: None, started_at: None, output_sample_rate: Some(8000) },
            &tx,
        ).await;
        match rx.try_recv().unwrap() {
            ServerEvent::Ready { output_sample_rate, .. } => assert_eq!(output_sample_rate, 8000),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn start_ignores_unsupported_output_rate() {
        let mut session = test_session();
        let (tx, mut rx) = unbounded_channel();
        session.handle(
            ClientEvent::Start { trace_id: None, call_sid: None, stream_sid: None, started_at: None, output_sample_rate: Some(44100) },
            &tx,
        ).await;
        match rx.try_recv().unwrap() {
            ServerEvent::Ready { output_sample_rate, .. } => assert_eq!(output_sample_rate, 24000),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
