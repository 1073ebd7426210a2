//! Telephony bridge session (component G, §4.5): terminates one carrier
//! media WebSocket, maintains one downstream WebSocket (to the relay or
//! directly to the backend), and shuttles audio both ways. Grounded in
//! the reference Twilio media-stream handler's `tokio::select!` loop
//! over the carrier socket and a response channel, generalized here to
//! a real downstream WebSocket instead of an in-process channel.

use crate::bridge::carrier::{CarrierEvent, OutboundMedia};
use crate::codec::{base64_decode, base64_encode, mulaw_decode, mulaw_encode, resample};
use crate::config::{BridgeConfig, VadConfig};
use crate::health::Metrics;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::queue::PreReadyQueue;
use crate::vad::{CommitReason, Vad};
use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tracing::{info, warn};

const CARRIER_SAMPLE_RATE: u32 = 8000;
const BACKEND_SAMPLE_RATE: u32 = 16000;
const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 24000;
const OUTBOUND_FRAME_BYTES: usize = 160; // 20ms of 8kHz mu-law

pub struct OutboundPlan {
    pub opener_text: String,
}

pub struct CallSession {
    pub stream_sid: Option<String>,
    pub call_sid: Option<String>,
    pub trace_id: String,
    vad: Vad,
    outbound_plan: Option<OutboundPlan>,
    greeted: bool,
    outbound_mulaw_buffer: Vec<u8>,
    pre_ready_queue: PreReadyQueue,
    downstream_ready: bool,
    output_sample_rate: u32,
    inbound_bytes: u64,
    outbound_bytes: u64,
}

impl CallSession {
    pub fn new(vad_config: &VadConfig, queue_cap: usize, outbound_plan: Option<OutboundPlan>) -> Self {
        Self {
            stream_sid: None,
            call_sid: None,
            trace_id: crate::trace::generate_trace_id(),
            vad: Vad::new(vad_config),
            outbound_plan,
            greeted: false,
            outbound_mulaw_buffer: Vec::new(),
            pre_ready_queue: PreReadyQueue::new(queue_cap),
            output_sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE,
            downstream_ready: false,
            inbound_bytes: 0,
            outbound_bytes: 0,
        }
    }
}

/// Run one call: `carrier_socket` is the inbound media WebSocket accepted
/// from the carrier; `downstream_sink`/`downstream_stream` are the split
/// halves of the already-open downstream WebSocket.
pub async fn run(carrier_socket: WebSocket, config: BridgeConfig, opener_text: Option<String>, metrics: Arc<Metrics>) {
    let (mut carrier_tx, mut carrier_rx) = carrier_socket.split();

    let downstream = match tokio_tungstenite::connect_async(&config.downstream_url).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!(error = %e, url = %config.downstream_url, "bridge failed to reach downstream");
            return;
        }
    };
    let (mut downstream_tx, mut downstream_rx) = downstream.split();

    let mut session = CallSession::new(&config.vad, config.pre_ready_queue_cap, opener_text.map(|t| OutboundPlan { opener_text: t }));
    metrics.session_started();

    let close_reason = loop {
        tokio::select! {
            carrier_msg = carrier_rx.next() => {
                match carrier_msg {
                    Some(Ok(AxumMessage::Text(text))) => {
                        if !handle_carrier_event(&text, &mut session, &mut downstream_tx, &metrics).await {
                            break "carrier_stop_event";
                        }
                    }
                    Some(Ok(AxumMessage::Close(_))) | None => break "carrier_close",
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "carrier socket error");
                        break "carrier_error";
                    }
                }
            }
            downstream_msg = downstream_rx.next() => {
                match downstream_msg {
                    Some(Ok(TungsteniteMessage::Text(text))) => {
                        if !handle_downstream_event(&text, &mut session, &mut downstream_tx, &mut carrier_tx, &metrics).await {
                            break "downstream_end";
                        }
                    }
                    Some(Ok(TungsteniteMessage::Close(_))) | None => break "downstream_close",
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "downstream socket error");
                        break "downstream_error";
                    }
                }
            }
        }
    };

    let _ = downstream_tx.close().await;
    let _ = carrier_tx.close().await;
    metrics.session_ended();
    info!(
        trace_id = %session.trace_id,
        stream_sid = ?session.stream_sid,
        stage = "teardown",
        reason = close_reason,
        inbound_bytes = session.inbound_bytes,
        outbound_bytes = session.outbound_bytes,
        "bridge session torn down"
    );
}

type DownstreamSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    TungsteniteMessage,
>;
type CarrierSink = futures_util::stream::SplitSink<WebSocket, AxumMessage>;

async fn send_downstream(tx: &mut DownstreamSink, session: &mut CallSession, event: ClientEvent, metrics: &Metrics) {
    let Ok(text) = serde_json::to_string(&event) else { return };
    if session.downstream_ready {
        let _ = tx.send(TungsteniteMessage::Text(text.into())).await;
    } else if session.pre_ready_queue.push(text) {
        metrics.queue_overflow();
        warn!(trace_id = %session.trace_id, "bridge pre-ready queue overflow");
    }
}

async fn handle_carrier_event(
    raw: &str,
    session: &mut CallSession,
    downstream_tx: &mut DownstreamSink,
    metrics: &Metrics,
) -> bool {
    let event: CarrierEvent = match serde_json::from_str(raw) {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, "malformed carrier event");
            return true;
        }
    };

    match event {
        CarrierEvent::Connected { .. } => {}
        CarrierEvent::Start { stream_sid, start } => {
            session.stream_sid = Some(stream_sid.clone());
            session.call_sid = start.call_sid.clone();
            if let Some(call_sid) = &start.call_sid {
                session.trace_id = call_sid.clone();
            }
            send_downstream(
                downstream_tx,
                session,
                ClientEvent::Start {
                    trace_id: Some(session.trace_id.clone()),
                    call_sid: session.call_sid.clone(),
                    stream_sid: session.stream_sid.clone(),
                    started_at: None,
                    output_sample_rate: None,
                },
                metrics,
            )
            .await;
        }
        CarrierEvent::Media { media, .. } => {
            let mulaw = match base64_decode(&media.payload) {
                Ok(b) => b,
                Err(e) => {
                    warn!(error = %e, "invalid media payload");
                    return true;
                }
            };
            session.inbound_bytes += mulaw.len() as u64;
            let pcm_8k = mulaw_decode(&mulaw);

            if let Some(reason) = session.vad.feed(&pcm_8k) {
                let reason_str = match reason {
                    CommitReason::Silence => "silence",
                    CommitReason::MaxUtterance => "max_utterance",
                };
                send_downstream(
                    downstream_tx,
                    session,
                    ClientEvent::Commit { instructions: None, reason: Some(reason_str.into()) },
                    metrics,
                )
                .await;
            }

            if session.vad.barge_in
                && crate::codec::rms(&pcm_8k) >= session.vad.threshold()
                && !session.outbound_mulaw_buffer.is_empty()
            {
                session.outbound_mulaw_buffer.clear();
                send_downstream(downstream_tx, session, ClientEvent::End {}, metrics).await;
            }

            let pcm_16k = resample(&pcm_8k, CARRIER_SAMPLE_RATE, BACKEND_SAMPLE_RATE);
            let audio = base64_encode(&crate::codec::pcm16_to_bytes(&pcm_16k));
            send_downstream(downstream_tx, session, ClientEvent::AudioChunk { audio }, metrics).await;
        }
        CarrierEvent::Dtmf { dtmf, .. } => {
            if dtmf.digit == "#" {
                session.vad.force_commit();
                send_downstream(
                    downstream_tx,
                    session,
                    ClientEvent::Commit { instructions: None, reason: Some("dtmf".into()) },
                    metrics,
                )
                .await;
            } else if dtmf.digit == "*" {
                send_downstream(downstream_tx, session, ClientEvent::End {}, metrics).await;
            }
        }
        CarrierEvent::Mark { .. } => {}
        CarrierEvent::Stop { .. } => return false,
    }
    true
}

async fn handle_downstream_event(
    raw: &str,
    session: &mut CallSession,
    downstream_tx: &mut DownstreamSink,
    carrier_tx: &mut CarrierSink,
    metrics: &Metrics,
) -> bool {
    let event: ServerEvent = match serde_json::from_str(raw) {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, "malformed downstream event");
            return true;
        }
    };

    match event {
        ServerEvent::Ready { output_sample_rate, .. } => {
            session.downstream_ready = true;
            session.output_sample_rate = output_sample_rate;
            for queued in session.pre_ready_queue.drain() {
                let _ = downstream_tx.send(TungsteniteMessage::Text(queued.into())).await;
            }
            if let Some(plan) = session.outbound_plan.take() {
                if !session.greeted {
                    session.greeted = true;
                    send_downstream(
                        downstream_tx,
                        session,
                        ClientEvent::Commit { instructions: Some(plan.opener_text), reason: Some("opener".into()) },
                        metrics,
                    )
                    .await;
                }
            }
        }
        ServerEvent::Transcript { .. } | ServerEvent::TextDelta { .. } | ServerEvent::TextCompleted { .. } => {}
        ServerEvent::AudioDelta { audio } => {
            let Ok(bytes) = base64_decode(&audio) else { return true };
            let pcm = crate::codec::bytes_to_pcm16(&bytes);
            let pcm_8k = resample(&pcm, session.output_sample_rate, CARRIER_SAMPLE_RATE);
            let mulaw = mulaw_encode(&pcm_8k);
            session.outbound_mulaw_buffer.extend(mulaw);

            while session.outbound_mulaw_buffer.len() >= OUTBOUND_FRAME_BYTES {
                let frame: Vec<u8> = session.outbound_mulaw_buffer.drain(..OUTBOUND_FRAME_BYTES).collect();
                if let Some(stream_sid) = &session.stream_sid {
                    session.outbound_bytes += frame.len() as u64;
                    let outbound = OutboundMedia::new(stream_sid.clone(), base64_encode(&frame));
                    if let Ok(text) = serde_json::to_string(&outbound) {
                        let _ = carrier_tx.send(AxumMessage::Text(text.into())).await;
                    }
                }
            }
        }
        ServerEvent::ResponseCompleted { .. } => {
            session.outbound_mulaw_buffer.clear();
        }
        ServerEvent::Error { error } => {
            warn!(trace_id = %session.trace_id, error = %error, "downstream reported error");
        }
    }
    true
}
