//! Protocol codec (component C): the JSON-over-WebSocket event variants
//! exchanged between carrier-facing and backend-facing hops (§6.1).
//!
//! Grounded in the tagged-enum client/server message style used by the
//! Twilio-style media handler and the realtime voice session: a single
//! `type` discriminant per direction, decoded with serde and validated
//! before being acted on.

use crate::error::VoxpipeError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Start {
        #[serde(rename = "traceId", skip_serializing_if = "Option::is_none")]
        trace_id: Option<String>,
        #[serde(rename = "callSid", skip_serializing_if = "Option::is_none")]
        call_sid: Option<String>,
        #[serde(rename = "streamSid", skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        #[serde(rename = "startedAt", skip_serializing_if = "Option::is_none")]
        started_at: Option<f64>,
        #[serde(rename = "outputSampleRate", skip_serializing_if = "Option::is_none")]
        output_sample_rate: Option<u32>,
    },
    AudioChunk {
        audio: String,
    },
    Commit {
        #[serde(skip_serializing_if = "Option::is_none")]
        instructions: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Text {
        text: String,
    },
    End {},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Ready {
        #[serde(rename = "inputSampleRate")]
        input_sample_rate: u32,
        #[serde(rename = "outputSampleRate")]
        output_sample_rate: u32,
    },
    Transcript {
        text: String,
    },
    TextDelta {
        text: String,
    },
    TextCompleted {
        text: String,
    },
    AudioDelta {
        audio: String,
    },
    ResponseCompleted {
        #[serde(rename = "responseId")]
        response_id: String,
    },
    Error {
        error: String,
    },
}

impl ClientEvent {
    /// Validates required-field non-emptiness beyond what serde already enforces.
    pub fn validate(&self) -> Result<(), VoxpipeError> {
        match self {
            ClientEvent::AudioChunk { audio } if audio.is_empty() => {
                Err(VoxpipeError::Protocol("audio_chunk.audio must be non-empty".into()))
            }
            ClientEvent::Text { text } if text.trim().is_empty() => {
                Err(VoxpipeError::Protocol("text.text must be non-empty".into()))
            }
            _ => Ok(()),
        }
    }

    pub fn decode(raw: &str) -> Result<Self, VoxpipeError> {
        let event: ClientEvent = serde_json::from_str(raw).map_err(VoxpipeError::from)?;
        event.validate()?;
        Ok(event)
    }
}

impl ServerEvent {
    pub fn encode(&self) -> Result<String, VoxpipeError> {
        Ok(serde_json::to_string(self).map_err(VoxpipeError::from)?)
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error { error: message.into() }
    }
}
