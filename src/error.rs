//! Typed error kinds for the boundary where a failure becomes a protocol
//! `error` event or a readiness verdict. Everything upstream of that
//! boundary still moves through `anyhow::Result` the way the rest of this
//! codebase does.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoxpipeError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("downstream connection error: {0}")]
    Downstream(String),

    #[error("subprocess error: {0}")]
    Subprocess(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("queue overflow: {0}")]
    Overflow(String),
}

impl VoxpipeError {
    /// The `error` field of a server->client `error` event (§6.1).
    pub fn as_event_message(&self) -> String {
        self.to_string()
    }
}

impl From<serde_json::Error> for VoxpipeError {
    fn from(e: serde_json::Error) -> Self {
        VoxpipeError::Protocol(e.to_string())
    }
}

impl From<std::io::Error> for VoxpipeError {
    fn from(e: std::io::Error) -> Self {
        VoxpipeError::Resource(e.to_string())
    }
}
