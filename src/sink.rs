//! Transcript sink (§6.4): fire-and-forget HTTP post of completed-turn
//! records. Never writes audio. Failures are swallowed and logged at warn.

use serde::Serialize;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct TranscriptRecord {
    pub call_id: Option<String>,
    pub turn_index: u64,
    pub trace_id: String,
    pub user_text: String,
    pub assistant_text: String,
    pub response_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

pub struct TranscriptSink {
    url: Option<String>,
    client: reqwest::Client,
}

impl TranscriptSink {
    pub fn new(url: Option<String>) -> Self {
        Self { url, client: reqwest::Client::new() }
    }

    /// Fire-and-forget; never blocks the turn pipeline on the sink's outcome.
    pub fn record(&self, record: TranscriptRecord) {
        let Some(url) = self.url.clone() else { return };
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&record).send().await {
                warn!(error = %e, url = %url, "transcript sink request failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_sink_is_a_noop() {
        let sink = TranscriptSink::new(None);
        sink.record(TranscriptRecord {
            call_id: None,
            turn_index: 0,
            trace_id: "t".into(),
            user_text: "hi".into(),
            assistant_text: "hello".into(),
            response_id: "r1".into(),
            instructions: None,
        });
    }
}
