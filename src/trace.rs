//! Trace and redaction log (component B).
//!
//! Produces one JSON line per log event: `t`, `level`, `msg`, `component`,
//! optional `traceId`/`stage`/`ms`. Values under redaction-sensitive keys
//! (or that look like long base64 blobs) are masked before the line is
//! written, so a call site can never bypass redaction by forgetting to
//! scrub a field itself.

use std::io::Write as _;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

const REDACTED_KEYS: &[&str] = &["audio", "payload", "pcm", "pcm16", "mulaw"];

fn looks_like_base64_blob(s: &str) -> bool {
    s.len() >= 256
        && !s.contains(char::is_whitespace)
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
}

fn mask_tokens(s: &str) -> String {
    static TOKEN_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = TOKEN_RE
        .get_or_init(|| regex::Regex::new(r"(?i)(bearer\s+|token=|api_key=)([A-Za-z0-9._\-]+)").unwrap());
    re.replace_all(s, "${1}[REDACTED_TOKEN]").into_owned()
}

fn redact_value(key: &str, value: &str) -> String {
    if REDACTED_KEYS.contains(&key) {
        return "[REDACTED_AUDIO]".to_string();
    }
    if looks_like_base64_blob(value) {
        return "[REDACTED_BASE64]".to_string();
    }
    mask_tokens(value)
}

/// Generate a new random trace id (128-bit hex) when the carrier supplies
/// no stable call identifier to seed from.
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

struct JsonVisitor {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl Visit for JsonVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        let redacted = redact_value(field.name(), value);
        self.fields.insert(field.name().to_string(), serde_json::Value::String(redacted));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        let redacted = redact_value(field.name(), &rendered);
        self.fields.insert(field.name().to_string(), serde_json::Value::String(redacted));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), serde_json::json!(value));
    }
}

/// A `tracing_subscriber::Layer` emitting the component-B line shape with
/// redaction applied to every string-valued field, so plain `info!`/`warn!`
/// call sites elsewhere never need to redact manually.
pub struct RedactingJsonLayer;

impl<S> Layer<S> for RedactingJsonLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = JsonVisitor { fields: serde_json::Map::new() };
        event.record(&mut visitor);

        let msg = visitor
            .fields
            .remove("message")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        let mut line = serde_json::Map::new();
        line.insert("t".into(), serde_json::json!(chrono::Utc::now().to_rfc3339()));
        line.insert("level".into(), serde_json::json!(event.metadata().level().to_string()));
        line.insert("msg".into(), serde_json::json!(msg));
        line.insert("component".into(), serde_json::json!(event.metadata().target()));
        for (k, v) in visitor.fields {
            line.insert(k, v);
        }

        let mut stdout = std::io::stdout().lock();
        if let Ok(serialized) = serde_json::to_string(&serde_json::Value::Object(line)) {
            let _ = writeln!(stdout, "{serialized}");
        }
    }
}

/// Install the redacting JSON subscriber, filtered by `RUST_LOG` (default `warn`).
pub fn init_logging() {
    use tracing_subscriber::prelude::*;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(RedactingJsonLayer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_audio_keyed_field_regardless_of_value() {
        assert_eq!(redact_value("audio", "short"), "[REDACTED_AUDIO]");
        assert_eq!(redact_value("pcm16", "anything"), "[REDACTED_AUDIO]");
    }

    #[test]
    fn redacts_long_base64_looking_values() {
        let blob = "A".repeat(300);
        assert_eq!(redact_value("notes", &blob), "[REDACTED_BASE64]");
    }

    #[test]
    fn does_not_redact_short_ordinary_strings() {
        assert_eq!(redact_value("msg", "turn started"), "turn started");
    }

    #[test]
    fn masks_bearer_tokens() {
        let masked = mask_tokens("Authorization: Bearer sk-abc123.def456");
        assert!(masked.contains("[REDACTED_TOKEN]"));
        assert!(!masked.contains("sk-abc123"));
    }

    #[test]
    fn trace_id_is_nonempty_hex() {
        let id = generate_trace_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
