//! Conversation core interface (component J): the stateless
//! request->response abstraction consumed by the backend's turn pipeline.
//! Real deployments swap the reference implementation out; the turn
//! pipeline only ever talks to the trait.

use async_trait::async_trait;

#[async_trait]
pub trait ConversationCore: Send + Sync {
    async fn respond(&self, user_text: &str, instructions: Option<&str>) -> anyhow::Result<String>;
}

/// Deterministic reference implementation so end-to-end tests and the
/// golden replay harness (component K) are stable across runs (§4.8, §8 S6).
pub struct ReferenceConversation {
    turn_index: std::sync::atomic::AtomicU64,
}

impl ReferenceConversation {
    pub fn new() -> Self {
        Self { turn_index: std::sync::atomic::AtomicU64::new(0) }
    }
}

impl Default for ReferenceConversation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationCore for ReferenceConversation {
    async fn respond(&self, user_text: &str, instructions: Option<&str>) -> anyhow::Result<String> {
        let index = self.turn_index.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(instructions) = instructions {
            return Ok(instructions.to_string());
        }
        Ok(format!("Turn {index}: you said \"{user_text}\"."))
    }
}
