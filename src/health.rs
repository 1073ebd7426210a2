//! Health and config assembly (component L): readiness snapshot and the
//! additive in-process metric counters §5/§10.5 mentions without pinning
//! to a component. No external metrics sink; read back only by the
//! readiness snapshot and an optional startup banner.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub active_sessions: AtomicU64,
    pub turns_completed: AtomicU64,
    pub turns_failed: AtomicU64,
    pub queue_overflows: AtomicU64,
    pub subprocess_timeouts: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_started(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_ended(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn turn_completed(&self) {
        self.turns_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn turn_failed(&self) {
        self.turns_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queue_overflow(&self) {
        self.queue_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subprocess_timeout(&self) {
        self.subprocess_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            turns_completed: self.turns_completed.load(Ordering::Relaxed),
            turns_failed: self.turns_failed.load(Ordering::Relaxed),
            queue_overflows: self.queue_overflows.load(Ordering::Relaxed),
            subprocess_timeouts: self.subprocess_timeouts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub active_sessions: u64,
    pub turns_completed: u64,
    pub turns_failed: u64,
    pub queue_overflows: u64,
    pub subprocess_timeouts: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ReadinessSnapshot {
    pub ready: bool,
    pub missing: Vec<String>,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
}

/// §4.9: readiness is the conjunction of ASR/TTS binaries and models existing.
pub fn backend_readiness(config: &crate::config::BackendConfig) -> ReadinessSnapshot {
    let missing = config.check_readiness();
    ReadinessSnapshot {
        ready: missing.is_empty() && config.output_sample_rate_valid(),
        missing,
        input_sample_rate: config.input_sample_rate,
        output_sample_rate: config.output_sample_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_are_additive_across_concurrent_updates() {
        let metrics = Metrics::new();
        metrics.session_started();
        metrics.session_started();
        metrics.turn_completed();
        metrics.queue_overflow();
        let snap = metrics.snapshot();
        assert_eq!(snap.active_sessions, 2);
        assert_eq!(snap.turns_completed, 1);
        assert_eq!(snap.queue_overflows, 1);
    }

    #[test]
    fn session_ended_decrements_active_count() {
        let metrics = Metrics::new();
        metrics.session_started();
        metrics.session_ended();
        assert_eq!(metrics.snapshot().active_sessions, 0);
    }
}
