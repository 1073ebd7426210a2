//! VAD and commit detector (component E), run in the bridge on decoded
//! 8 kHz PCM frames of 20 ms (§4.4). A deliberately simpler RMS-gate +
//! silence-timer design than the teacher's Silero-backed VAD, matching
//! what this spec actually needs.

use crate::codec::rms;
use crate::config::VadConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitReason {
    Silence,
    MaxUtterance,
}

#[derive(Debug)]
pub struct Vad {
    threshold: f32,
    commit_silence_ms: u64,
    max_utterance_ms: u64,
    pub barge_in: bool,
    pending_speech: bool,
    silence_ms: u64,
    speech_ms: u64,
}

const FRAME_MS: u64 = 20;

impl Vad {
    pub fn new(config: &VadConfig) -> Self {
        Self {
            threshold: config.vad_threshold,
            commit_silence_ms: config.commit_silence_ms,
            max_utterance_ms: config.max_utterance_ms,
            barge_in: config.barge_in,
            pending_speech: false,
            silence_ms: 0,
            speech_ms: 0,
        }
    }

    pub fn is_pending_speech(&self) -> bool {
        self.pending_speech
    }

    /// RMS gate used by `feed`; exposed so callers (barge-in) can test the
    /// current frame directly instead of the sticky `pending_speech` latch.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Feed one 20ms frame of 8kHz PCM. Returns a commit reason if this
    /// frame should trigger an automatic commit.
    pub fn feed(&mut self, frame: &[i16]) -> Option<CommitReason> {
        let level = rms(frame);
        if level >= self.threshold {
            self.pending_speech = true;
            self.silence_ms = 0;
            self.speech_ms += FRAME_MS;
            if self.max_utterance_ms > 0 && self.speech_ms >= self.max_utterance_ms {
                self.speech_ms = 0;
                self.silence_ms = 0;
                return Some(CommitReason::MaxUtterance);
            }
            None
        } else {
            self.silence_ms += FRAME_MS;
            self.speech_ms = 0;
            if self.pending_speech && self.silence_ms >= self.commit_silence_ms {
                self.pending_speech = false;
                return Some(CommitReason::Silence);
            }
            None
        }
    }

    /// DTMF `#` forces a commit regardless of VAD state (§4.5).
    pub fn force_commit(&mut self) {
        self.pending_speech = false;
        self.silence_ms = 0;
        self.speech_ms = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(threshold: f32, commit_silence_ms: u64, max_utterance_ms: u64) -> VadConfig {
        VadConfig {
            vad_threshold: threshold,
            commit_silence_ms,
            max_utterance_ms,
            barge_in: true,
        }
    }

    fn loud_frame() -> Vec<i16> {
        vec![20000; 160]
    }

    fn silent_frame() -> Vec<i16> {
        vec![0; 160]
    }

    #[test]
    fn no_commit_on_pure_silence() {
        let mut vad = Vad::new(&cfg(0.012, 900, 0));
        for _ in 0..100 {
            assert_eq!(vad.feed(&silent_frame()), None);
        }
    }

    #[test]
    fn commits_after_silence_following_speech() {
        let mut vad = Vad::new(&cfg(0.012, 60, 0));
        assert_eq!(vad.feed(&loud_frame()), None);
        assert!(vad.is_pending_speech());
        assert_eq!(vad.feed(&silent_frame()), None); // 20ms silence
        assert_eq!(vad.feed(&silent_frame()), None); // 40ms silence
        assert_eq!(vad.feed(&silent_frame()), Some(CommitReason::Silence)); // 60ms silence, threshold crossed
    }

    #[test]
    fn commits_exactly_when_silence_threshold_crossed() {
        let mut vad = Vad::new(&cfg(0.012, 40, 0));
        vad.feed(&loud_frame());
        assert_eq!(vad.feed(&silent_frame()), None); // 20ms
        assert_eq!(vad.feed(&silent_frame()), Some(CommitReason::Silence)); // 40ms
    }

    #[test]
    fn forces_max_utterance_commit() {
        let mut vad = Vad::new(&cfg(0.012, 900, 40));
        assert_eq!(vad.feed(&loud_frame()), None); // 20ms speech
        assert_eq!(vad.feed(&loud_frame()), Some(CommitReason::MaxUtterance)); // 40ms speech
    }

    #[test]
    fn force_commit_clears_pending_speech() {
        let mut vad = Vad::new(&cfg(0.012, 900, 0));
        vad.feed(&loud_frame());
        assert!(vad.is_pending_speech());
        vad.force_commit();
        assert!(!vad.is_pending_speech());
    }
}
