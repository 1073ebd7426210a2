//! Session buffer (component D): per-call accumulator for inbound PCM.

/// §9 "Unbounded buffers": 120s of 16kHz mono audio, matching the ASR
/// subprocess timeout so a turn can never hold more audio than a single
/// ASR invocation could plausibly consume.
pub const MAX_BUFFERED_SAMPLES: usize = 16_000 * 120;

#[derive(Debug)]
pub struct SessionBuffer {
    segments: Vec<Vec<i16>>,
    total_samples: usize,
    chunk_count: usize,
    cap_samples: usize,
}

impl Default for SessionBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuffer {
    pub fn new() -> Self {
        Self { segments: Vec::new(), total_samples: 0, chunk_count: 0, cap_samples: MAX_BUFFERED_SAMPLES }
    }

    #[cfg(test)]
    pub fn with_cap(cap_samples: usize) -> Self {
        Self { segments: Vec::new(), total_samples: 0, chunk_count: 0, cap_samples }
    }

    /// Append one chunk. Returns `true` if this append pushed the buffer past
    /// its cap, in which case the whole in-progress turn is dropped (buffer
    /// reset to empty) rather than letting it grow unbounded (§9).
    pub fn append(&mut self, samples: Vec<i16>) -> bool {
        self.total_samples += samples.len();
        self.chunk_count += 1;
        self.segments.push(samples);
        if self.total_samples > self.cap_samples {
            self.segments.clear();
            self.total_samples = 0;
            self.chunk_count = 0;
            true
        } else {
            false
        }
    }

    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn is_empty(&self) -> bool {
        self.total_samples == 0
    }

    /// Atomically take all buffered samples and reset to empty (§4.7 step 1).
    pub fn take_all(&mut self) -> Vec<i16> {
        let total = self.total_samples;
        let mut out = Vec::with_capacity(total);
        for segment in self.segments.drain(..) {
            out.extend(segment);
        }
        self.total_samples = 0;
        self.chunk_count = 0;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let buf = SessionBuffer::new();
        assert!(buf.is_empty());
        assert_eq!(buf.total_samples(), 0);
    }

    #[test]
    fn accumulates_across_appends_in_order() {
        let mut buf = SessionBuffer::new();
        buf.append(vec![1, 2, 3]);
        buf.append(vec![4, 5]);
        assert_eq!(buf.total_samples(), 5);
        assert_eq!(buf.chunk_count(), 2);
        assert_eq!(buf.take_all(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn resets_after_take_all() {
        let mut buf = SessionBuffer::new();
        buf.append(vec![1, 2]);
        buf.take_all();
        assert!(buf.is_empty());
        assert_eq!(buf.chunk_count(), 0);
    }

    #[test]
    fn overflow_drops_whole_turn_and_reports_true() {
        let mut buf = SessionBuffer::with_cap(5);
        assert!(!buf.append(vec![1, 2, 3]));
        assert!(buf.append(vec![4, 5, 6]));
        assert!(buf.is_empty());
        assert_eq!(buf.total_samples(), 0);
        assert_eq!(buf.chunk_count(), 0);
    }
}
