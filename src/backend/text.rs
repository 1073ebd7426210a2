//! Text chunking helpers for component I step 6/7: word-bounded chunks
//! for `text_delta`, sentence-bounded chunks for TTS synthesis. Grounded
//! in the teacher's `split_sentences` helper from the realtime voice
//! session, generalized to the two distinct bounds this spec names.

/// Split text into word-bounded chunks, each at most `max_len` chars,
/// preserving word order and whitespace between words within a chunk.
pub fn split_words(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate_len = if current.is_empty() { word.len() } else { current.len() + 1 + word.len() };
        if candidate_len > max_len && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split text into sentence-bounded chunks (terminal `.?!` followed by
/// whitespace), each at most `max_len` chars. A sentence longer than
/// `max_len` on its own is kept whole rather than dropped.
pub fn split_sentences(text: &str, max_len: usize) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if matches!(c, '.' | '?' | '!') {
            let next_is_boundary = i + 1 >= bytes.len() || (bytes[i + 1] as char).is_whitespace();
            if next_is_boundary {
                sentences.push(text[start..=i].trim().to_string());
                start = i + 1;
            }
        }
        i += 1;
    }
    if start < bytes.len() {
        let tail = text[start..].trim();
        if !tail.is_empty() {
            sentences.push(tail.to_string());
        }
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for sentence in sentences {
        if sentence.is_empty() {
            continue;
        }
        let candidate_len = if current.is_empty() { sentence.len() } else { current.len() + 1 + sentence.len() };
        if candidate_len > max_len && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&sentence);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split PCM16 samples into fixed-size 20ms frames at `sample_rate`.
pub fn frame_pcm_20ms(samples: &[i16], sample_rate: u32) -> Vec<Vec<i16>> {
    let frame_len = (sample_rate as usize) / 50; // 20ms
    samples.chunks(frame_len.max(1)).map(|c| c.to_vec()).collect()
}
