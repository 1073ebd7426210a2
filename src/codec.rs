//! Audio codec and resampler (component A): mu-law <-> PCM16 companding,
//! linear resampling between integer sample rates, RMS, and base64 framing.
//! Pure functions, no streaming state.

const MULAW_BIAS: i32 = 0x84;
const MULAW_CLIP: i32 = 32635;

/// Encode a single linear PCM16 sample to G.711 mu-law.
pub fn linear_to_mulaw(sample: i16) -> u8 {
    let mut sign = 0x80;
    let mut sample = sample as i32;
    if sample < 0 {
        sample = -sample;
        sign = 0x00;
    }
    if sample > MULAW_CLIP {
        sample = MULAW_CLIP;
    }
    sample += MULAW_BIAS;

    let exponent = (0..8)
        .rev()
        .find(|&e| sample >= (0x84 << e))
        .unwrap_or(0);
    let mantissa = (sample >> (exponent + 3)) & 0x0f;
    let byte = !(sign | (exponent << 4) as i32 | mantissa);
    byte as u8
}

/// Decode a single G.711 mu-law byte to linear PCM16.
pub fn mulaw_to_linear(byte: u8) -> i16 {
    let byte = !byte;
    let sign = byte & 0x80;
    let exponent = ((byte >> 4) & 0x07) as i32;
    let mantissa = (byte & 0x0f) as i32;
    let mut sample = ((mantissa << 3) + MULAW_BIAS) << exponent;
    sample -= MULAW_BIAS;
    if sign != 0 {
        sample = -sample;
    }
    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

pub fn mulaw_decode(bytes: &[u8]) -> Vec<i16> {
    bytes.iter().map(|&b| mulaw_to_linear(b)).collect()
}

pub fn mulaw_encode(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| linear_to_mulaw(s)).collect()
}

/// Linear-interpolation resample between two integer sample rates.
/// `resample(x, r, r) == x` bit-identical (invariant §8.5).
pub fn resample(samples: &[i16], in_rate: u32, out_rate: u32) -> Vec<i16> {
    if samples.is_empty() || in_rate == out_rate {
        return samples.to_vec();
    }
    let out_len = ((samples.len() as u64 * out_rate as u64) / in_rate as u64).max(1) as usize;
    let mut out = Vec::with_capacity(out_len);
    let step = in_rate as f64 / out_rate as f64;
    for i in 0..out_len {
        let pos = i as f64 * step;
        let idx = pos.floor() as usize;
        let frac = pos - idx as f64;
        let s0 = samples[idx.min(samples.len() - 1)] as f64;
        let s1 = samples[(idx + 1).min(samples.len() - 1)] as f64;
        out.push((s0 + (s1 - s0) * frac).round() as i16);
    }
    out
}

/// Normalized RMS in [0, 1].
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let mean_sq = sum_sq / samples.len() as f64;
    (mean_sq.sqrt() / 32768.0) as f32
}

pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

pub fn bytes_to_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

pub fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn base64_decode(s: &str) -> anyhow::Result<Vec<u8>> {
    use base64::Engine;
    Ok(base64::engine::general_purpose::STANDARD.decode(s)?)
}
