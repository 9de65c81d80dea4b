//! Telephony Audio Support
//!
//! G.711 mu-law decoding and frame energy for 8 kHz telephone audio.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::time::Instant;

/// Energy reported for an empty or silent frame, in dBFS.
pub const ENERGY_FLOOR_DB: f32 = -100.0;

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

/// Decode one 8-bit mu-law sample to linear 16-bit PCM (ITU-T G.711).
///
/// The byte is bit-complemented, then sign, exponent and mantissa are
/// extracted and the biased linear value rebuilt. Pure and total.
pub fn decode_mulaw_sample(byte: u8) -> i16 {
    let byte = !byte;
    let sign = byte & 0x80;
    let exponent = (byte >> 4) & 0x07;
    let mantissa = (byte & 0x0F) as i32;

    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;

    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Encode one linear 16-bit PCM sample to 8-bit mu-law (ITU-T G.711).
pub fn encode_mulaw_sample(sample: i16) -> u8 {
    let mut linear = sample as i32;

    let sign: u8 = if linear < 0 {
        linear = -linear;
        0x80
    } else {
        0x00
    };

    if linear > CLIP {
        linear = CLIP;
    }
    linear += BIAS;

    // Find the segment (exponent) the biased value falls in.
    let mut exponent: u8 = 7;
    for seg in 0..8u8 {
        if linear <= (0xFF << seg) {
            exponent = seg;
            break;
        }
    }

    let mantissa = ((linear >> (exponent + 3)) & 0x0F) as u8;

    !(sign | (exponent << 4) | mantissa)
}

/// Short-term energy of a raw mu-law frame in dB relative to full scale.
///
/// Decodes every sample, takes the RMS over the linear amplitudes
/// normalized by full scale (32768). An empty frame returns
/// [`ENERGY_FLOOR_DB`] rather than failing; malformed audio must never
/// crash the bridge.
pub fn frame_energy_db(frame: &[u8]) -> f32 {
    if frame.is_empty() {
        return ENERGY_FLOOR_DB;
    }

    let sum_sq: f64 = frame
        .iter()
        .map(|&b| {
            let s = decode_mulaw_sample(b) as f64 / 32768.0;
            s * s
        })
        .sum();

    let rms = (sum_sq / frame.len() as f64).sqrt();
    let db = 20.0 * (rms + 1e-10).log10();

    (db as f32).max(ENERGY_FLOOR_DB)
}

/// One inbound telephony payload: a ~20 ms block of 8 kHz mu-law samples.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw mu-law bytes.
    pub payload: Vec<u8>,
    /// Frame energy in dBFS, computed once at construction.
    pub energy_db: f32,
    /// Arrival time.
    pub received_at: Instant,
}

impl AudioFrame {
    /// Build a frame from raw mu-law bytes.
    pub fn from_mulaw(payload: Vec<u8>) -> Self {
        let energy_db = frame_energy_db(&payload);
        Self {
            payload,
            energy_db,
            received_at: Instant::now(),
        }
    }

    /// Build a frame from the base64 payload carried at the wire boundary.
    ///
    /// An undecodable payload becomes a silent frame at the energy floor.
    pub fn from_base64(payload: &str) -> Self {
        match BASE64.decode(payload) {
            Ok(bytes) => Self::from_mulaw(bytes),
            Err(_) => Self::from_mulaw(Vec::new()),
        }
    }

    /// Frame duration in milliseconds at 8 kHz mono.
    pub fn duration_ms(&self) -> u64 {
        (self.payload.len() as u64) / 8
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mulaw_roundtrip_all_bytes() {
        // Encoding the decoded value must reproduce the byte for every
        // possible code word (0x00..=0xFF), modulo the +/-0 ambiguity.
        for byte in 0u8..=255 {
            let linear = decode_mulaw_sample(byte);
            let re = encode_mulaw_sample(linear);
            let re_linear = decode_mulaw_sample(re);
            let err = (linear as i32 - re_linear as i32).abs();
            assert!(
                err <= 32,
                "byte {byte:#04x}: {linear} -> {re:#04x} -> {re_linear} (err {err})"
            );
        }
    }

    #[test]
    fn test_mulaw_encode_decode_bounded_error() {
        for &original in &[0i16, 100, -100, 1000, -1000, 8000, 32000, -32000] {
            let byte = encode_mulaw_sample(original);
            let decoded = decode_mulaw_sample(byte);
            // Quantization step grows with magnitude; full scale uses
            // 256-wide segments.
            let err = (original as i32 - decoded as i32).abs();
            assert!(err <= 256, "{original} -> {byte:#04x} -> {decoded}");
        }
    }

    #[test]
    fn test_silence_decodes_to_zero() {
        assert_eq!(decode_mulaw_sample(encode_mulaw_sample(0)), 0);
    }

    #[test]
    fn test_energy_of_empty_frame_is_floor() {
        assert_eq!(frame_energy_db(&[]), ENERGY_FLOOR_DB);
    }

    #[test]
    fn test_energy_of_silent_frame_is_floor() {
        let silence = vec![encode_mulaw_sample(0); 160];
        assert_eq!(frame_energy_db(&silence), ENERGY_FLOOR_DB);
    }

    #[test]
    fn test_energy_of_full_scale_frame_near_zero_dbfs() {
        let loud = vec![encode_mulaw_sample(i16::MAX); 160];
        let db = frame_energy_db(&loud);
        assert!(db > -1.0 && db <= 0.5, "got {db} dBFS");
    }

    #[test]
    fn test_frame_from_invalid_base64_is_silent() {
        let frame = AudioFrame::from_base64("not!!valid@@base64");
        assert!(frame.is_empty());
        assert_eq!(frame.energy_db, ENERGY_FLOOR_DB);
    }

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame::from_mulaw(vec![0xFF; 160]);
        assert_eq!(frame.duration_ms(), 20);
    }
}
