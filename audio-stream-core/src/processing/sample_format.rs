//! Sample packing for the formats a client can be offered.
//!
//! Converts normalised `f32` samples (−1.0 … 1.0) to the little-endian byte
//! layout announced in the handshake:
//!
//! ```text
//! pcm 16   i16 LE, 2 bytes
//! pcm 24   i24 LE, 3 bytes (low three bytes of the i32 value)
//! pcm 32   i32 LE, 4 bytes
//! float 32 f32 LE, 4 bytes
//! ```

use crate::models::format::{AudioFormat, FormatDescriptor};

/// Bytes per interleaved frame.
pub fn bytes_per_frame(format: &FormatDescriptor, channels: u16) -> usize {
    format.bytes_per_sample() * channels as usize
}

/// Frames in one capture period of `period_ms` milliseconds.
pub fn frames_per_period(sample_rate: u32, period_ms: u32) -> u32 {
    let frames = u64::from(sample_rate) * u64::from(period_ms) / 1000;
    u32::try_from(frames).unwrap_or(u32::MAX)
}

/// Pack interleaved samples into `out`, appending to whatever it holds.
pub fn encode_samples_into(samples: &[f32], format: &FormatDescriptor, out: &mut Vec<u8>) {
    out.reserve(samples.len() * format.bytes_per_sample());
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        match (format.format, format.bits_per_sample) {
            (AudioFormat::Float, _) => out.extend_from_slice(&clamped.to_le_bytes()),
            (AudioFormat::Pcm, 16) => {
                let value = (clamped * i16::MAX as f32) as i16;
                out.extend_from_slice(&value.to_le_bytes());
            }
            (AudioFormat::Pcm, 24) => {
                let value = (clamped as f64 * I24_MAX as f64) as i32;
                out.extend_from_slice(&value.to_le_bytes()[..3]);
            }
            (AudioFormat::Pcm, _) => {
                let value = (clamped as f64 * i32::MAX as f64) as i32;
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
    }
}

pub fn encode_samples(samples: &[f32], format: &FormatDescriptor) -> Vec<u8> {
    let mut out = Vec::new();
    encode_samples_into(samples, format, &mut out);
    out
}

const I24_MAX: i32 = (1 << 23) - 1;

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(bits: u16) -> FormatDescriptor {
        FormatDescriptor {
            format: AudioFormat::Pcm,
            bits_per_sample: bits,
            sample_rate: 48000,
        }
    }

    #[test]
    fn pcm16_scaling() {
        let bytes = encode_samples(&[0.0, 1.0, -1.0, 2.0], &pcm(16));
        assert_eq!(bytes.len(), 8);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 0);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -i16::MAX);
        // clamped
        assert_eq!(i16::from_le_bytes([bytes[6], bytes[7]]), i16::MAX);
    }

    #[test]
    fn pcm24_is_three_bytes() {
        let bytes = encode_samples(&[1.0, -1.0], &pcm(24));
        assert_eq!(bytes.len(), 6);
        assert_eq!(&bytes[0..3], &[0xFF, 0xFF, 0x7F]);
        assert_eq!(&bytes[3..6], &[0x01, 0x00, 0x80]);
    }

    #[test]
    fn pcm32_full_scale() {
        let bytes = encode_samples(&[1.0], &pcm(32));
        assert_eq!(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), i32::MAX);
    }

    #[test]
    fn float_passthrough() {
        let format: FormatDescriptor = "float 32 48000".parse().unwrap();
        let bytes = encode_samples(&[0.25, -0.5], &format);
        assert_eq!(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 0.25);
        assert_eq!(f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), -0.5);
    }

    #[test]
    fn frame_and_period_sizes() {
        assert_eq!(bytes_per_frame(&pcm(16), 2), 4);
        assert_eq!(bytes_per_frame(&pcm(24), 2), 6);
        assert_eq!(frames_per_period(48000, 10), 480);
        assert_eq!(frames_per_period(44100, 10), 441);
        assert_eq!(frames_per_period(500_000_000, 10), 5_000_000);
        assert_eq!(frames_per_period(u32::MAX, u32::MAX), u32::MAX);
    }
}
