use std::fmt;
use std::str::FromStr;

use super::error::CaptureError;

/// Sample encoding announced in the handshake (`0` = integer PCM, `1` = IEEE float).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Pcm,
    Float,
}

impl AudioFormat {
    pub fn wire_code(self) -> i32 {
        match self {
            Self::Pcm => 0,
            Self::Float => 1,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pcm => f.write_str("pcm"),
            Self::Float => f.write_str("float"),
        }
    }
}

/// Highest sample rate any supported backend offers.
pub const MAX_SAMPLE_RATE: u32 = 768_000;

/// Requested capture format, parsed from `"<pcm|float> <bitsPerSample> <sampleRate>"`.
///
/// `float` is always 32-bit; any other bit count given alongside it is
/// normalised to 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub format: AudioFormat,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
}

impl FormatDescriptor {
    pub const fn pcm16(sample_rate: u32) -> Self {
        Self {
            format: AudioFormat::Pcm,
            bits_per_sample: 16,
            sample_rate,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.sample_rate == 0 || self.sample_rate > MAX_SAMPLE_RATE {
            return Err(CaptureError::InvalidFormat(format!(
                "sample rate {} outside 1..={}",
                self.sample_rate, MAX_SAMPLE_RATE
            )));
        }
        match self.format {
            AudioFormat::Pcm if ![16, 24, 32].contains(&self.bits_per_sample) => Err(
                CaptureError::InvalidFormat(format!("unsupported pcm bit depth: {}", self.bits_per_sample)),
            ),
            AudioFormat::Float if self.bits_per_sample != 32 => Err(CaptureError::InvalidFormat(
                format!("float samples must be 32-bit, got {}", self.bits_per_sample),
            )),
            _ => Ok(()),
        }
    }
}

impl Default for FormatDescriptor {
    fn default() -> Self {
        Self::pcm16(48000)
    }
}

impl FromStr for FormatDescriptor {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        let [format, bits, rate] = tokens.as_slice() else {
            return Err(CaptureError::InvalidFormat(format!(
                "expected 3 tokens \"<pcm|float> <bits> <rate>\", got {}",
                tokens.len()
            )));
        };

        let bits: u16 = bits
            .parse()
            .map_err(|_| CaptureError::InvalidFormat(format!("bad bit depth: {bits}")))?;
        let sample_rate: u32 = rate
            .parse()
            .map_err(|_| CaptureError::InvalidFormat(format!("bad sample rate: {rate}")))?;

        let descriptor = match *format {
            "pcm" => Self {
                format: AudioFormat::Pcm,
                bits_per_sample: bits,
                sample_rate,
            },
            "float" => Self {
                format: AudioFormat::Float,
                bits_per_sample: 32,
                sample_rate,
            },
            other => {
                return Err(CaptureError::InvalidFormat(format!("unknown sample format: {other}")));
            }
        };

        descriptor.validate()?;
        Ok(descriptor)
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.format, self.bits_per_sample, self.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_descriptor() {
        let d: FormatDescriptor = "pcm 16 48000".parse().unwrap();
        assert_eq!(d, FormatDescriptor::pcm16(48000));
        assert_eq!(d.bytes_per_sample(), 2);
    }

    #[test]
    fn float_forces_32_bits() {
        let d: FormatDescriptor = "float 16 44100".parse().unwrap();
        assert_eq!(d.format, AudioFormat::Float);
        assert_eq!(d.bits_per_sample, 32);
        assert_eq!(d.sample_rate, 44100);
    }

    #[test]
    fn tolerates_extra_whitespace() {
        let d: FormatDescriptor = "  pcm   24\t96000 \n".parse().unwrap();
        assert_eq!(d.bits_per_sample, 24);
        assert_eq!(d.sample_rate, 96000);
    }

    #[test]
    fn rejects_wrong_token_count() {
        assert!("pcm 16".parse::<FormatDescriptor>().is_err());
        assert!("pcm 16 48000 2".parse::<FormatDescriptor>().is_err());
        assert!("".parse::<FormatDescriptor>().is_err());
    }

    #[test]
    fn rejects_unknown_format_and_depth() {
        assert!("alaw 8 8000".parse::<FormatDescriptor>().is_err());
        assert!("pcm 12 48000".parse::<FormatDescriptor>().is_err());
        assert!("pcm sixteen 48000".parse::<FormatDescriptor>().is_err());
        assert!("pcm 16 0".parse::<FormatDescriptor>().is_err());
    }

    #[test]
    fn rejects_out_of_range_sample_rate() {
        assert!("pcm 16 0".parse::<FormatDescriptor>().is_err());
        assert!("pcm 16 500000000".parse::<FormatDescriptor>().is_err());
        assert!("pcm 16 768000".parse::<FormatDescriptor>().is_ok());
    }

    #[test]
    fn display_round_trips() {
        let d: FormatDescriptor = "float 32 48000".parse().unwrap();
        assert_eq!(d.to_string(), "float 32 48000");
        assert_eq!(d.to_string().parse::<FormatDescriptor>().unwrap(), d);
    }

    #[test]
    fn wire_codes() {
        assert_eq!(AudioFormat::Pcm.wire_code(), 0);
        assert_eq!(AudioFormat::Float.wire_code(), 1);
    }
}
