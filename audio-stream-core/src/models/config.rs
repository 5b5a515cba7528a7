use crate::crypto::key::KEY_LEN;

use super::format::FormatDescriptor;

/// Well-known UDP port the handshake listener binds when none is configured.
pub const DEFAULT_CONTROL_PORT: u16 = 5540;

/// Number of digits in a generated pair code.
pub const PAIR_CODE_DIGITS: usize = 6;

/// Process configuration for the streaming server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Pairing secret shown to the user and typed into the client (at most 16 bytes).
    pub pair_code: String,

    /// Well-known port of the handshake listener.
    pub port: u16,

    /// Capture format requested from the backend on every handshake.
    pub format: FormatDescriptor,
}

impl StreamConfig {
    pub fn new(pair_code: impl Into<String>, port: u16, format: FormatDescriptor) -> Self {
        Self {
            pair_code: pair_code.into(),
            port,
            format,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.pair_code.is_empty() {
            return Err("pair code must not be empty".into());
        }
        if self.pair_code.len() > KEY_LEN {
            return Err(format!(
                "pair code is {} bytes, at most {} allowed",
                self.pair_code.len(),
                KEY_LEN
            ));
        }
        self.format.validate().map_err(|e| e.to_string())?;
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            pair_code: crate::storage::config_file::generate_pair_code(),
            port: DEFAULT_CONTROL_PORT,
            format: FormatDescriptor::default(),
        }
    }
}
