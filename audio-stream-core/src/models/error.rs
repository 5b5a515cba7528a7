use std::io;

use thiserror::Error;

/// Failures of the symmetric codec, the packet framer and the wire decoders.
///
/// Every variant describes a single bad datagram or a caller bug; none of
/// them is fatal to a worker loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("{what} length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("no IV armed for this operation")]
    MissingIv,

    #[error("output buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("invalid padding length {0}")]
    InvalidPadding(u8),

    #[error("unknown command code {0}")]
    UnknownCommand(i32),
}

/// Errors reported by a capture backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device not available")]
    DeviceNotAvailable,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Top-level error of the streaming engine.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Bad pairing secret or unreadable configuration. The process must not start.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Socket creation, bind or address lookup failed.
    #[error("transport error ({context}): {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("decode error: {0}")]
    Decode(#[from] CodecError),

    #[error("capture device error: {0}")]
    Device(#[from] CaptureError),

    #[error("send failed: {0}")]
    Send(#[source] io::Error),
}

impl StreamError {
    pub(crate) fn transport(context: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Transport { context, source }
    }
}
