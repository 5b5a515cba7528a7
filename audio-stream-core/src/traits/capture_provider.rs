use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::models::format::{AudioFormat, FormatDescriptor};

/// Callback invoked once per captured chunk.
///
/// Receives the chunk as raw interleaved sample bytes in the negotiated format;
/// the slice length is the chunk size. Runs on the provider's own capture
/// thread, so keep the work minimal.
pub type AudioReadyCallback = Arc<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Platform capture backend consumed by the stream server.
///
/// Implemented by:
/// - `WasapiLoopbackCapture` (Windows, `audio-stream-windows`)
/// - `MonitorCapture` (Linux, `audio-stream-linux`)
/// - [`TestToneCapture`](crate::processing::test_tone::TestToneCapture) (synthetic, all platforms)
///
/// The server owns exactly one provider, chosen at startup, and serialises
/// every call to it. Only the readiness callback runs concurrently with it.
pub trait CaptureProvider: Send {
    /// Register the per-chunk callback. Chunks delivered before registration are dropped.
    fn set_audio_ready_callback(&mut self, callback: AudioReadyCallback);

    /// Open the capture device for `format` and record the negotiated parameters.
    ///
    /// May be called again after `stop_sync` to reinitialise for a new session.
    fn initialize_device(&mut self, format: &FormatDescriptor) -> Result<(), CaptureError>;

    /// Begin delivering chunks on the provider's own thread. Returns without waiting.
    fn start_async(&mut self) -> Result<(), CaptureError>;

    /// Stop capturing and wait until no further callback can fire. Idempotent.
    fn stop_sync(&mut self);

    /// Request a stop without waiting for the capture thread.
    fn stop_async(&mut self);

    /// Resume (`true`) or pause (`false`) delivery without tearing the device down.
    fn set_playback_state(&mut self, playing: bool);

    fn audio_format(&self) -> AudioFormat;

    fn bits_per_sample(&self) -> u16;

    fn channel_count(&self) -> u16;

    fn sample_rate(&self) -> u32;

    /// Frames per capture period, or 0 if the backend does not report one.
    fn engine_period(&self) -> u32;
}
