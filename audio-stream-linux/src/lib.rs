//! # audio-stream-linux
//!
//! Linux backend for audio-stream.
//!
//! Provides `MonitorCapture`, a `CaptureProvider` that records the monitor
//! source of the default PulseAudio (or PipeWire) sink through the sound
//! server's ALSA plugin, in the format negotiated with the client.
//!
//! ## Platform Requirements
//! - PulseAudio, or PipeWire with `pipewire-pulse`
//! - ALSA development headers at build time
//! - the `monitor` feature
//!
//! ## Usage
//! ```ignore
//! use audio_stream_core::{StreamConfig, StreamServer};
//! use audio_stream_linux::MonitorCapture;
//!
//! let config = StreamConfig::default();
//! let server = StreamServer::start(&config, Box::new(MonitorCapture::default_monitor()))?;
//! ```

pub mod routing;

#[cfg(all(target_os = "linux", feature = "monitor"))]
pub mod monitor_capture;

#[cfg(all(target_os = "linux", feature = "monitor"))]
pub use monitor_capture::MonitorCapture;
