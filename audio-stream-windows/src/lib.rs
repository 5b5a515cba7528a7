//! # audio-stream-windows
//!
//! Windows WASAPI backend for audio-stream.
//!
//! Provides `WasapiLoopbackCapture`, a `CaptureProvider` that captures the
//! mix of the default render endpoint in the format negotiated with the
//! client.
//!
//! ## Platform Requirements
//! - Windows 10 or later
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use audio_stream_core::{StreamConfig, StreamServer};
//! use audio_stream_windows::WasapiLoopbackCapture;
//!
//! let config = StreamConfig::default();
//! let server = StreamServer::start(&config, Box::new(WasapiLoopbackCapture::default_device()))?;
//! ```

#[cfg(target_os = "windows")]
pub mod wasapi_loopback;

#[cfg(target_os = "windows")]
pub use wasapi_loopback::WasapiLoopbackCapture;
