//! # audio-stream-core
//!
//! Platform-agnostic engine for streaming captured desktop audio, encrypted,
//! to a single paired client over UDP.
//!
//! Provides the pairing key, AES-128-CBC packet framing, the handshake and
//! command wire records, and the session orchestrator. Platform backends
//! (Windows WASAPI loopback, Linux sink monitor) implement the `CaptureProvider` trait and are
//! handed to `StreamServer` at startup.
//!
//! ## Architecture
//!
//! ```text
//! audio-stream-core (this crate)
//! ├── crypto/       ← SymmetricKey, IvSource, CbcCodec, PacketFramer
//! ├── protocol/     ← StreamSettings, Command (little-endian wire records)
//! ├── traits/       ← CaptureProvider, AudioReadyCallback
//! ├── models/       ← StreamConfig, FormatDescriptor, SessionInfo, errors
//! ├── processing/   ← sample packing, TestToneCapture
//! ├── session/      ← StreamServer (sockets, worker threads, audio path)
//! └── storage/      ← config.ini load / create
//! ```

pub mod crypto;
pub mod models;
pub mod processing;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use crypto::framer::PacketFramer;
pub use crypto::key::SymmetricKey;
pub use models::config::StreamConfig;
pub use models::error::{CaptureError, CodecError, StreamError};
pub use models::format::{AudioFormat, FormatDescriptor};
pub use models::state::{SessionInfo, SessionState};
pub use processing::test_tone::TestToneCapture;
pub use protocol::messages::{Command, StreamSettings};
pub use session::orchestrator::StreamServer;
pub use storage::config_file::LoadedConfig;
pub use traits::capture_provider::{AudioReadyCallback, CaptureProvider};
