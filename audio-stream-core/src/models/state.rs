use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Playback state of the active capture session.
///
/// State transitions:
/// ```text
/// (handshake) → streaming ↔ paused
///                   ↓         ↓
///                 stopped ← ──┘
/// ```
/// A new handshake always replaces the session, whatever its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Streaming,
    Paused,
    Stopped,
}

impl SessionState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Snapshot of the currently paired client, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: Uuid,
    /// Address the audio socket is connected to (client IP, client audio port).
    pub client: SocketAddr,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn new(client: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            client,
            state: SessionState::Streaming,
            started_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_streaming() {
        let info = SessionInfo::new("10.0.0.7:9000".parse().unwrap());
        assert!(info.state.is_streaming());
        assert!(!info.state.is_paused());
        assert_eq!(info.client.port(), 9000);
    }

    #[test]
    fn session_ids_are_unique() {
        let addr: SocketAddr = "10.0.0.7:9000".parse().unwrap();
        assert_ne!(SessionInfo::new(addr).id, SessionInfo::new(addr).id);
    }
}
