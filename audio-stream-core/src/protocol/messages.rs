//! Plaintext records carried inside encrypted packets.
//!
//! All fields are little-endian `i32`s. Decoders are bounds-checked and never
//! reinterpret an untrusted buffer as a typed record.
//!
//! ```text
//! StreamSettings (28 bytes)
//! [0-3]   client_port         client's audio receive port (request)
//! [4-7]   audio_format        0 = pcm, 1 = float          (response)
//! [8-11]  bits_per_sample                                 (response)
//! [12-15] channel_count                                   (response)
//! [16-19] sample_rate                                     (response)
//! [20-23] engine_period       frames per capture period   (response)
//! [24-27] command_port        server command socket port  (response)
//!
//! CommandPacket (4 bytes)
//! [0-3]   command             0 ping, 1 play, 2 pause, 3 stop
//! ```

use crate::models::error::CodecError;

/// Handshake record exchanged on the control port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSettings {
    pub client_port: i32,
    pub audio_format: i32,
    pub bits_per_sample: i32,
    pub channel_count: i32,
    pub sample_rate: i32,
    pub engine_period: i32,
    pub command_port: i32,
}

impl StreamSettings {
    pub const WIRE_LEN: usize = 28;

    /// A handshake request as a client sends it: only the audio port is set.
    pub fn request(client_port: u16) -> Self {
        Self {
            client_port: client_port as i32,
            ..Self::default()
        }
    }

    pub fn encode(&self) -> [u8; Self::WIRE_LEN] {
        let fields = [
            self.client_port,
            self.audio_format,
            self.bits_per_sample,
            self.channel_count,
            self.sample_rate,
            self.engine_period,
            self.command_port,
        ];

        let mut out = [0u8; Self::WIRE_LEN];
        for (chunk, value) in out.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        if payload.len() != Self::WIRE_LEN {
            return Err(CodecError::Malformed(format!(
                "stream settings must be {} bytes, got {}",
                Self::WIRE_LEN,
                payload.len()
            )));
        }

        let field = |i: usize| read_i32(&payload[i * 4..i * 4 + 4]);
        Ok(Self {
            client_port: field(0),
            audio_format: field(1),
            bits_per_sample: field(2),
            channel_count: field(3),
            sample_rate: field(4),
            engine_period: field(5),
            command_port: field(6),
        })
    }

    /// The client's audio port, if it is a usable UDP port.
    pub fn client_audio_port(&self) -> Result<u16, CodecError> {
        match u16::try_from(self.client_port) {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(CodecError::Malformed(format!("invalid client port {}", self.client_port))),
        }
    }
}

/// Playback control command, echoed back as its own acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// No-op; the ack doubles as a latency check.
    Ping,
    Play,
    Pause,
    Stop,
}

impl Command {
    pub const WIRE_LEN: usize = 4;

    pub fn code(self) -> i32 {
        match self {
            Self::Ping => 0,
            Self::Play => 1,
            Self::Pause => 2,
            Self::Stop => 3,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, CodecError> {
        match code {
            0 => Ok(Self::Ping),
            1 => Ok(Self::Play),
            2 => Ok(Self::Pause),
            3 => Ok(Self::Stop),
            other => Err(CodecError::UnknownCommand(other)),
        }
    }

    pub fn encode(self) -> [u8; Self::WIRE_LEN] {
        self.code().to_le_bytes()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        if payload.len() != Self::WIRE_LEN {
            return Err(CodecError::Malformed(format!(
                "command packet must be {} bytes, got {}",
                Self::WIRE_LEN,
                payload.len()
            )));
        }
        Self::from_code(read_i32(payload))
    }
}

fn read_i32(bytes: &[u8]) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    i32::from_le_bytes(raw)
}
