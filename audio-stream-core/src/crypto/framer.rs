use crate::crypto::codec::{padded_len, CbcCodec};
use crate::crypto::iv::{IvSource, IV_LEN};
use crate::crypto::key::SymmetricKey;
use crate::models::error::CodecError;

/// Smallest datagram that can carry an IV and at least one ciphertext byte.
pub const MIN_DATAGRAM_LEN: usize = IV_LEN + 1;

/// Total wire size of an encrypted packet carrying `payload_len` bytes.
pub const fn sealed_len(payload_len: usize) -> usize {
    IV_LEN + padded_len(payload_len)
}

/// Builds and parses encrypted packets.
///
/// Wire layout:
/// ```text
/// [16-byte IV, clear] [AES-128-CBC ciphertext, PKCS#7 padded, N × 16 bytes]
/// ```
///
/// Every packet gets a fresh IV. A framer owns its codec, so each thread that
/// sends or receives packets holds its own `PacketFramer`.
pub struct PacketFramer {
    codec: CbcCodec,
    ivs: IvSource,
}

impl PacketFramer {
    pub fn new(key: &SymmetricKey) -> Self {
        Self {
            codec: CbcCodec::new(key),
            ivs: IvSource::new(),
        }
    }

    pub fn encode(&mut self, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut packet = vec![0u8; sealed_len(payload.len())];
        let written = self.encode_into(payload, &mut packet)?;
        packet.truncate(written);
        Ok(packet)
    }

    /// Write `IV || ciphertext` into `buf` and return the packet length.
    ///
    /// The ciphertext is produced directly behind the IV field, so a single
    /// scratch buffer is enough for the whole packet.
    pub fn encode_into(&mut self, payload: &[u8], buf: &mut [u8]) -> Result<usize, CodecError> {
        let needed = sealed_len(payload.len());
        if buf.len() < needed {
            return Err(CodecError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }

        let (iv_field, body) = buf.split_at_mut(IV_LEN);
        let mut iv = [0u8; IV_LEN];
        self.ivs.fill(&mut iv);
        iv_field.copy_from_slice(&iv);

        self.codec.set_iv(&iv)?;
        let written = self.codec.encrypt_into(payload, body)?;
        Ok(IV_LEN + written)
    }

    pub fn decode(&mut self, datagram: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut buf = datagram.to_vec();
        let len = self.decode_in_place(&mut buf)?.len();
        buf.drain(..IV_LEN);
        buf.truncate(len);
        Ok(buf)
    }

    /// Decrypt the datagram held in `buf` in place and return the payload.
    pub fn decode_in_place<'a>(&mut self, buf: &'a mut [u8]) -> Result<&'a [u8], CodecError> {
        if buf.len() < MIN_DATAGRAM_LEN {
            return Err(CodecError::Malformed(format!(
                "datagram of {} bytes is shorter than {}",
                buf.len(),
                MIN_DATAGRAM_LEN
            )));
        }

        let (iv, body) = buf.split_at_mut(IV_LEN);
        self.codec.set_iv(iv)?;
        self.codec.decrypt_in_place(body)
    }
}
