//! AES-128-CBC with PKCS#7 padding.
//!
//! A [`CbcCodec`] holds the key for the whole process lifetime and an IV that
//! is armed for exactly one encrypt or decrypt call. Each thread that encrypts
//! or decrypts owns its own codec; instances are never shared.

use aes::Aes128;
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::crypto::iv::IV_LEN;
use crate::crypto::key::{SymmetricKey, KEY_LEN};
use crate::models::error::CodecError;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES block size in bytes.
pub const BLOCK_LEN: usize = 16;

/// Ciphertext length for a plaintext of `plain_len` bytes.
///
/// PKCS#7 always appends at least one byte, so an aligned plaintext grows by a
/// full block.
pub const fn padded_len(plain_len: usize) -> usize {
    (plain_len / BLOCK_LEN + 1) * BLOCK_LEN
}

pub struct CbcCodec {
    key: [u8; KEY_LEN],
    iv: Option<[u8; IV_LEN]>,
}

impl CbcCodec {
    pub fn new(key: &SymmetricKey) -> Self {
        Self {
            key: *key.as_bytes(),
            iv: None,
        }
    }

    pub fn set_key(&mut self, key: &[u8]) -> Result<(), CodecError> {
        self.key = key.try_into().map_err(|_| CodecError::LengthMismatch {
            what: "key",
            expected: KEY_LEN,
            actual: key.len(),
        })?;
        Ok(())
    }

    /// Arm `iv` for the next single [`encrypt`](Self::encrypt) or
    /// [`decrypt`](Self::decrypt) call.
    pub fn set_iv(&mut self, iv: &[u8]) -> Result<(), CodecError> {
        let iv: [u8; IV_LEN] = iv.try_into().map_err(|_| CodecError::LengthMismatch {
            what: "iv",
            expected: IV_LEN,
            actual: iv.len(),
        })?;
        self.iv = Some(iv);
        Ok(())
    }

    fn take_iv(&mut self) -> Result<[u8; IV_LEN], CodecError> {
        self.iv.take().ok_or(CodecError::MissingIv)
    }

    pub fn encrypt(&mut self, plain: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = vec![0u8; padded_len(plain.len())];
        let written = self.encrypt_into(plain, &mut out)?;
        out.truncate(written);
        Ok(out)
    }

    /// Pad and encrypt `plain` into the front of `out`, returning the number of
    /// ciphertext bytes written.
    pub fn encrypt_into(&mut self, plain: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
        let iv = self.take_iv()?;
        let needed = padded_len(plain.len());
        if out.len() < needed {
            return Err(CodecError::BufferTooSmall {
                needed,
                available: out.len(),
            });
        }

        let available = out.len();
        let ciphertext = Aes128CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_b2b_mut::<Pkcs7>(plain, &mut out[..needed])
            .map_err(|_| CodecError::BufferTooSmall { needed, available })?;
        Ok(ciphertext.len())
    }

    pub fn decrypt(&mut self, cipher: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut buf = cipher.to_vec();
        let plain_len = self.decrypt_in_place(&mut buf)?.len();
        buf.truncate(plain_len);
        Ok(buf)
    }

    /// Decrypt `buf` in place and return the plaintext with padding stripped.
    ///
    /// Only the final byte is inspected as the padding length; it must be in
    /// `1..=16` and no larger than the buffer.
    pub fn decrypt_in_place<'a>(&mut self, buf: &'a mut [u8]) -> Result<&'a [u8], CodecError> {
        let iv = self.take_iv()?;
        if buf.is_empty() || buf.len() % BLOCK_LEN != 0 {
            return Err(CodecError::Malformed(format!(
                "ciphertext length {} is not a positive multiple of {}",
                buf.len(),
                BLOCK_LEN
            )));
        }

        let len = buf.len();
        Aes128CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_mut::<NoPadding>(buf)
            .map_err(|_| CodecError::Malformed("ciphertext is not block aligned".into()))?;

        let pad = buf[len - 1];
        if pad == 0 || pad as usize > BLOCK_LEN || pad as usize > len {
            return Err(CodecError::InvalidPadding(pad));
        }
        Ok(&buf[..len - pad as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> CbcCodec {
        CbcCodec::new(&SymmetricKey::from_pairing_secret("483920").unwrap())
    }

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    /// Raw CBC encryption without padding, for forging bad plaintexts.
    fn encrypt_unpadded(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], block: &[u8]) -> Vec<u8> {
        let mut buf = block.to_vec();
        let len = buf.len();
        Aes128CbcEnc::new(&(*key).into(), &(*iv).into())
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .unwrap();
        buf
    }

    #[test]
    fn round_trip_various_lengths() {
        let mut c = codec();
        for len in [0usize, 1, 15, 16, 17, 31, 32, 100, 1024, 4096, 7777] {
            let plain: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
            let iv = [len as u8; IV_LEN];

            c.set_iv(&iv).unwrap();
            let cipher = c.encrypt(&plain).unwrap();
            assert_eq!(cipher.len() % BLOCK_LEN, 0);

            c.set_iv(&iv).unwrap();
            assert_eq!(c.decrypt(&cipher).unwrap(), plain, "len {len}");
        }
    }

    #[test]
    fn aligned_plaintext_gets_full_padding_block() {
        let mut c = codec();
        for len in [0usize, 16, 32, 48, 1024] {
            c.set_iv(&[7u8; IV_LEN]).unwrap();
            let cipher = c.encrypt(&vec![0xAB; len]).unwrap();
            assert_eq!(cipher.len(), len + BLOCK_LEN);
        }
        assert_eq!(padded_len(5), 16);
        assert_eq!(padded_len(16), 32);
    }

    #[test]
    fn matches_nist_cbc_vector() {
        // SP 800-38A F.2.1, first block.
        let mut c = codec();
        c.set_key(&hex("2b7e151628aed2a6abf7158809cf4f3c")).unwrap();
        c.set_iv(&hex("000102030405060708090a0b0c0d0e0f")).unwrap();
        let cipher = c.encrypt(&hex("6bc1bee22e409f96e93d7e117393172a")).unwrap();
        assert_eq!(&cipher[..16], hex("7649abac8119b246cee98e9b12e9197d").as_slice());
    }

    #[test]
    fn iv_is_consumed_by_one_call() {
        let mut c = codec();
        c.set_iv(&[1u8; IV_LEN]).unwrap();
        c.encrypt(b"first").unwrap();
        assert_eq!(c.encrypt(b"second"), Err(CodecError::MissingIv));
        assert_eq!(c.decrypt(&[0u8; 16]), Err(CodecError::MissingIv));
    }

    #[test]
    fn rejects_wrong_key_and_iv_lengths() {
        let mut c = codec();
        assert!(matches!(
            c.set_key(&[0u8; 15]),
            Err(CodecError::LengthMismatch { what: "key", expected: 16, actual: 15 })
        ));
        assert!(matches!(
            c.set_iv(&[0u8; 17]),
            Err(CodecError::LengthMismatch { what: "iv", expected: 16, actual: 17 })
        ));
    }

    #[test]
    fn encrypt_into_checks_capacity() {
        let mut c = codec();
        c.set_iv(&[3u8; IV_LEN]).unwrap();
        let mut out = [0u8; 16];
        assert_eq!(
            c.encrypt_into(&[0u8; 16], &mut out),
            Err(CodecError::BufferTooSmall { needed: 32, available: 16 })
        );
    }

    #[test]
    fn encrypt_into_oversized_buffer_writes_prefix() {
        let mut c = codec();
        c.set_iv(&[3u8; IV_LEN]).unwrap();
        let mut out = [0xEEu8; 64];
        assert_eq!(c.encrypt_into(&[9u8; 20], &mut out), Ok(32));
        assert_eq!(&out[32..], &[0xEEu8; 32][..]);

        c.set_iv(&[3u8; IV_LEN]).unwrap();
        assert_eq!(c.decrypt(&out[..32]).unwrap(), vec![9u8; 20]);
    }

    #[test]
    fn rejects_zero_padding_byte() {
        let key = *SymmetricKey::from_pairing_secret("483920").unwrap().as_bytes();
        let iv = [9u8; IV_LEN];
        let mut block = [0x41u8; 16];
        block[15] = 0;
        let cipher = encrypt_unpadded(&key, &iv, &block);

        let mut c = codec();
        c.set_iv(&iv).unwrap();
        assert_eq!(c.decrypt(&cipher), Err(CodecError::InvalidPadding(0)));
    }

    #[test]
    fn rejects_padding_byte_above_block_size() {
        let key = *SymmetricKey::from_pairing_secret("483920").unwrap().as_bytes();
        let iv = [9u8; IV_LEN];
        let mut block = [0x41u8; 32];
        block[31] = 17;
        let cipher = encrypt_unpadded(&key, &iv, &block);

        let mut c = codec();
        c.set_iv(&iv).unwrap();
        assert_eq!(c.decrypt(&cipher), Err(CodecError::InvalidPadding(17)));
    }

    #[test]
    fn rejects_unaligned_ciphertext() {
        let mut c = codec();
        c.set_iv(&[0u8; IV_LEN]).unwrap();
        assert!(matches!(c.decrypt(&[0u8; 20]), Err(CodecError::Malformed(_))));
        c.set_iv(&[0u8; IV_LEN]).unwrap();
        assert!(matches!(c.decrypt(&[]), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn wrong_key_never_panics() {
        let mut sender = codec();
        let mut receiver = CbcCodec::new(&SymmetricKey::from_pairing_secret("000000").unwrap());
        for i in 0..64u8 {
            let iv = [i; IV_LEN];
            sender.set_iv(&iv).unwrap();
            let cipher = sender.encrypt(&[i; 28]).unwrap();
            receiver.set_iv(&iv).unwrap();
            // Either garbage or a padding error; never a panic.
            let _ = receiver.decrypt(&cipher);
        }
    }
}
