use rand::rngs::OsRng;
use rand::RngCore;

/// CBC initialization vector size in bytes.
pub const IV_LEN: usize = 16;

/// Source of per-packet IVs, backed by the operating system CSPRNG.
///
/// IVs travel in the clear; they only need to be unpredictable so that equal
/// plaintexts never produce equal ciphertexts.
#[derive(Debug, Default, Clone, Copy)]
pub struct IvSource;

impl IvSource {
    pub fn new() -> Self {
        Self
    }

    /// Fill `iv` with fresh random bytes.
    pub fn fill(&mut self, iv: &mut [u8; IV_LEN]) {
        OsRng.fill_bytes(iv);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn ivs_do_not_repeat() {
        let mut source = IvSource::new();
        let ivs: HashSet<[u8; IV_LEN]> = (0..10_000)
            .map(|_| {
                let mut iv = [0u8; IV_LEN];
                source.fill(&mut iv);
                iv
            })
            .collect();
        assert_eq!(ivs.len(), 10_000);
    }

    #[test]
    fn fill_overwrites_buffer() {
        let mut source = IvSource::new();
        let mut iv = [0u8; IV_LEN];
        source.fill(&mut iv);
        assert_ne!(iv, [0u8; IV_LEN]);
    }
}
