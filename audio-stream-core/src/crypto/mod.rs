//! Pairing key derivation, AES-128-CBC codec and the `IV || ciphertext` packet framer.

pub mod codec;
pub mod framer;
pub mod iv;
pub mod key;
