//! Authenticated encryption using ChaCha20-Poly1305.
//!
//! The IETF variant with a 96-bit nonce. Sealed output is laid out as
//! `iv || tag || ciphertext`, the order the payload wire format expects.

use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Key, Nonce, Tag,
};

use crate::keys::EncryptionKey;
use turfguard_common::{Error, Result};

/// Nonce (IV) size for ChaCha20-Poly1305 (12 bytes).
pub const IV_SIZE: usize = 12;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Encrypt plaintext under `key` with a fresh random IV.
///
/// # Postconditions
/// - Returns `iv || tag || ciphertext`
/// - The output length is `IV_SIZE + TAG_SIZE + plaintext.len()`
///
/// # Errors
/// - Returns `Encryption` if the cipher rejects the input
pub fn seal(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    use rand::RngCore;

    let mut iv = [0u8; IV_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut buffer)
        .map_err(|e| Error::Encryption(format!("Encryption failed: {}", e)))?;

    let mut sealed = Vec::with_capacity(IV_SIZE + TAG_SIZE + buffer.len());
    sealed.extend_from_slice(&iv);
    sealed.extend_from_slice(&tag);
    sealed.extend_from_slice(&buffer);
    Ok(sealed)
}

/// Decrypt `iv || tag || ciphertext` under `key`.
///
/// # Errors
/// - Returns `Decryption` if the input is shorter than `IV_SIZE + TAG_SIZE`
/// - Returns `Decryption` if the tag does not verify (tampered data or
///   wrong key); the buffer is discarded without being returned
pub fn open(key: &EncryptionKey, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < IV_SIZE + TAG_SIZE {
        return Err(Error::Decryption("Ciphertext too short".to_string()));
    }

    let (iv, rest) = sealed.split_at(IV_SIZE);
    let (tag, ciphertext) = rest.split_at(TAG_SIZE);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(Nonce::from_slice(iv), b"", &mut buffer, Tag::from_slice(tag))
        .map_err(|_| Error::Decryption("Authentication failed".to_string()))?;

    Ok(buffer)
}
