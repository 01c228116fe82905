//! Key types with secure memory handling.
//!
//! Key material zeroizes its memory on drop and never appears in `Debug`
//! output.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use turfguard_common::{Error, Result};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of the per-payload KDF salt in bytes.
pub const SALT_LENGTH: usize = 32;

/// Symmetric key for payload encryption.
///
/// Either the process-wide key from configuration or a key derived from a
/// password for a single payload.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    key: [u8; KEY_LENGTH],
}

impl EncryptionKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Parse a key from its hex encoding (64 hex characters).
    ///
    /// # Errors
    /// - Returns `Config` if the string is not valid hex or has the wrong length
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let mut decoded = hex::decode(encoded.trim())
            .map_err(|e| Error::Config(format!("Encryption key is not valid hex: {}", e)))?;

        if decoded.len() != KEY_LENGTH {
            let len = decoded.len();
            decoded.zeroize();
            return Err(Error::Config(format!(
                "Invalid key length: expected {} bytes, got {}",
                KEY_LENGTH, len
            )));
        }

        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self { key })
    }

    /// Generate a random key.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut key = [0u8; KEY_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

/// Salt for key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Salt(pub [u8; SALT_LENGTH]);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut salt = [0u8; SALT_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        Self(salt)
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_hex() {
        let encoded = "00".repeat(31) + "ff";
        let key = EncryptionKey::from_hex(&encoded).unwrap();
        assert_eq!(key.as_bytes()[31], 0xff);
        assert_eq!(key.as_bytes()[0], 0x00);
    }

    #[test]
    fn test_key_from_hex_rejects_bad_input() {
        assert!(EncryptionKey::from_hex("not-hex").is_err());
        assert!(EncryptionKey::from_hex(&"ab".repeat(16)).is_err());
        assert!(EncryptionKey::from_hex(&"ab".repeat(33)).is_err());
    }

    #[test]
    fn test_key_generate() {
        let key1 = EncryptionKey::generate();
        let key2 = EncryptionKey::generate();

        // Random keys should be different
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = EncryptionKey::from_bytes([7u8; KEY_LENGTH]);
        assert_eq!(format!("{:?}", key), "EncryptionKey([REDACTED])");
    }

    #[test]
    fn test_salt_generate() {
        let salt1 = Salt::generate();
        let salt2 = Salt::generate();

        // Random salts should be different
        assert_ne!(salt1.as_bytes(), salt2.as_bytes());
    }
}
