//! Key derivation using Argon2id.
//!
//! Argon2id is a memory-hard password hashing function that provides
//! resistance to both GPU and time-memory trade-off attacks.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use crate::keys::{EncryptionKey, Salt, KEY_LENGTH};
use turfguard_common::{Error, Result};

/// Parameters for Argon2id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (e.g., 65536 = 64 MiB).
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Create parameters from explicit costs.
    pub fn new(memory_cost: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            memory_cost,
            time_cost,
            parallelism,
        }
    }

    /// Parameters for password-mode payload keys (64 MiB, three passes).
    pub fn interactive() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// Parameters for stored password hashes.
    ///
    /// The OWASP Argon2id floor (19 MiB, two passes), at least as costly as
    /// bcrypt with cost 12.
    pub fn password_hashing() -> Self {
        Self {
            memory_cost: 19456, // 19 MiB
            time_cost: 2,
            parallelism: 1,
        }
    }

    /// Build an Argon2id context with these parameters.
    pub(crate) fn argon2(&self, output_len: Option<usize>) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            output_len,
        )
        .map_err(|e| Error::Config(format!("Invalid KDF parameters: {}", e)))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Derive a payload key from a password and its per-payload salt.
///
/// Fails with `InvalidInput` on an empty password and `Config` on
/// parameters Argon2 rejects.
pub fn derive_key(password: &[u8], salt: &Salt, params: &KdfParams) -> Result<EncryptionKey> {
    if password.is_empty() {
        return Err(Error::InvalidInput("Password cannot be empty".to_string()));
    }

    let argon2 = params.argon2(Some(KEY_LENGTH))?;

    let mut key_bytes = [0u8; KEY_LENGTH];
    argon2
        .hash_password_into(password, salt.as_bytes(), &mut key_bytes)
        .map_err(|e| Error::Encryption(format!("Key derivation failed: {}", e)))?;

    Ok(EncryptionKey::from_bytes(key_bytes))
}
