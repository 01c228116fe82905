//! Encryption service and the encrypted payload wire format.
//!
//! # Wire format
//! ```text
//! base64( [salt (32 bytes), password mode only] || iv (12) || tag (16) || ciphertext )
//! ```
//!
//! The payload does not record whether it was produced in password mode or
//! key mode. Callers must remember which mode they used and pass the same
//! `password` argument to `decrypt`; decrypting in the wrong mode fails
//! authentication rather than returning garbage.

use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::warn;

use crate::aead::{self, IV_SIZE, TAG_SIZE};
use crate::kdf::{derive_key, KdfParams};
use crate::keys::{EncryptionKey, Salt, SALT_LENGTH};
use crate::{password, token};
use turfguard_common::{Environment, Error, Result};

/// Environment variable holding the hex-encoded process-wide key.
pub const ENCRYPTION_KEY_ENV: &str = "DATABASE_ENCRYPTION_KEY";

/// Immutable configuration for an `EncryptionService`.
#[derive(Debug, Clone)]
pub struct EncryptionConfig {
    /// Key used when no password is supplied.
    pub key: EncryptionKey,
    /// Argon2id parameters for password-mode payloads.
    pub kdf_params: KdfParams,
    /// Argon2id parameters for stored password hashes.
    pub password_hash_params: KdfParams,
}

impl EncryptionConfig {
    /// Create a configuration around an explicit key with default costs.
    pub fn new(key: EncryptionKey) -> Self {
        Self {
            key,
            kdf_params: KdfParams::default(),
            password_hash_params: KdfParams::password_hashing(),
        }
    }

    /// Set the payload KDF parameters.
    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf_params = params;
        self
    }

    /// Set the password hashing parameters.
    pub fn with_password_hash_params(mut self, params: KdfParams) -> Self {
        self.password_hash_params = params;
        self
    }

    /// Resolve the key from an optional hex string.
    ///
    /// Outside production a missing key is replaced by a random one that
    /// lives only as long as the process; in production it is an error.
    pub fn resolve(key_hex: Option<&str>, environment: Environment) -> Result<Self> {
        let key = match key_hex.map(str::trim).filter(|k| !k.is_empty()) {
            Some(hex) => EncryptionKey::from_hex(hex)?,
            None if environment.is_production() => {
                return Err(Error::Config(format!(
                    "{} must be set in production",
                    ENCRYPTION_KEY_ENV
                )));
            }
            None => {
                warn!(
                    env_var = ENCRYPTION_KEY_ENV,
                    "No encryption key configured; using an ephemeral key, key-mode payloads will not survive a restart"
                );
                EncryptionKey::generate()
            }
        };

        Ok(Self::new(key))
    }

    /// Resolve the key from `DATABASE_ENCRYPTION_KEY`.
    pub fn from_env(environment: Environment) -> Result<Self> {
        let key_hex = std::env::var(ENCRYPTION_KEY_ENV).ok();
        Self::resolve(key_hex.as_deref(), environment)
    }
}

/// Authenticated symmetric encryption, tokens and password hashing.
///
/// Holds only immutable configuration, so one instance can be shared across
/// concurrent requests.
#[derive(Debug, Clone)]
pub struct EncryptionService {
    config: EncryptionConfig,
}

impl EncryptionService {
    /// Create a service from its configuration.
    pub fn new(config: EncryptionConfig) -> Self {
        Self { config }
    }

    /// Encrypt `plaintext` and return the base64 payload.
    ///
    /// With `password`, a key is derived with Argon2id under a fresh salt
    /// that is prepended to the payload. Without it, the configured key is
    /// used. Every call draws a fresh IV.
    ///
    /// # Errors
    /// - Returns `InvalidInput` for an empty password
    /// - Returns `Encryption` if derivation or sealing fails
    pub fn encrypt(&self, plaintext: &[u8], password: Option<&[u8]>) -> Result<String> {
        let payload = match password {
            Some(password) => {
                let salt = Salt::generate();
                let key = derive_key(password, &salt, &self.config.kdf_params)?;
                let sealed = aead::seal(&key, plaintext)?;

                let mut payload = Vec::with_capacity(SALT_LENGTH + sealed.len());
                payload.extend_from_slice(salt.as_bytes());
                payload.extend_from_slice(&sealed);
                payload
            }
            None => aead::seal(&self.config.key, plaintext)?,
        };

        Ok(STANDARD.encode(payload))
    }

    /// Decrypt a payload produced by `encrypt` in the same mode.
    ///
    /// # Errors
    /// - Returns `Decryption` on invalid base64, a truncated payload, or a
    ///   tag that does not verify. No plaintext is returned in any of these
    ///   cases.
    pub fn decrypt(&self, payload: &str, password: Option<&[u8]>) -> Result<Vec<u8>> {
        let raw = STANDARD
            .decode(payload.trim())
            .map_err(|_| Error::Decryption("Payload is not valid base64".to_string()))?;

        match password {
            Some(password) => {
                if raw.len() < SALT_LENGTH + IV_SIZE + TAG_SIZE {
                    return Err(Error::Decryption("Payload too short".to_string()));
                }
                let (salt_bytes, sealed) = raw.split_at(SALT_LENGTH);
                let mut salt = [0u8; SALT_LENGTH];
                salt.copy_from_slice(salt_bytes);

                let key = derive_key(password, &Salt::from_bytes(salt), &self.config.kdf_params)
                    .map_err(|e| match e {
                        Error::InvalidInput(msg) => Error::InvalidInput(msg),
                        _ => Error::Decryption("Key derivation failed".to_string()),
                    })?;
                aead::open(&key, sealed)
            }
            None => aead::open(&self.config.key, &raw),
        }
    }

    /// Encrypt a UTF-8 string.
    pub fn encrypt_str(&self, plaintext: &str, password: Option<&str>) -> Result<String> {
        self.encrypt(plaintext.as_bytes(), password.map(str::as_bytes))
    }

    /// Decrypt a payload that is known to hold UTF-8 text.
    pub fn decrypt_to_string(&self, payload: &str, password: Option<&str>) -> Result<String> {
        let plaintext = self.decrypt(payload, password.map(str::as_bytes))?;
        String::from_utf8(plaintext)
            .map_err(|_| Error::Decryption("Plaintext is not valid UTF-8".to_string()))
    }

    /// Generate `length_bytes` of CSPRNG output as hex.
    pub fn generate_secure_token(&self, length_bytes: usize) -> String {
        token::generate_token(length_bytes)
    }

    /// Hash a password for storage.
    pub fn hash_password(&self, password: &str) -> Result<String> {
        password::hash_password(password.as_bytes(), &self.config.password_hash_params)
    }

    /// Verify a password against a stored hash in constant time.
    pub fn verify_password(&self, password: &str, stored_hash: &str) -> Result<bool> {
        password::verify_password(password.as_bytes(), stored_hash)
    }
}
