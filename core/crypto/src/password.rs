//! Password hashing with Argon2id.
//!
//! Hashes are PHC strings (`$argon2id$v=19$m=...`), so the parameters travel
//! with the hash and old hashes keep verifying after the defaults change.

use argon2::password_hash::{
    Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};

use crate::kdf::KdfParams;
use turfguard_common::{Error, Result};

/// Hash a password for storage.
///
/// # Errors
/// - Returns `InvalidInput` if the password is empty
/// - Returns `Config` if `params` are not valid Argon2id parameters
pub fn hash_password(password: &[u8], params: &KdfParams) -> Result<String> {
    use rand::RngCore;

    if password.is_empty() {
        return Err(Error::InvalidInput("Password cannot be empty".to_string()));
    }

    let mut salt_bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| Error::Encryption(format!("Salt encoding failed: {}", e)))?;

    let argon2 = params.argon2(None)?;
    let hash = argon2
        .hash_password(password, &salt)
        .map_err(|e| Error::Encryption(format!("Password hashing failed: {}", e)))?;

    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash.
///
/// The digest comparison inside `password-hash` is constant-time.
///
/// # Returns
/// - `Ok(true)` if the password matches
/// - `Ok(false)` if it does not
///
/// # Errors
/// - Returns `InvalidInput` if `stored` is not a parseable hash
pub fn verify_password(password: &[u8], stored: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| Error::InvalidInput(format!("Malformed password hash: {}", e)))?;

    match argon2::Argon2::default().verify_password(password, &parsed) {
        Ok(()) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(e) => Err(Error::InvalidInput(format!(
            "Password hash could not be verified: {}",
            e
        ))),
    }
}
