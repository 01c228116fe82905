//! Cryptographic primitives for TurfGuard.
//!
//! This module provides:
//! - Key derivation using Argon2id
//! - Authenticated encryption using ChaCha20-Poly1305
//! - Argon2id password hashing in PHC string format
//! - Secure random tokens
//! - The `EncryptionService` facade that ties them to the payload wire format
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Decryption fails closed: a payload that does not authenticate yields an
//!   error and never any plaintext

pub mod aead;
pub mod kdf;
pub mod keys;
pub mod password;
pub mod service;
pub mod token;

pub use aead::{open, seal, IV_SIZE, TAG_SIZE};
pub use kdf::{derive_key, KdfParams};
pub use keys::{EncryptionKey, Salt, KEY_LENGTH, SALT_LENGTH};
pub use password::{hash_password, verify_password};
pub use service::{EncryptionConfig, EncryptionService, ENCRYPTION_KEY_ENV};
pub use token::generate_token;
