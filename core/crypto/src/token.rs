//! Random tokens for sessions, CSRF and password resets.

use rand::RngCore;

/// Generate `length` random bytes from the OS CSPRNG, hex-encoded.
///
/// The returned string is `2 * length` lowercase hex characters.
pub fn generate_token(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_length_is_twice_byte_count() {
        assert_eq!(generate_token(32).len(), 64);
        assert_eq!(generate_token(48).len(), 96);
        assert!(generate_token(0).is_empty());
    }

    #[test]
    fn test_token_is_lowercase_hex() {
        let token = generate_token(16);
        assert!(token.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_tokens_differ() {
        assert_ne!(generate_token(32), generate_token(32));
    }
}
