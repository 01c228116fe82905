//! CSRF token comparison.

use subtle::ConstantTimeEq;

/// Shortest token accepted, in characters.
pub const MIN_CSRF_TOKEN_LENGTH: usize = 32;

/// Check a submitted CSRF token against the one bound to the session.
///
/// The comparison runs in constant time for equal-length inputs, so the
/// position of the first differing byte is not observable. A length
/// mismatch returns early, which only reveals the length.
pub fn validate_csrf_token(token: &str, session_token: &str) -> bool {
    if token.len() < MIN_CSRF_TOKEN_LENGTH || token.len() != session_token.len() {
        return false;
    }
    token.as_bytes().ct_eq(session_token.as_bytes()).into()
}
