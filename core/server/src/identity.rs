//! Caller identity established by the upstream authentication layer.

/// Authenticated caller, inserted into request extensions upstream.
///
/// The audit interceptor only reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
}

impl AuthenticatedUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}
