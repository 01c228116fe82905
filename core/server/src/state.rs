//! Shared application state.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ServerConfig;
use turfguard_audit::{AuditService, JsonlStore};
use turfguard_common::{Error, Result};
use turfguard_crypto::{EncryptionConfig, EncryptionService};
use turfguard_security::SecurityService;

/// State injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub security: Arc<SecurityService>,
    pub audit: Arc<AuditService>,
    headers: Arc<HeaderMap>,
}

impl AppState {
    /// Assemble state from already-built services.
    ///
    /// # Errors
    /// - `Config` if a security header is not a valid HTTP header
    pub fn new(
        config: ServerConfig,
        security: Arc<SecurityService>,
        audit: Arc<AuditService>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in security.get_security_headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Config(format!("Invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e)))?;
            headers.insert(name, value);
        }

        Ok(Self {
            config: Arc::new(config),
            security,
            audit,
            headers: Arc::new(headers),
        })
    }

    /// Build every service from configuration.
    ///
    /// Returns the audit worker handle alongside the state. Must run inside
    /// a Tokio runtime.
    pub fn from_config(config: ServerConfig) -> Result<(Self, JoinHandle<()>)> {
        let encryption =
            EncryptionConfig::resolve(config.encryption_key.as_deref(), config.environment)?;

        let (audit, worker) = match &config.audit_log {
            Some(path) => {
                info!(path = %path.display(), "Persisting audit events to JSON-lines store");
                AuditService::with_store(config.audit.clone(), Arc::new(JsonlStore::new(path)))
            }
            None => AuditService::log_only(config.audit.clone()),
        };
        let audit = Arc::new(audit);

        let security = Arc::new(SecurityService::new(
            config.environment,
            config.security.clone(),
            Arc::new(EncryptionService::new(encryption)),
            audit.clone(),
        ));

        Ok((Self::new(config, security, audit)?, worker))
    }

    /// Security headers added to every response.
    pub fn security_headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use turfguard_audit::{AuditConfig, MemoryStore};
    use turfguard_crypto::{EncryptionKey, KdfParams};

    /// State over an in-memory audit store with cheap KDF settings.
    pub(crate) fn state(config: ServerConfig) -> (AppState, MemoryStore) {
        let store = MemoryStore::new();
        let (audit, _worker) =
            AuditService::with_store(AuditConfig::default(), Arc::new(store.clone()));
        let audit = Arc::new(audit);

        let encryption = EncryptionService::new(
            EncryptionConfig::new(EncryptionKey::generate())
                .with_kdf_params(KdfParams::new(1024, 1, 1))
                .with_password_hash_params(KdfParams::new(1024, 1, 1)),
        );
        let security = Arc::new(SecurityService::new(
            config.environment,
            config.security.clone(),
            Arc::new(encryption),
            audit.clone(),
        ));

        let state = AppState::new(config, security, audit).expect("static headers are valid");
        (state, store)
    }
}
