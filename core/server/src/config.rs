//! Server configuration.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables, then validated. Every section has defaults, so an empty file
//! (or no file) is a working development configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use turfguard_audit::AuditConfig;
use turfguard_common::{Environment, Error, Result};
use turfguard_crypto::ENCRYPTION_KEY_ENV;
use turfguard_security::SecurityPolicy;

/// Path of the JSON-lines audit store.
pub const AUDIT_LOG_ENV: &str = "TURFGUARD_AUDIT_LOG";

/// Listen address.
pub const BIND_ENV: &str = "TURFGUARD_BIND";

/// Root configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub environment: Environment,

    /// Listen address, e.g. "0.0.0.0:3000".
    pub bind: SocketAddr,

    /// Hex-encoded 32-byte key for key-mode encryption.
    #[serde(skip_serializing)]
    pub encryption_key: Option<String>,

    /// JSON-lines audit store. Without it audit records only go to the log.
    pub audit_log: Option<PathBuf>,

    pub audit: AuditConfig,

    pub security: SecurityPolicy,

    pub interceptor: InterceptorConfig,

    /// Throttling buckets. Defaults depend on the environment.
    pub rate_limit: Option<RateLimitPolicy>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            encryption_key: None,
            audit_log: None,
            audit: AuditConfig::default(),
            security: SecurityPolicy::default(),
            interceptor: InterceptorConfig::default(),
            rate_limit: None,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("environment", &self.environment)
            .field("bind", &self.bind)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("audit_log", &self.audit_log)
            .field("audit", &self.audit)
            .field("security", &self.security)
            .field("interceptor", &self.interceptor)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

/// Audit interceptor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Largest request body buffered for the security precheck.
    pub max_body_bytes: usize,
    /// Take the client IP from `X-Forwarded-For`. Enable only behind a
    /// proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
            trust_forwarded_for: false,
        }
    }
}

/// One throttling bucket: at most `limit` requests per `ttl_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitBucket {
    pub ttl_secs: u64,
    pub limit: u32,
}

impl RateLimitBucket {
    pub const fn new(ttl_secs: u64, limit: u32) -> Self {
        Self { ttl_secs, limit }
    }
}

/// Named throttling buckets, enforced by the external rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub short: RateLimitBucket,
    pub medium: RateLimitBucket,
    pub long: RateLimitBucket,
    pub auth: RateLimitBucket,
}

impl RateLimitPolicy {
    /// Default buckets. Authentication is relaxed outside production.
    pub fn for_environment(environment: Environment) -> Self {
        let auth = if environment.is_production() {
            RateLimitBucket::new(900, 5)
        } else {
            RateLimitBucket::new(60, 50)
        };
        Self {
            short: RateLimitBucket::new(1, 10),
            medium: RateLimitBucket::new(60, 100),
            long: RateLimitBucket::new(900, 1000),
            auth,
        }
    }

    fn buckets(&self) -> [(&'static str, RateLimitBucket); 4] {
        [
            ("short", self.short),
            ("medium", self.medium),
            ("long", self.long),
            ("auth", self.auth),
        ]
    }
}

impl ServerConfig {
    /// Load from `path` (if any) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without applying overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply `NODE_ENV`, `DATABASE_ENCRYPTION_KEY`, `TURFGUARD_AUDIT_LOG` and
    /// `TURFGUARD_BIND` as returned by `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(env) = var(Environment::ENV_VAR) {
            self.environment = env.parse()?;
        }
        if let Some(key) = var(ENCRYPTION_KEY_ENV) {
            self.encryption_key = Some(key);
        }
        if let Some(path) = var(AUDIT_LOG_ENV) {
            self.audit_log = Some(PathBuf::from(path));
        }
        if let Some(bind) = var(BIND_ENV) {
            self.bind = bind
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("{}: {}", BIND_ENV, e)))?;
        }
        Ok(())
    }

    /// Check value ranges. Reports every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if let Some(key) = &self.encryption_key {
            let key = key.trim();
            if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
                errors.push(format!("{} must be 64 hex characters", ENCRYPTION_KEY_ENV));
            }
        }
        if self.interceptor.max_body_bytes == 0 {
            errors.push("interceptor.max_body_bytes must be greater than 0".to_string());
        }
        if self.audit.top_offending_ips == 0 {
            errors.push("audit.top_offending_ips must be greater than 0".to_string());
        }
        if self.audit.retry_initial_delay_ms > self.audit.retry_max_delay_ms {
            errors.push("audit.retry_initial_delay_ms must not exceed retry_max_delay_ms".to_string());
        }
        if self.audit.queue_capacity == 0 || self.audit.dead_letter_capacity == 0 {
            errors.push("audit.queue_capacity and dead_letter_capacity must be greater than 0".to_string());
        }
        if self.audit.dead_letter_requeue_secs == 0 {
            errors.push("audit.dead_letter_requeue_secs must be greater than 0".to_string());
        }
        for (name, bucket) in self.rate_limit_policy().buckets() {
            if bucket.ttl_secs == 0 || bucket.limit == 0 {
                errors.push(format!("rate_limit.{} needs a positive ttl and limit", name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors))
        }
    }

    /// Configured buckets, or the environment defaults.
    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        self.rate_limit
            .unwrap_or_else(|| RateLimitPolicy::for_environment(self.environment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.rate_limit_policy().auth, RateLimitBucket::new(60, 50));
    }

    #[test]
    fn test_production_auth_bucket() {
        let policy = RateLimitPolicy::for_environment(Environment::Production);
        assert_eq!(policy.auth, RateLimitBucket::new(900, 5));
        assert_eq!(policy.short, RateLimitBucket::new(1, 10));
        assert_eq!(policy.medium, RateLimitBucket::new(60, 100));
        assert_eq!(policy.long, RateLimitBucket::new(900, 1000));
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ServerConfig::from_toml(
            r#"
            environment = "production"
            bind = "0.0.0.0:8080"

            [security]
            block_on_threat = true

            [audit]
            suspicious_activity_threshold = 3
            "#,
        )
        .unwrap();

        assert!(config.environment.is_production());
        assert_eq!(config.bind.port(), 8080);
        assert!(config.security.block_on_threat);
        assert_eq!(config.audit.suspicious_activity_threshold, 3);
        assert_eq!(config.audit.top_offending_ips, 10);
        assert_eq!(config.interceptor, InterceptorConfig::default());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turfguard.toml");
        std::fs::write(&path, "audit_log = \"/var/log/turfguard/audit.jsonl\"\n").unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(
            config.audit_log,
            Some(PathBuf::from("/var/log/turfguard/audit.jsonl"))
        );
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            ServerConfig::from_toml("bind = 42"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let key = "ab".repeat(32);
        let mut config = ServerConfig::default();
        config
            .apply_overrides(lookup(&[
                ("NODE_ENV", "production"),
                ("DATABASE_ENCRYPTION_KEY", key.as_str()),
                ("TURFGUARD_AUDIT_LOG", "audit.jsonl"),
                ("TURFGUARD_BIND", "127.0.0.1:9000"),
            ]))
            .unwrap();

        assert!(config.environment.is_production());
        assert_eq!(config.encryption_key.as_deref(), Some(key.as_str()));
        assert_eq!(config.audit_log, Some(PathBuf::from("audit.jsonl")));
        assert_eq!(config.bind.port(), 9000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_env_values_ignored() {
        let mut config = ServerConfig::default();
        config
            .apply_overrides(lookup(&[("NODE_ENV", "  "), ("TURFGUARD_BIND", "")]))
            .unwrap();
        assert_eq!(config.environment, Environment::Development);
    }

    #[test]
    fn test_bad_overrides() {
        let mut config = ServerConfig::default();
        assert!(config.apply_overrides(lookup(&[("NODE_ENV", "staging")])).is_err());
        assert!(config.apply_overrides(lookup(&[("TURFGUARD_BIND", "nowhere")])).is_err());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = ServerConfig::default();
        config.encryption_key = Some("not-hex".to_string());
        config.interceptor.max_body_bytes = 0;
        config.audit.dead_letter_requeue_secs = 0;
        config.rate_limit = Some(RateLimitPolicy {
            short: RateLimitBucket::new(0, 10),
            ..RateLimitPolicy::for_environment(Environment::Development)
        });

        let Err(Error::Validation(problems)) = config.validate() else {
            panic!("expected a validation error");
        };
        assert_eq!(problems.len(), 4);
        assert!(problems[0].contains(ENCRYPTION_KEY_ENV));
        assert!(problems[1].contains("max_body_bytes"));
        assert!(problems[2].contains("dead_letter_requeue_secs"));
        assert!(problems[3].contains("rate_limit.short"));
    }

    #[test]
    fn test_debug_hides_encryption_key() {
        let key = "cd".repeat(32);
        let config = ServerConfig {
            encryption_key: Some(key.clone()),
            ..ServerConfig::default()
        };

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains(&key));
        assert!(rendered.contains("[REDACTED]"));
        assert!(rendered.contains("max_body_bytes"));
    }

    #[test]
    fn test_forwarded_for_is_opt_in() {
        assert!(!InterceptorConfig::default().trust_forwarded_for);

        let config = ServerConfig::from_toml(
            r#"
            [interceptor]
            trust_forwarded_for = true
            "#,
        )
        .unwrap();
        assert!(config.interceptor.trust_forwarded_for);
        assert_eq!(config.interceptor.max_body_bytes, 1024 * 1024);
    }
}
