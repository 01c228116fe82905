//! TurfGuard CLI - security and audit layer for the racing-club application.
//!
//! Runs the HTTP server and exposes the encryption, password and policy
//! operations for offline use.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turfguard_audit::{AuditConfig, AuditService, JsonlStore};
use turfguard_common::{Environment, SensitiveBytes};
use turfguard_crypto::{EncryptionConfig, EncryptionService};
use turfguard_security::{security_headers, validate_strong_password, TokenPurpose};
use turfguard_server::ServerConfig;

const DEFAULT_LOG_FILTER: &str = "turfguard=info,tower_http=info";

#[derive(Parser)]
#[command(name = "turfguard")]
#[command(about = "TurfGuard - security and audit layer")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server.
    Serve {
        /// TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Encrypt text with the configured key, or a prompted password.
    Encrypt {
        text: String,

        /// Derive the key from a password instead.
        #[arg(short, long)]
        password: bool,
    },

    /// Decrypt a payload produced by `encrypt` in the same mode.
    Decrypt {
        payload: String,

        /// The payload was produced in password mode.
        #[arg(short, long)]
        password: bool,
    },

    /// Hash a password for storage.
    HashPassword,

    /// Check a password against a stored hash.
    VerifyPassword {
        /// Stored Argon2id hash.
        #[arg(long)]
        hash: String,
    },

    /// Generate a random token.
    Token {
        /// session, csrf, api or password_reset.
        #[arg(short, long, default_value = "session")]
        purpose: TokenPurpose,
    },

    /// Check a password against the strength policy.
    CheckPassword,

    /// Print the security headers for an environment.
    Headers {
        /// development, test or production. Defaults to NODE_ENV.
        #[arg(short, long)]
        environment: Option<Environment>,
    },

    /// Summarise a JSON-lines audit log.
    Report {
        /// Audit log written by the server.
        #[arg(short, long)]
        audit_log: PathBuf,

        /// Window length, ending now.
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("turfguard=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();

    match cli.command {
        Commands::Serve { config } => cmd_serve(config).await,
        Commands::Encrypt { text, password } => cmd_encrypt(&text, password),
        Commands::Decrypt { payload, password } => cmd_decrypt(&payload, password),
        Commands::HashPassword => cmd_hash_password(),
        Commands::VerifyPassword { hash } => cmd_verify_password(&hash),
        Commands::Token { purpose } => cmd_token(purpose),
        Commands::CheckPassword => cmd_check_password(),
        Commands::Headers { environment } => cmd_headers(environment),
        Commands::Report { audit_log, hours } => cmd_report(audit_log, hours).await,
    }
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<SensitiveBytes> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(SensitiveBytes::from(password))
}

fn as_text(password: &SensitiveBytes) -> Result<&str> {
    std::str::from_utf8(password.as_bytes()).context("Password is not valid UTF-8")
}

fn encryption_service() -> Result<EncryptionService> {
    let config = EncryptionConfig::from_env(Environment::from_env())
        .context("Failed to load encryption key")?;
    Ok(EncryptionService::new(config))
}

async fn cmd_serve(config_path: Option<PathBuf>) -> Result<()> {
    let config = ServerConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    info!(bind = %config.bind, environment = %config.environment, "Configuration loaded");

    turfguard_server::run(config, axum::Router::new())
        .await
        .context("Server failed")
}

fn cmd_encrypt(text: &str, password_mode: bool) -> Result<()> {
    let service = encryption_service()?;
    let payload = if password_mode {
        let password = prompt_password("Enter password: ")?;
        let confirm = prompt_password("Confirm password: ")?;
        if password.as_bytes() != confirm.as_bytes() {
            anyhow::bail!("Passwords do not match");
        }
        service.encrypt(text.as_bytes(), Some(password.as_bytes()))
    } else {
        service.encrypt(text.as_bytes(), None)
    }
    .context("Encryption failed")?;

    println!("{}", payload);
    Ok(())
}

fn cmd_decrypt(payload: &str, password_mode: bool) -> Result<()> {
    let service = encryption_service()?;
    let plaintext = if password_mode {
        let password = prompt_password("Enter password: ")?;
        service.decrypt(payload, Some(password.as_bytes()))
    } else {
        service.decrypt(payload, None)
    }
    .context("Decryption failed")?;

    let plaintext = SensitiveBytes::new(plaintext);
    println!("{}", String::from_utf8_lossy(plaintext.as_bytes()));
    Ok(())
}

fn cmd_hash_password() -> Result<()> {
    let password = prompt_password("Enter password: ")?;
    let confirm = prompt_password("Confirm password: ")?;
    if password.as_bytes() != confirm.as_bytes() {
        anyhow::bail!("Passwords do not match");
    }
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    let hash = encryption_service()?
        .hash_password(as_text(&password)?)
        .context("Failed to hash password")?;
    println!("{}", hash);
    Ok(())
}

fn cmd_verify_password(hash: &str) -> Result<()> {
    let password = prompt_password("Enter password: ")?;
    let matches = encryption_service()?
        .verify_password(as_text(&password)?, hash)
        .context("Failed to verify password")?;

    if matches {
        println!("Password matches.");
        Ok(())
    } else {
        anyhow::bail!("Password does not match")
    }
}

fn cmd_token(purpose: TokenPurpose) -> Result<()> {
    let token = encryption_service()?.generate_secure_token(purpose.byte_length());
    println!("{}", token);
    Ok(())
}

fn cmd_check_password() -> Result<()> {
    let password = prompt_password("Password to check: ")?;
    let result = validate_strong_password(as_text(&password)?);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn cmd_headers(environment: Option<Environment>) -> Result<()> {
    let environment = environment.unwrap_or_else(Environment::from_env);
    for (name, value) in security_headers(environment) {
        println!("{}: {}", name, value);
    }
    Ok(())
}

async fn cmd_report(audit_log: PathBuf, hours: i64) -> Result<()> {
    if !audit_log.exists() {
        anyhow::bail!("Audit log not found: {}", audit_log.display());
    }

    let (audit, _worker) =
        AuditService::with_store(AuditConfig::default(), Arc::new(JsonlStore::new(&audit_log)));
    let end = Utc::now();
    let report = audit
        .generate_security_report(end - Duration::hours(hours), end)
        .await
        .context("Failed to read audit log")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
