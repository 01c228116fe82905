//! HTTP boundary for TurfGuard.
//!
//! This module provides:
//! - The audit interceptor, an axum middleware that prechecks, times and
//!   audits every request
//! - A response layer applying the security header policy
//! - The `/security/*` endpoints
//! - `ServerConfig`, loaded from TOML and the environment
//!
//! Domain routes (horses, jockeys, races) are supplied by the caller and
//! wrapped by the same middleware stack.

pub mod config;
pub mod error;
pub mod headers;
pub mod identity;
pub mod interceptor;
pub mod routes;
pub mod state;

pub use config::{InterceptorConfig, RateLimitBucket, RateLimitPolicy, ServerConfig};
pub use error::ApiError;
pub use identity::AuthenticatedUser;
pub use interceptor::{audit_interceptor, get_audit_type, should_audit};
pub use state::AppState;

use axum::middleware::from_fn_with_state;
use axum::Router;
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use turfguard_common::Result;

/// Build the application router.
///
/// Layers, outermost first: request tracing, security headers, audit
/// interceptor, then `api` and the `/security` routes.
pub fn build_router(state: AppState, api: Router<AppState>) -> Router {
    Router::new()
        .nest("/security", routes::security_routes())
        .merge(api)
        .layer(from_fn_with_state(state.clone(), interceptor::audit_interceptor))
        .layer(from_fn_with_state(state.clone(), headers::apply_security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl+C, then drain the audit queue.
pub async fn run(config: ServerConfig, api: Router<AppState>) -> Result<()> {
    let bind = config.bind;
    let environment = config.environment;
    let (state, worker) = AppState::from_config(config)?;
    let audit = state.audit.clone();

    let listener = TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;
    info!(address = %addr, environment = %environment, "TurfGuard server starting");
    audit.log_system_event(
        "SERVER_START",
        false,
        json!({ "address": addr.to_string(), "environment": environment.as_str() }),
    );

    let app = build_router(state, api).into_make_service_with_connect_info::<SocketAddr>();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    match &served {
        Ok(()) => {
            audit.log_system_event("SERVER_STOP", false, json!({}));
        }
        Err(e) => {
            error!(error = %e, "Server stopped with an error");
            audit.log_system_event("SERVER_STOP", true, json!({ "error": e.to_string() }));
        }
    }

    audit.flush().await;
    let stats = audit.dispatch_stats();
    info!(
        delivered = stats.delivered,
        dead_lettered = stats.dead_lettered,
        "TurfGuard server stopped"
    );

    drop(audit);
    worker.abort();
    served.map_err(Into::into)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
