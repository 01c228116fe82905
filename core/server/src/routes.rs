//! `/security/*` endpoints.
//!
//! Policy checks always answer 200 with a validity flag; only malformed
//! requests and internal faults produce error statuses.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::ApiError;
use crate::state::AppState;
use turfguard_audit::SecurityReport;
use turfguard_common::Error;
use turfguard_security::{sanitize_value, PasswordValidation};

/// Default report window when `start` is omitted.
const DEFAULT_REPORT_HOURS: i64 = 24;

pub fn security_routes() -> Router<AppState> {
    Router::new()
        .route("/headers", get(headers))
        .route("/validate-password", post(validate_password))
        .route("/sanitize", post(sanitize))
        .route("/health", get(health))
        .route("/report", get(report))
}

async fn headers(State(state): State<AppState>) -> Json<BTreeMap<&'static str, String>> {
    Json(state.security.get_security_headers())
}

async fn validate_password(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Json<PasswordValidation> {
    let password = body.get("password").and_then(Value::as_str).unwrap_or("");
    Json(state.security.validate_strong_password(password))
}

async fn sanitize(Json(body): Json<Value>) -> Json<Value> {
    let input = body.get("input").unwrap_or(&Value::Null);
    Json(json!({ "sanitized": sanitize_value(input) }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let audit = &state.audit;
    let degraded = audit.is_degraded();
    let status = if degraded { "degraded" } else { "healthy" };
    let audit_status = if degraded { "degraded" } else { "active" };

    audit.log_system_event("HEALTH_CHECK", false, json!({ "status": status }));

    Json(json!({
        "status": status,
        "timestamp": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
        "encryption": {
            "status": "enabled",
            "cipher": "ChaCha20-Poly1305",
            "kdf": "Argon2id",
        },
        "audit": {
            "status": audit_status,
            "store": audit.store_name(),
            "stats": audit.dispatch_stats(),
        },
        "rateLimit": state.config.rate_limit_policy(),
    }))
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

async fn report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<SecurityReport>, ApiError> {
    let end = query.end.unwrap_or_else(Utc::now);
    let start = query
        .start
        .unwrap_or_else(|| end - Duration::hours(DEFAULT_REPORT_HOURS));
    if start > end {
        return Err(Error::InvalidInput("start must not be after end".to_string()).into());
    }

    Ok(Json(state.audit.generate_security_report(start, end).await?))
}
