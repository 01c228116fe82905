//! Per-request audit middleware.
//!
//! # Request flow
//! ```text
//! capture method, path, IP, user agent, user
//!     → security precheck (advisory unless block_on_threat)
//!     → handler (spawned task, panics captured)
//!     → success: audit if should_audit
//!       error (status >= 400 or panic): always audit
//!     → original response, or the panic resumed
//! ```
//!
//! The handler and the audit step share a spawned task, so a client that
//! disconnects mid-request does not cancel its audit event.

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::{stream, FutureExt, StreamExt};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::error::ApiError;
use crate::identity::AuthenticatedUser;
use crate::state::AppState;
use turfguard_audit::{AuditEventType, EventContext, NewAuditEvent, Severity};

/// Path prefixes audited even for read-only methods.
pub const SENSITIVE_PREFIXES: &[&str] = &["/api/auth", "/api/admin", "/api/security", "/api/users"];

/// Whether a successful request is audited.
pub fn should_audit(method: &Method, path: &str) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    ) || SENSITIVE_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

/// Audit event type for a request path.
pub fn get_audit_type(path: &str) -> AuditEventType {
    if path.contains("/auth") {
        AuditEventType::Auth
    } else if path.contains("/security") {
        AuditEventType::Security
    } else if path.contains("/api") {
        AuditEventType::Data
    } else {
        AuditEventType::System
    }
}

/// Client address: the socket peer, or the first `X-Forwarded-For` hop
/// when `trust_forwarded_for` is set.
pub fn client_ip(req: &Request, trust_forwarded_for: bool) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .filter(|_| trust_forwarded_for)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

struct RequestMeta {
    method: Method,
    path: String,
    ctx: EventContext,
}

/// Audit middleware. Install with `axum::middleware::from_fn_with_state`.
pub async fn audit_interceptor(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let start = Instant::now();

    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let mut ctx = EventContext::new()
        .ip_address(client_ip(&req, state.config.interceptor.trust_forwarded_for))
        .user_agent(user_agent);
    if let Some(user) = req.extensions().get::<AuthenticatedUser>() {
        ctx = ctx.user_id(user.id.clone());
    }
    let meta = RequestMeta {
        method: req.method().clone(),
        path: req.uri().path().to_string(),
        ctx,
    };

    let task = tokio::spawn(async move {
        let outcome = match precheck(&state, req, &meta).await {
            Ok(req) => AssertUnwindSafe(next.run(req)).catch_unwind().await,
            Err(rejection) => Ok(rejection),
        };

        match outcome {
            Ok(response) => {
                record(&state, &meta, response.status(), start.elapsed(), None);
                Ok(response)
            }
            Err(panic) => {
                record(
                    &state,
                    &meta,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    start.elapsed(),
                    Some(panic_message(panic.as_ref())),
                );
                Err(panic)
            }
        }
    });

    match task.await {
        Ok(Ok(response)) => response,
        Ok(Err(panic)) => std::panic::resume_unwind(panic),
        Err(join_error) if join_error.is_panic() => std::panic::resume_unwind(join_error.into_panic()),
        Err(join_error) => {
            error!(error = %join_error, "Request task cancelled");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Run the security precheck.
///
/// Returns the request, rebuilt with its buffered body, or the response to
/// send instead of calling the handler.
async fn precheck(state: &AppState, req: Request, meta: &RequestMeta) -> Result<Request, Response> {
    let (parts, body) = req.into_parts();
    let mut payload = Map::new();

    if let Some(query) = parts.uri.query().filter(|q| !q.is_empty()) {
        payload.insert("query".to_string(), decode_pairs(query.as_bytes()));
    }

    let limit = state.config.interceptor.max_body_bytes;
    let declared_len = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    let body = if declared_len.is_some_and(|len| len > limit) {
        debug!(path = %meta.path, limit, "Body exceeds precheck limit; not scanned");
        body
    } else {
        match buffer_body(body, limit).await {
            Buffered::Complete(bytes) => {
                if let Some(value) = body_value(&parts.headers, &bytes) {
                    payload.insert("body".to_string(), value);
                }
                Body::from(bytes)
            }
            Buffered::Passthrough(body) => {
                debug!(path = %meta.path, limit, "Streamed body exceeds precheck limit; not scanned");
                body
            }
        }
    };

    let req = Request::from_parts(parts, body);
    if payload.is_empty() {
        return Ok(req);
    }

    let result = state
        .security
        .validate_request_with_context(&Value::Object(payload), &meta.ctx);
    if result.is_valid {
        return Ok(req);
    }

    warn!(
        method = %meta.method,
        path = %meta.path,
        threats = ?result.threats,
        "Security precheck flagged request"
    );

    if state.security.policy().block_on_threat {
        if let Some(err) = result.to_error() {
            return Err(ApiError::from(err).into_response());
        }
    }

    Ok(req)
}

enum Buffered {
    Complete(Bytes),
    /// The body as received, with the bytes already read replayed first.
    Passthrough(Body),
}

/// Read at most `limit` bytes of `body`.
///
/// A body that runs past the limit, or fails mid-read, is handed on
/// unscanned so the handler sees exactly what the client sent.
async fn buffer_body(body: Body, limit: usize) -> Buffered {
    let mut rest = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total = 0usize;

    while let Some(next) = rest.next().await {
        match next {
            Ok(chunk) => {
                total += chunk.len();
                chunks.push(chunk);
                if total > limit {
                    let read = stream::iter(chunks.into_iter().map(Ok));
                    return Buffered::Passthrough(Body::from_stream(read.chain(rest)));
                }
            }
            Err(e) => {
                warn!(error = %e, "Request body failed while buffering");
                let read = stream::iter(chunks.into_iter().map(Ok));
                return Buffered::Passthrough(Body::from_stream(
                    read.chain(stream::once(async move { Err(e) })),
                ));
            }
        }
    }

    Buffered::Complete(match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.swap_remove(0),
        _ => Bytes::from(chunks.concat()),
    })
}

/// Interpret a buffered body for scanning. Binary bodies are skipped.
fn body_value(headers: &axum::http::HeaderMap, bytes: &Bytes) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.starts_with("application/x-www-form-urlencoded") {
        return Some(decode_pairs(bytes));
    }
    if content_type.contains("json") {
        if let Ok(value) = serde_json::from_slice(bytes) {
            return Some(value);
        }
    }
    std::str::from_utf8(bytes)
        .ok()
        .map(|text| Value::String(text.to_string()))
}

/// Decode `a=1&b=2` into a JSON object. Repeated keys keep the last value.
fn decode_pairs(input: &[u8]) -> Value {
    let map: Map<String, Value> = url::form_urlencoded::parse(input)
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect();
    Value::Object(map)
}

fn record(
    state: &AppState,
    meta: &RequestMeta,
    status: StatusCode,
    duration: Duration,
    panic: Option<String>,
) {
    let duration_ms = duration.as_millis() as u64;
    let failed = panic.is_some() || status.is_client_error() || status.is_server_error();

    if !failed && !should_audit(&meta.method, &meta.path) {
        return;
    }

    let severity = if !failed {
        Severity::Low
    } else if status.is_server_error() {
        Severity::High
    } else {
        Severity::Medium
    };

    let mut details = json!({
        "method": meta.method.as_str(),
        "statusCode": status.as_u16(),
        "durationMs": duration_ms,
        "success": !failed,
    });
    if let Some(message) = &panic {
        details["error"] = Value::String(message.clone());
    }

    if failed && status.is_server_error() {
        error!(
            method = %meta.method,
            path = %meta.path,
            status = status.as_u16(),
            duration_ms,
            panic = panic.as_deref().unwrap_or("-"),
            "Request failed"
        );
    } else if failed {
        warn!(
            method = %meta.method,
            path = %meta.path,
            status = status.as_u16(),
            duration_ms,
            "Request failed"
        );
    }

    state.audit.log_event(
        NewAuditEvent::new(
            get_audit_type(&meta.path),
            format!("{} {}", meta.method, meta.path),
            severity,
        )
        .context(&meta.ctx)
        .resource(meta.path.clone())
        .details(details),
    );
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::state::test_support;
    use axum::http::Request as HttpRequest;
    use axum::middleware::from_fn_with_state;
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;
    use turfguard_audit::{AuditEvent, MemoryStore};

    fn app(config: ServerConfig) -> (Router, AppState, MemoryStore) {
        let (state, store) = test_support::state(config);
        let router = Router::new()
            .route(
                "/api/horses",
                post(|| async { (StatusCode::CREATED, "created") }).get(|| async { "[]" }),
            )
            .route(
                "/api/horses/{id}",
                post(|| async { StatusCode::UNPROCESSABLE_ENTITY }),
            )
            .route("/api/admin/stats", get(|| async { "{}" }))
            .route(
                "/api/races",
                post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .route(
                "/api/panic",
                post(|| async {
                    if true {
                        panic!("stable door left open");
                    }
                    "unreachable"
                }),
            )
            .fallback(|| async { StatusCode::NOT_FOUND })
            .layer(from_fn_with_state(state.clone(), audit_interceptor))
            .with_state(state.clone());
        (router, state, store)
    }

    async fn send(router: Router, req: Request) -> Response {
        router.oneshot(req).await.unwrap()
    }

    async fn events(state: &AppState, store: &MemoryStore) -> Vec<AuditEvent> {
        state.audit.flush().await;
        store.events()
    }

    fn request(method: &str, uri: &str) -> Request {
        HttpRequest::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_should_audit() {
        assert!(should_audit(&Method::POST, "/api/horses"));
        assert!(should_audit(&Method::DELETE, "/api/horses/3"));
        assert!(should_audit(&Method::GET, "/api/admin/stats"));
        assert!(should_audit(&Method::GET, "/api/users/me"));
        assert!(!should_audit(&Method::GET, "/api/horses"));
        assert!(!should_audit(&Method::GET, "/security/headers"));
    }

    #[test]
    fn test_get_audit_type() {
        assert_eq!(get_audit_type("/api/auth/login"), AuditEventType::Auth);
        assert_eq!(get_audit_type("/api/security/keys"), AuditEventType::Security);
        assert_eq!(get_audit_type("/api/horses"), AuditEventType::Data);
        assert_eq!(get_audit_type("/health"), AuditEventType::System);
    }

    fn echo_app(config: ServerConfig) -> (Router, AppState, MemoryStore) {
        let (state, store) = test_support::state(config);
        let router = Router::new()
            .route("/api/echo", post(|body: String| async move { body }))
            .route(
                "/api/slow",
                post(|| async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    StatusCode::CREATED
                }),
            )
            .layer(from_fn_with_state(state.clone(), audit_interceptor))
            .with_state(state.clone());
        (router, state, store)
    }

    fn trusting_proxy() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.interceptor.trust_forwarded_for = true;
        config
    }

    #[test]
    fn test_client_ip() {
        let mut req = HttpRequest::builder()
            .header("x-forwarded-for", " 198.51.100.4 , 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req, true), "198.51.100.4");
        assert_eq!(client_ip(&req, false), "unknown");

        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 9], 4000))));
        assert_eq!(client_ip(&req, false), "192.0.2.9");
        assert_eq!(client_ip(&req, true), "198.51.100.4");

        let mut req = request("GET", "/");
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 9], 4000))));
        assert_eq!(client_ip(&req, true), "192.0.2.9");

        assert_eq!(client_ip(&request("GET", "/"), true), "unknown");
    }

    #[tokio::test]
    async fn test_forwarded_for_ignored_by_default() {
        let (router, state, store) = app(ServerConfig::default());
        let mut req = HttpRequest::builder()
            .method("POST")
            .uri("/api/horses")
            .header("x-forwarded-for", "203.0.113.10")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 9], 4000))));
        send(router, req).await;

        let events = events(&state, &store).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ip_address(), Some("192.0.2.9"));
    }

    #[tokio::test]
    async fn test_post_success_audited_once() {
        let (router, state, store) = app(trusting_proxy());
        let mut req = HttpRequest::builder()
            .method("POST")
            .uri("/api/horses")
            .header("content-type", "application/json")
            .header("user-agent", "paddock/1.0")
            .header("x-forwarded-for", "203.0.113.10")
            .body(Body::from(r#"{"name":"Desert Orchid"}"#))
            .unwrap();
        req.extensions_mut().insert(AuthenticatedUser::new("steward-7"));

        let response = send(router, req).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let events = events(&state, &store).await;
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type(), AuditEventType::Data);
        assert_eq!(event.action(), "POST /api/horses");
        assert_eq!(event.severity(), Severity::Low);
        assert_eq!(event.user_id(), Some("steward-7"));
        assert_eq!(event.ip_address(), Some("203.0.113.10"));
        assert_eq!(event.user_agent(), Some("paddock/1.0"));
        assert_eq!(event.detail_flag("success"), Some(true));
        assert_eq!(event.details()["statusCode"], 201);
    }

    #[tokio::test]
    async fn test_post_error_audited_once() {
        let (router, state, store) = app(ServerConfig::default());
        let response = send(router, request("POST", "/api/horses/9")).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let events = events(&state, &store).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity(), Severity::Medium);
        assert_eq!(events[0].detail_flag("success"), Some(false));
    }

    #[tokio::test]
    async fn test_server_error_is_high() {
        let (router, state, store) = app(ServerConfig::default());
        let response = send(router, request("POST", "/api/races")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let events = events(&state, &store).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity(), Severity::High);
    }

    #[tokio::test]
    async fn test_get_not_audited() {
        let (router, state, store) = app(ServerConfig::default());
        let response = send(router, request("GET", "/api/horses")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(events(&state, &store).await.is_empty());
    }

    #[tokio::test]
    async fn test_sensitive_prefix_audited() {
        let (router, state, store) = app(ServerConfig::default());
        send(router, request("GET", "/api/admin/stats")).await;

        let events = events(&state, &store).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), AuditEventType::Data);
    }

    #[tokio::test]
    async fn test_unmatched_route_audited_as_error() {
        let (router, state, store) = app(ServerConfig::default());
        let response = send(router, request("GET", "/api/stables")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let events = events(&state, &store).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity(), Severity::Medium);
    }

    #[tokio::test]
    async fn test_precheck_is_advisory_by_default() {
        let (router, state, store) = app(ServerConfig::default());
        let req = HttpRequest::builder()
            .method("POST")
            .uri("/api/horses?sort=name")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name":"<script>alert(1)</script>"}"#))
            .unwrap();

        let response = send(router, req).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let events = events(&state, &store).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), AuditEventType::Security);
        assert_eq!(events[0].severity(), Severity::Critical);
        assert_eq!(events[0].details()["field"], "body.name");
        assert_eq!(events[1].action(), "POST /api/horses");
    }

    #[tokio::test]
    async fn test_precheck_scans_query_and_forms() {
        let (router, state, store) = app(ServerConfig::default());
        let req = HttpRequest::builder()
            .method("POST")
            .uri("/api/horses?id=1%20OR%201%3D1")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("notes=javascript%3Aalert(1)"))
            .unwrap();
        send(router, req).await;

        let fields: Vec<String> = events(&state, &store)
            .await
            .iter()
            .filter(|e| e.event_type() == AuditEventType::Security)
            .map(|e| e.details()["field"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(fields, vec!["body.notes".to_string(), "query.id".to_string()]);
    }

    #[tokio::test]
    async fn test_blocking_policy_rejects() {
        let mut config = ServerConfig::default();
        config.security.block_on_threat = true;
        let (router, state, store) = app(config);

        let req = HttpRequest::builder()
            .method("POST")
            .uri("/api/horses")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name":"1 OR 1=1"}"#))
            .unwrap();
        let response = send(router, req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body["error"],
            "Security threat detected: SQL_INJECTION in body.name"
        );

        let events = events(&state, &store).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].severity(), Severity::High);
        assert_eq!(events[0].detail_flag("blocked"), Some(true));
        assert_eq!(events[1].severity(), Severity::Medium);
    }

    #[tokio::test]
    async fn test_handler_body_preserved() {
        let (router, _state, _store) = echo_app(ServerConfig::default());

        let req = HttpRequest::builder()
            .method("POST")
            .uri("/api/echo")
            .body(Body::from("Arkle"))
            .unwrap();
        let response = send(router, req).await;
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"Arkle");
    }

    #[tokio::test]
    async fn test_oversized_streamed_body_reaches_handler() {
        let mut config = ServerConfig::default();
        config.interceptor.max_body_bytes = 16;
        let (router, state, store) = echo_app(config);

        // No content-length, so the size is only discovered while reading.
        let chunks = ["Red Rum ", "won the ", "Grand National ", "three times"];
        let body = Body::from_stream(futures::stream::iter(
            chunks.map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c.as_bytes()))),
        ));
        let req = HttpRequest::builder()
            .method("POST")
            .uri("/api/echo")
            .body(body)
            .unwrap();

        let response = send(router, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"Red Rum won the Grand National three times");

        let events = events(&state, &store).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].detail_flag("success"), Some(true));
    }

    #[tokio::test]
    async fn test_client_disconnect_still_audited() {
        let (router, state, store) = echo_app(ServerConfig::default());

        // Dropping the response future is what a vanished client looks like.
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            router.oneshot(request("POST", "/api/slow")),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        let events = events(&state, &store).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action(), "POST /api/slow");
        assert_eq!(events[0].details()["statusCode"], 201);
    }

    #[tokio::test]
    async fn test_panic_is_audited_and_resumed() {
        let (router, state, store) = app(ServerConfig::default());
        let outcome = tokio::spawn(send(router, request("POST", "/api/panic"))).await;
        assert!(outcome.unwrap_err().is_panic());

        let events = events(&state, &store).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity(), Severity::High);
        assert_eq!(events[0].details()["statusCode"], 500);
        assert_eq!(events[0].details()["error"], "stable door left open");
    }
}
