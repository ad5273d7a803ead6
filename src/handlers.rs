// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the push gateway.
//!
//! Every `/api` route sits behind a per-caller rate limit; scan ingestion
//! has its own, looser policy. Handlers are thin: they validate the JSON
//! shape and hand off to the registry, dispatcher or scan router.

use crate::config::{Config, RatePolicy};
use crate::dispatcher::Dispatcher;
use crate::error::{NotifyError, Result};
use crate::limiter::{RateLimitResult, RateLimiter};
use crate::metrics::Metrics;
use crate::models::{DispatchTarget, Metadata, NotificationBody, RegisterMode};
use crate::registry::TokenRegistry;
use crate::scan::ScanRouter;
use crate::store::DocumentStore;
use crate::transport::DeliveryTransport;
use axum::{
    extract::{ConnectInfo, Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Shared application state.
pub struct AppState {
    pub registry: TokenRegistry,
    pub dispatcher: Arc<Dispatcher>,
    pub scans: ScanRouter,
    pub limiter: RateLimiter,
    pub metrics: Option<Arc<Metrics>>,
    pub config: Config,
}

impl AppState {
    /// Wire the registry, dispatcher and scan router over the given store
    /// and transport.
    pub fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        transport: Arc<dyn DeliveryTransport>,
    ) -> anyhow::Result<Self> {
        let metrics = if config.metrics.enabled {
            Some(Arc::new(Metrics::new()?))
        } else {
            None
        };

        let registry = TokenRegistry::new(store);
        let mut dispatcher = Dispatcher::new(registry.clone(), transport)
            .with_concurrency(config.dispatch.concurrency);
        if let Some(metrics) = &metrics {
            dispatcher = dispatcher.with_metrics(metrics.clone());
        }
        let dispatcher = Arc::new(dispatcher);

        let mut scans = ScanRouter::new(registry.clone(), dispatcher.clone());
        if let Some(metrics) = &metrics {
            scans = scans.with_metrics(metrics.clone());
        }

        Ok(Self {
            registry,
            dispatcher,
            scans,
            limiter: RateLimiter::new(),
            metrics,
            config,
        })
    }

    /// Replace the rate limiter (used to inject a controllable clock).
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let scan_routes = Router::new()
        .route("/api/rfid-scan", post(rfid_scan))
        .route_layer(middleware::from_fn_with_state(state.clone(), scan_rate_limit));

    let api_routes = Router::new()
        .route("/api/register-token", post(register_token))
        .route("/api/get-tokens", get(get_tokens))
        .route("/api/debug-tokens", get(debug_tokens))
        .route("/api/tokens/:key", delete(remove_token))
        .route("/api/rfid-cards", post(assign_card))
        .route("/api/rfid-cards/:rfid_id", delete(unassign_card))
        .route("/api/rfid-scans", get(recent_scans))
        .route("/api/send-fcm", post(send_fcm))
        .route_layer(middleware::from_fn_with_state(state.clone(), default_rate_limit));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .merge(scan_routes)
        .merge(api_routes);

    if state.metrics.is_some() {
        app = app.route(&state.config.metrics.path, get(metrics));
    }

    app.layer(cors_layer(&state.config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if allowed_origins.trim() == "*" {
        return cors.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|o| o.trim().parse().ok())
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Caller key: first `X-Forwarded-For` hop, else the peer address.
fn caller_key(headers: &HeaderMap, request: &Request) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn enforce(
    state: &AppState,
    policy_name: &'static str,
    policy: RatePolicy,
    request: Request,
    next: Next,
) -> Response {
    let key = caller_key(request.headers(), &request);

    // Each policy counts in its own window
    let window_key = format!("{policy_name}:{key}");
    match state.limiter.check_policy(&window_key, &policy).await {
        RateLimitResult::Allowed { remaining, .. } => {
            debug!(caller = %key, policy = policy_name, remaining, "Request admitted");
            next.run(request).await
        }
        limited => {
            warn!(caller = %key, policy = policy_name, "Request rate limited");
            if let Some(metrics) = &state.metrics {
                metrics.record_rate_limited(policy_name);
            }
            NotifyError::RateLimited {
                retry_after_secs: limited.retry_after_secs().unwrap_or(1),
            }
            .into_response()
        }
    }
}

async fn default_rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let policy = state.config.rate_limit.default;
    enforce(&state, "default", policy, request, next).await
}

async fn scan_rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let policy = state.config.rate_limit.scan;
    enforce(&state, "scan", policy, request, next).await
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "rfid-push-gateway",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let rendered = state.metrics.as_ref().map(|m| m.render());
    match rendered {
        Some(Ok(text)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Some(Err(e)) => {
            warn!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Device registration request as sent by the mobile app.
#[derive(Debug, Deserialize)]
pub struct RegisterTokenRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "deviceInfo")]
    pub device_info: Option<Metadata>,
    /// Merge metadata into the existing record instead of replacing it
    #[serde(default)]
    pub merge: bool,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: &'static str,
}

async fn register_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterTokenRequest>,
) -> Result<Json<SuccessResponse>> {
    let token = req
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| NotifyError::invalid("Missing FCM token"))?;
    let user_id = req
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| NotifyError::invalid("Missing user_id"))?;

    let mut metadata = req.device_info.unwrap_or_default();
    if let Some(email) = req.email {
        metadata.insert("email".to_string(), Value::String(email));
    }
    let mode = if req.merge {
        RegisterMode::Merge
    } else {
        RegisterMode::Replace
    };

    state
        .registry
        .register_with(&user_id, &token, metadata, mode)
        .await?;

    Ok(Json(SuccessResponse {
        success: true,
        message: "Token registered successfully",
    }))
}

async fn get_tokens(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let devices = state.registry.list_all().await?;

    let mut tokens = Vec::with_capacity(devices.len());
    for (id, device) in devices.iter().enumerate() {
        let rfid_cards = state.registry.tags_for(&device.identity).await?;
        tokens.push(json!({
            "id": id,
            "userId": device.identity,
            "masked": device.masked(),
            "email": device.email(),
            "platform": device.platform(),
            "registeredAt": device.registered_at,
            "rfidCards": rfid_cards,
        }));
    }

    Ok(Json(json!({
        "count": tokens.len(),
        "tokens": tokens,
        "source": "registry",
    })))
}

async fn debug_tokens(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let devices = state.registry.list_all().await?;
    let tokens: Vec<Value> = devices
        .iter()
        .map(|d| {
            json!({
                "masked": d.masked(),
                "platform": d.platform(),
                "registeredAt": d.registered_at,
            })
        })
        .collect();

    Ok(Json(json!({
        "totalTokens": tokens.len(),
        "tokens": tokens,
    })))
}

async fn remove_token(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<Value>> {
    let removed = state.registry.remove(&key).await?;
    Ok(Json(json!({ "success": true, "removed": removed })))
}

#[derive(Debug, Deserialize)]
pub struct AssignCardRequest {
    #[serde(default, rename = "rfidId")]
    pub rfid_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

async fn assign_card(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AssignCardRequest>,
) -> Result<Json<Value>> {
    let rfid_id = req
        .rfid_id
        .ok_or_else(|| NotifyError::invalid("RFID ID is required"))?;
    let user_id = req
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| NotifyError::invalid("Missing user_id"))?;

    let assignment = state.registry.assign_tag(&rfid_id, &user_id).await?;
    Ok(Json(json!({
        "success": true,
        "rfidId": assignment.tag_id,
        "userId": assignment.identity,
    })))
}

async fn unassign_card(
    State(state): State<Arc<AppState>>,
    Path(rfid_id): Path<String>,
) -> Result<Json<Value>> {
    let removed = state.registry.unassign_tag(&rfid_id).await?;
    Ok(Json(json!({ "success": true, "removed": removed })))
}

/// Scan event as posted by the reader.
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    #[serde(default, rename = "rfidId")]
    pub rfid_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

async fn rfid_scan(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScanRequest>,
) -> Result<Json<Value>> {
    let outcome = state
        .scans
        .handle_scan(
            req.rfid_id.as_deref().unwrap_or_default(),
            req.location.as_deref(),
            req.title.as_deref(),
            req.message.as_deref(),
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "messageId": outcome.message_id(),
        "message": "Notification sent successfully",
        "user": outcome.user_email,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RecentScansQuery {
    #[serde(default = "default_scan_limit")]
    pub limit: usize,
}

fn default_scan_limit() -> usize {
    50
}

async fn recent_scans(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentScansQuery>,
) -> Result<Json<Value>> {
    let scans = state.scans.recent(query.limit.min(500)).await?;
    Ok(Json(json!({ "count": scans.len(), "scans": scans })))
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, rename = "sendToAll")]
    pub send_to_all: bool,
}

async fn send_fcm(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendRequest>,
) -> Result<Json<Value>> {
    let (title, body) = match (req.title, req.body) {
        (Some(t), Some(b)) if !t.trim().is_empty() && !b.trim().is_empty() => (t, b),
        _ => return Err(NotifyError::invalid("Missing title or body")),
    };
    let notification = NotificationBody::new(title, body);

    if req.send_to_all {
        let summary = state
            .dispatcher
            .dispatch(&notification, DispatchTarget::AllRegistered)
            .await?;
        info!(
            sent = summary.sent_count,
            failed = summary.failed_count,
            "Broadcast finished"
        );

        let (sent, failed): (Vec<_>, Vec<_>) = summary.results.iter().partition(|r| r.success);
        let results: Vec<Value> = sent
            .iter()
            .map(|r| json!({ "userId": r.target, "success": true, "messageId": r.message_id }))
            .collect();
        let errors: Vec<Value> = failed
            .iter()
            .map(|r| json!({ "userId": r.target, "error": r.error_detail }))
            .collect();

        return Ok(Json(json!({
            "success": summary.any_sent(),
            "results": results,
            "errors": errors,
            "sentTo": summary.sent_count,
            "failed": summary.failed_count,
            "sentCount": summary.sent_count,
            "failedCount": summary.failed_count,
        })));
    }

    let token = req
        .token
        .ok_or_else(|| NotifyError::invalid("Missing token or sendToAll flag"))?;
    let summary = state
        .dispatcher
        .dispatch(&notification, DispatchTarget::SingleToken(token))
        .await?;

    match summary.results.into_iter().next() {
        Some(result) if result.success => Ok(Json(json!({
            "success": true,
            "messageId": result.message_id,
        }))),
        Some(result) => Err(NotifyError::DeliveryFailed(format!(
            "Failed to send notification: {}",
            result.error_detail.as_deref().unwrap_or("send failed")
        ))),
        None => Err(NotifyError::DeliveryFailed("no delivery attempted".to_string())),
    }
}
