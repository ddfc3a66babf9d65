//! HTTP surface: routing, CORS, auth gating, and request/response shapes.
//!
//! Handlers translate subsystem errors into `{error}` bodies with the
//! right status code; this is the only layer that speaks status codes.

use crate::alerts::{AlertManager, PolicyPatch};
use crate::config::ServerConfig;
use crate::db::IndexStore;
use crate::health::build_report;
use crate::indexer::{IndexMode, Indexer};
use crate::ingest::{
    self, normalize_batch, parse_payload, resolve_producer, IngestAuthError, IngestQueue,
    IngestResponse,
};
use crate::openapi;
use crate::query::QueryService;
use crate::maintenance::MaintenanceLoop;
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use mikroscope_core::EntryFilter;
use serde::Deserialize;
use std::sync::Arc;

pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<IndexStore>,
    pub indexer: Arc<Indexer>,
    pub query: Arc<QueryService>,
    pub alerts: Arc<AlertManager>,
    pub maintenance: Arc<MaintenanceLoop>,
    /// Present only in async ingest mode.
    pub queue: Option<Arc<IngestQueue>>,
    pub started_at: DateTime<Utc>,
}

pub type SharedState = Arc<AppState>;

// ============================================================================
// Error translation
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<crate::db::StoreError> for ApiError {
    fn from(err: crate::db::StoreError) -> Self {
        match err {
            crate::db::StoreError::MissingGroupField => Self::bad_request(err.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<crate::query::QueryError> for ApiError {
    fn from(err: crate::query::QueryError) -> Self {
        match err {
            crate::query::QueryError::InvalidGroupBy(_)
            | crate::query::QueryError::MissingGroupField => Self::bad_request(err.to_string()),
            crate::query::QueryError::Store(inner) => inner.into(),
        }
    }
}

impl From<crate::indexer::IndexError> for ApiError {
    fn from(err: crate::indexer::IndexError) -> Self {
        Self::internal(err.to_string())
    }
}

// ============================================================================
// Auth
// ============================================================================

/// API auth is permissive when neither a bearer token nor basic
/// credentials are configured; otherwise one of the two must match.
fn require_api_auth(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if !state.config.api_auth_configured() {
        return Ok(());
    }

    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return Err(ApiError::unauthorized());
    };

    if let Some(token) = value.strip_prefix("Bearer ") {
        if state.config.api_token.as_deref() == Some(token.trim()) {
            return Ok(());
        }
    }

    if let Some(encoded) = value.strip_prefix("Basic ") {
        if let Ok(decoded) = BASE64_STANDARD.decode(encoded.trim()) {
            if let Ok(text) = String::from_utf8(decoded) {
                if let Some((user, pass)) = text.split_once(':') {
                    if state.config.auth_username.as_deref() == Some(user)
                        && state.config.auth_password.as_deref() == Some(pass)
                    {
                        return Ok(());
                    }
                }
            }
        }
    }

    Err(ApiError::unauthorized())
}

// ============================================================================
// CORS
// ============================================================================

fn is_cors_path(path: &str) -> bool {
    path == "/health"
        || path.starts_with("/openapi")
        || path.starts_with("/docs")
        || path.starts_with("/api/")
}

fn apply_cors(state: &AppState, origin: Option<&HeaderValue>, response: &mut Response) {
    let origins = state.config.cors_origins();
    let wildcard = origins.iter().any(|o| o == "*");
    let headers = response.headers_mut();

    if wildcard {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
    } else {
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        if let Some(origin) = origin {
            let matched = origin
                .to_str()
                .map(|o| origins.iter().any(|allowed| allowed == o))
                .unwrap_or(false);
            if matched {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            }
        }
    }
}

async fn cors_middleware(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();
    let preflight = request.method() == Method::OPTIONS && is_cors_path(request.uri().path());

    let mut response = if preflight {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET,POST,PUT,OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("authorization,content-type"),
        );
        response
    } else {
        next.run(request).await
    };

    apply_cors(&state, origin.as_ref(), &mut response);
    response
}

// ============================================================================
// Query parameter parsing
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogsParams {
    from: Option<String>,
    to: Option<String>,
    level: Option<String>,
    audit: Option<String>,
    field: Option<String>,
    value: Option<String>,
    limit: Option<String>,
    cursor: Option<String>,
    group_by: Option<String>,
    group_field: Option<String>,
}

fn parse_filter(params: &LogsParams) -> Result<EntryFilter, ApiError> {
    let mut filter = EntryFilter {
        from: params.from.clone(),
        to: params.to.clone(),
        level: params.level.as_deref().map(str::to_uppercase),
        audit: None,
        field: None,
    };

    if let Some(audit) = params.audit.as_deref() {
        filter.audit = Some(match audit {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(ApiError::bad_request(format!(
                    "audit must be true, false, 1, or 0, got {:?}",
                    other
                )))
            }
        });
    }

    match (&params.field, &params.value) {
        (Some(field), Some(value)) if !field.is_empty() => {
            filter = filter.field(field.clone(), value.clone());
        }
        (None, None) => {}
        _ => {
            return Err(ApiError::bad_request(
                "field and value must be provided together",
            ))
        }
    }

    Ok(filter)
}

fn parse_limit(params: &LogsParams) -> Result<Option<u64>, ApiError> {
    match params.limit.as_deref() {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("limit must be a number, got {:?}", raw))),
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(build_report(
        &state.config,
        state.started_at,
        &state.store,
        &state.indexer,
        state.queue.as_deref(),
        &state.alerts,
        &state.maintenance,
    ))
}

async fn openapi_json() -> Json<serde_json::Value> {
    Json(openapi::document())
}

async fn openapi_yaml() -> Response {
    (
        [(header::CONTENT_TYPE, "application/yaml")],
        openapi::DOCUMENT_YAML,
    )
        .into_response()
}

async fn docs_page() -> Html<&'static str> {
    Html(openapi::DOCS_HTML)
}

async fn query_logs(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<LogsParams>,
) -> Result<Response, ApiError> {
    require_api_auth(&state, &headers)?;
    let filter = parse_filter(&params)?;
    let limit = parse_limit(&params)?;
    let page = state
        .query
        .query_page(&filter, limit, params.cursor.as_deref())?;
    Ok(Json(page).into_response())
}

async fn aggregate_logs(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<LogsParams>,
) -> Result<Response, ApiError> {
    require_api_auth(&state, &headers)?;
    let filter = parse_filter(&params)?;
    let limit = parse_limit(&params)?;
    let group_by = params
        .group_by
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("groupBy is required"))?;
    let result = state
        .query
        .aggregate(&filter, group_by, params.group_field.as_deref(), limit)?;
    Ok(Json(result).into_response())
}

async fn logs_stats(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_api_auth(&state, &headers)?;
    let stats = state.store.get_stats()?;
    Ok(Json(stats).into_response())
}

async fn reindex(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_api_auth(&state, &headers)?;
    // Reset and rescan happen under the indexer's single in-flight flag;
    // a concurrent pass means no reset happened at all.
    let (entries_deleted, fields_deleted, report) = state
        .indexer
        .try_reset_and_reindex()?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::CONFLICT,
                "an indexing pass is already in progress",
            )
        })?;

    Ok(Json(serde_json::json!({
        "report": report,
        "reset": {
            "entriesDeleted": entries_deleted,
            "fieldsDeleted": fields_deleted,
        },
    }))
    .into_response())
}

async fn ingest_logs(
    State(state): State<SharedState>,
    headers: HeaderMap,
    request: Request,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let producer = match resolve_producer(
        authorization,
        state.config.auth_username.as_deref(),
        state.config.auth_password.as_deref(),
        &state.config.ingest_producers,
    ) {
        Ok(producer) => producer,
        Err(IngestAuthError::Disabled) => {
            return ApiError::new(StatusCode::NOT_FOUND, "ingest is not configured")
                .into_response()
        }
        Err(IngestAuthError::Unauthorized) => return ApiError::unauthorized().into_response(),
    };

    let body = match axum::body::to_bytes(
        request.into_body(),
        state.config.ingest_max_body_bytes,
    )
    .await
    {
        Ok(bytes) => bytes,
        Err(_) => {
            return ApiError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "body exceeds the configured maxBodyBytes",
            )
            .into_response()
        }
    };

    let elements = match parse_payload(&body) {
        Ok(elements) => elements,
        Err(message) => return ApiError::bad_request(message).into_response(),
    };

    let now = Utc::now();
    let batch = normalize_batch(elements, &producer, now);
    let received_at = batch.ingested_at.clone();

    if let Some(queue) = &state.queue {
        if !batch.records.is_empty() {
            queue.enqueue(producer.clone(), batch.records);
        }
        return (
            StatusCode::ACCEPTED,
            Json(IngestResponse {
                accepted: batch.accepted,
                rejected: batch.rejected,
                queued: true,
                producer_id: producer,
                received_at,
            }),
        )
            .into_response();
    }

    if !batch.records.is_empty() {
        if let Err(e) = ingest::append_batch(
            &state.config.logs_path,
            &producer,
            &batch.records,
            now,
        ) {
            tracing::error!("ingest append for {} failed: {}", producer, e);
            return ApiError::internal(format!("cannot persist batch: {}", e)).into_response();
        }
        if let Err(e) = state.indexer.run(IndexMode::Incremental) {
            // The batch is durable on disk; surface the failure through
            // /health rather than failing the request.
            tracing::warn!("post-ingest indexing failed: {}", e);
        }
    }

    (
        StatusCode::OK,
        Json(IngestResponse {
            accepted: batch.accepted,
            rejected: batch.rejected,
            queued: false,
            producer_id: producer,
            received_at,
        }),
    )
        .into_response()
}

async fn get_alert_config(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_api_auth(&state, &headers)?;
    Ok(Json(serde_json::json!({
        "configPath": state.alerts.config_path(),
        "policy": state.alerts.policy(),
    }))
    .into_response())
}

async fn put_alert_config(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, ApiError> {
    require_api_auth(&state, &headers)?;
    let patch: PolicyPatch = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid policy patch: {}", e)))?;
    let policy = state
        .alerts
        .update_policy(&patch)
        .map_err(ApiError::bad_request)?;
    Ok(Json(serde_json::json!({
        "configPath": state.alerts.config_path(),
        "policy": policy,
    }))
    .into_response())
}

async fn test_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, ApiError> {
    require_api_auth(&state, &headers)?;

    let override_url = parse_webhook_override(&body)?;
    let result = state
        .alerts
        .test_webhook(override_url)
        .await
        .map_err(ApiError::bad_request)?;
    Ok(Json(result).into_response())
}

/// Body may be `{}`, `{"webhookUrl": "..."}`, or `{"webhookUrl": null}`.
/// An empty JSON array is reinterpreted as `{}` (preserved source
/// behavior); any other field is a validation error.
fn parse_webhook_override(body: &[u8]) -> Result<Option<String>, ApiError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {}", e)))?;

    match value {
        serde_json::Value::Array(items) if items.is_empty() => Ok(None),
        serde_json::Value::Object(obj) => {
            for key in obj.keys() {
                if key != "webhookUrl" {
                    return Err(ApiError::bad_request(format!(
                        "unexpected field {:?}; only webhookUrl is accepted",
                        key
                    )));
                }
            }
            match obj.get("webhookUrl") {
                None | Some(serde_json::Value::Null) => Ok(None),
                Some(serde_json::Value::String(url)) => Ok(Some(url.clone())),
                Some(_) => Err(ApiError::bad_request("webhookUrl must be a string or null")),
            }
        }
        _ => Err(ApiError::bad_request(
            "expected an object with an optional webhookUrl",
        )),
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/openapi.json", get(openapi_json))
        .route("/openapi.yaml", get(openapi_yaml))
        .route("/docs", get(docs_page))
        .route("/docs/", get(docs_page))
        .route("/api/ingest", post(ingest_logs))
        .route("/api/logs", get(query_logs))
        .route("/api/logs/aggregate", get(aggregate_logs))
        .route("/api/logs/stats", get(logs_stats))
        .route("/api/reindex", post(reindex))
        .route(
            "/api/alerts/config",
            get(get_alert_config).put(put_alert_config),
        )
        .route("/api/alerts/test-webhook", post(test_webhook))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            cors_middleware,
        ))
        .with_state(state)
}
