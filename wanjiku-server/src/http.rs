//! Wanjiku HTTP API
//!
//! Axum server exposing the Africa's Talking webhooks and the REST endpoints
//! used by the web front-end and operators.
//!
//! Each endpoint has a thin axum handler that delegates to a pure inner
//! function; the inner functions are tested directly.
//!
//! Endpoints:
//! - GET  /health                      — storage health
//! - GET  /version                     — server version info
//! - POST /webhooks/ussd               — gateway USSD callback (form)
//! - POST /webhooks/sms                — gateway incoming SMS callback (form)
//! - POST /ussd/sessions/process       — run one USSD turn (JSON)
//! - POST /ussd/sessions/end           — mark a session completed
//! - GET  /ussd/sessions               — list sessions, newest first
//! - GET  /ussd/sessions/:session_id   — fetch one session
//! - GET  /ussd/menus                  — the menu tree
//! - GET  /sms                         — SMS log, newest first
//! - POST /sms/send                    — send an SMS
//! - POST /sms/process_incoming        — answer an SMS as if it arrived

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use regex::Regex;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use wanjiku_core::menu::APOLOGY;
use wanjiku_core::protocol::{WanjikuRequest, WanjikuResponse};

use crate::app::AppState;
use crate::router::{handle_request, SESSION_NOT_FOUND};

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/webhooks/ussd", post(ussd_webhook_handler))
        .route("/webhooks/sms", post(sms_webhook_handler))
        .route("/ussd/sessions", get(list_sessions_handler))
        .route("/ussd/sessions/process", post(process_ussd_handler))
        .route("/ussd/sessions/end", post(end_session_handler))
        .route("/ussd/sessions/:session_id", get(get_session_handler))
        .route("/ussd/menus", get(menus_handler))
        .route("/sms", get(list_sms_handler))
        .route("/sms/send", post(send_sms_handler))
        .route("/sms/process_incoming", post(incoming_sms_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(state: AppState, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(Arc::new(state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Wanjiku HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Africa's Talking USSD callback fields.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UssdWebhookForm {
    pub session_id: Option<String>,
    pub phone_number: Option<String>,
    pub text: Option<String>,
    pub service_code: Option<String>,
}

/// Africa's Talking incoming SMS callback fields.
#[derive(Debug, Deserialize, Default)]
pub struct SmsWebhookForm {
    pub from: Option<String>,
    pub text: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProcessUssdRequest {
    pub session_id: Option<String>,
    pub phone_number: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SmsRequest {
    pub phone_number: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub async fn health_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    let response = handle_request(WanjikuRequest::Health, state).await;
    match response_to_http(response) {
        Ok(mut data) => {
            if let Some(obj) = data.as_object_mut() {
                obj.insert("version".to_string(), serde_json::json!(env!("CARGO_PKG_VERSION")));
            }
            (StatusCode::OK, data)
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e,
            }),
        ),
    }
}

/// Version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "wanjiku/1",
    })
}

/// Gateway USSD callback. Always answers with a screen: the gateway shows
/// whatever `response` holds, so malformed callbacks get the apology.
pub async fn ussd_webhook_inner(state: &AppState, form: UssdWebhookForm) -> serde_json::Value {
    let session_id = form.session_id.unwrap_or_default();

    let phone_number = match form.phone_number {
        Some(p) if !session_id.is_empty() && is_valid_msisdn(&p) => p,
        _ => {
            tracing::warn!(session_id = %session_id, "USSD callback missing session id or valid phone number");
            return serde_json::json!({
                "response": APOLOGY,
                "sessionId": session_id,
            });
        }
    };

    let request = WanjikuRequest::Ussd {
        session_id: session_id.clone(),
        phone_number,
        text: form.text.unwrap_or_default(),
    };

    let screen = response_to_http(handle_request(request, state).await)
        .ok()
        .and_then(|data| data["response"].as_str().map(str::to_string))
        .unwrap_or_else(|| APOLOGY.to_string());

    serde_json::json!({
        "response": screen,
        "sessionId": session_id,
    })
}

pub async fn sms_webhook_inner(
    state: &AppState,
    form: SmsWebhookForm,
) -> (StatusCode, serde_json::Value) {
    let (phone_number, message) = match (form.from, form.text) {
        (Some(p), Some(m)) if !p.is_empty() && !m.is_empty() => (p, m),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "status": "error",
                    "message": "Missing phone number or message",
                }),
            );
        }
    };

    let request = WanjikuRequest::IncomingSms {
        phone_number,
        message,
    };

    match response_to_http(handle_request(request, state).await) {
        Ok(data) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "success",
                "message": "SMS processed",
                "data": data,
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({
                "status": "error",
                "message": e,
            }),
        ),
    }
}

pub async fn process_ussd_inner(
    state: &AppState,
    req: ProcessUssdRequest,
) -> (StatusCode, serde_json::Value) {
    let (session_id, phone_number) = match (req.session_id, req.phone_number) {
        (Some(s), Some(p)) if !s.is_empty() && !p.is_empty() => (s, p),
        _ => return bad_request("Session ID and phone number are required"),
    };

    if !is_valid_msisdn(&phone_number) {
        return bad_request("Invalid phone number");
    }

    let request = WanjikuRequest::Ussd {
        session_id,
        phone_number,
        text: req.text.unwrap_or_default(),
    };

    into_http(handle_request(request, state).await, StatusCode::OK)
}

pub async fn end_session_inner(
    state: &AppState,
    req: EndSessionRequest,
) -> (StatusCode, serde_json::Value) {
    let session_id = match req.session_id {
        Some(s) if !s.is_empty() => s,
        _ => return bad_request("Session ID is required"),
    };

    into_http(
        handle_request(WanjikuRequest::EndSession { session_id }, state).await,
        StatusCode::OK,
    )
}

pub async fn get_session_inner(state: &AppState, session_id: String) -> (StatusCode, serde_json::Value) {
    let response = handle_request(WanjikuRequest::GetSession { session_id }, state).await;
    if response.error.as_deref() == Some(SESSION_NOT_FOUND) {
        return (
            StatusCode::NOT_FOUND,
            serde_json::json!({
                "error": SESSION_NOT_FOUND,
                "status": "error",
            }),
        );
    }
    into_http(response, StatusCode::OK)
}

pub async fn list_sessions_inner(state: &AppState, query: ListQuery) -> (StatusCode, serde_json::Value) {
    into_http(
        handle_request(WanjikuRequest::ListSessions { limit: query.limit }, state).await,
        StatusCode::OK,
    )
}

pub async fn menus_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    into_http(handle_request(WanjikuRequest::Menus, state).await, StatusCode::OK)
}

/// 201 when the gateway accepted the message, 400 otherwise.
pub async fn send_sms_inner(state: &AppState, req: SmsRequest) -> (StatusCode, serde_json::Value) {
    let (phone_number, message) = match validate_sms_request(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let (status, body) = into_http(
        handle_request(WanjikuRequest::SendSms { phone_number, message }, state).await,
        StatusCode::CREATED,
    );

    if status == StatusCode::CREATED && body["success"] != true {
        return (StatusCode::BAD_REQUEST, body);
    }
    (status, body)
}

pub async fn incoming_sms_inner(state: &AppState, req: SmsRequest) -> (StatusCode, serde_json::Value) {
    let (phone_number, message) = match validate_sms_request(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    into_http(
        handle_request(WanjikuRequest::IncomingSms { phone_number, message }, state).await,
        StatusCode::OK,
    )
}

pub async fn list_sms_inner(state: &AppState, query: ListQuery) -> (StatusCode, serde_json::Value) {
    into_http(
        handle_request(WanjikuRequest::ListMessages { limit: query.limit }, state).await,
        StatusCode::OK,
    )
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn ussd_webhook_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<UssdWebhookForm>,
) -> impl IntoResponse {
    Json(ussd_webhook_inner(&state, form).await)
}

pub async fn sms_webhook_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SmsWebhookForm>,
) -> impl IntoResponse {
    let (status, body) = sms_webhook_inner(&state, form).await;
    (status, Json(body))
}

pub async fn process_ussd_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProcessUssdRequest>,
) -> impl IntoResponse {
    let (status, body) = process_ussd_inner(&state, req).await;
    (status, Json(body))
}

pub async fn end_session_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EndSessionRequest>,
) -> impl IntoResponse {
    let (status, body) = end_session_inner(&state, req).await;
    (status, Json(body))
}

pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = get_session_inner(&state, session_id).await;
    (status, Json(body))
}

pub async fn list_sessions_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let (status, body) = list_sessions_inner(&state, query).await;
    (status, Json(body))
}

pub async fn menus_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = menus_inner(&state).await;
    (status, Json(body))
}

pub async fn list_sms_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let (status, body) = list_sms_inner(&state, query).await;
    (status, Json(body))
}

pub async fn send_sms_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SmsRequest>,
) -> impl IntoResponse {
    let (status, body) = send_sms_inner(&state, req).await;
    (status, Json(body))
}

pub async fn incoming_sms_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SmsRequest>,
) -> impl IntoResponse {
    let (status, body) = incoming_sms_inner(&state, req).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// Convert a router `WanjikuResponse` into an HTTP body value, or an error string.
pub fn response_to_http(response: WanjikuResponse) -> std::result::Result<serde_json::Value, String> {
    if response.is_ok() {
        Ok(response.data.unwrap_or(serde_json::json!({})))
    } else {
        Err(response.error.unwrap_or_else(|| "unknown error".to_string()))
    }
}

fn into_http(response: WanjikuResponse, ok_status: StatusCode) -> (StatusCode, serde_json::Value) {
    match response_to_http(response) {
        Ok(data) => (ok_status, data),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({
                "error": e,
                "status": "error",
            }),
        ),
    }
}

fn bad_request(msg: &str) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::BAD_REQUEST,
        serde_json::json!({
            "error": msg,
            "status": "error",
        }),
    )
}

fn validate_sms_request(
    req: SmsRequest,
) -> std::result::Result<(String, String), (StatusCode, serde_json::Value)> {
    match (req.phone_number, req.message) {
        (Some(p), Some(m)) if !p.is_empty() && !m.is_empty() => {
            if is_valid_msisdn(&p) {
                Ok((p, m))
            } else {
                Err(bad_request("Invalid phone number"))
            }
        }
        _ => Err(bad_request("Phone number and message are required")),
    }
}

/// E.164-ish: optional leading '+', then 9 to 15 digits.
pub fn is_valid_msisdn(phone_number: &str) -> bool {
    static MSISDN: OnceLock<Regex> = OnceLock::new();
    MSISDN
        .get_or_init(|| Regex::new(r"^\+?[0-9]{9,15}$").expect("MSISDN pattern is valid"))
        .is_match(phone_number)
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================
