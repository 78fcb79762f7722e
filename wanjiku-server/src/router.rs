use serde::Serialize;
use wanjiku_core::menu;
use wanjiku_core::protocol::{WanjikuRequest, WanjikuResponse};

use crate::app::AppState;

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 500;

pub const SESSION_NOT_FOUND: &str = "Session not found";

pub async fn handle_request(request: WanjikuRequest, state: &AppState) -> WanjikuResponse {
    match request {
        WanjikuRequest::Health => match state.storage.sessions.ping().await {
            Ok(v) => WanjikuResponse::ok(serde_json::json!({
                "storage": state.config.database.backend,
                "storage_version": v,
                "status": "healthy"
            })),
            Err(e) => WanjikuResponse::err(format!("Storage health check failed: {}", e)),
        },
        WanjikuRequest::Ussd {
            session_id,
            phone_number,
            text,
        } => to_response(&state.ussd.handle(&session_id, &phone_number, &text).await),
        WanjikuRequest::EndSession { session_id } => {
            to_response(&state.ussd.end_session(&session_id).await)
        }
        WanjikuRequest::GetSession { session_id } => {
            match state.storage.sessions.get(&session_id).await {
                Ok(Some(session)) => to_response(&session),
                Ok(None) => WanjikuResponse::err(SESSION_NOT_FOUND),
                Err(e) => WanjikuResponse::err(e.to_string()),
            }
        }
        WanjikuRequest::ListSessions { limit } => {
            match state.storage.sessions.list(clamp_limit(limit)).await {
                Ok(sessions) => to_response(&serde_json::json!({
                    "count": sessions.len(),
                    "results": sessions,
                })),
                Err(e) => WanjikuResponse::err(e.to_string()),
            }
        }
        WanjikuRequest::Menus => to_response(&serde_json::json!({ "menus": menu::menu_tree() })),
        WanjikuRequest::SendSms {
            phone_number,
            message,
        } => to_response(&state.sms.send_sms(&phone_number, &message, None).await),
        WanjikuRequest::IncomingSms {
            phone_number,
            message,
        } => to_response(&state.sms.process_incoming_sms(&phone_number, &message).await),
        WanjikuRequest::ListMessages { limit } => {
            match state.storage.messages.list(clamp_limit(limit)).await {
                Ok(messages) => to_response(&serde_json::json!({
                    "count": messages.len(),
                    "results": messages,
                })),
                Err(e) => WanjikuResponse::err(e.to_string()),
            }
        }
    }
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

fn to_response<T: Serialize>(value: &T) -> WanjikuResponse {
    match serde_json::to_value(value) {
        Ok(v) => WanjikuResponse::ok(v),
        Err(e) => WanjikuResponse::err(format!("Serialization error: {}", e)),
    }
}
