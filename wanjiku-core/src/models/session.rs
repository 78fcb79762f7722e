use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a USSD session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "expired" => Ok(SessionStatus::Expired),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

/// One USSD conversation, keyed by the gateway-assigned session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UssdSession {
    pub session_id: String,
    pub phone_number: String,
    pub status: SessionStatus,
    pub current_step: String,
    pub user_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UssdSession {
    pub fn new(
        session_id: impl Into<String>,
        phone_number: impl Into<String>,
        current_step: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            phone_number: phone_number.into(),
            status: SessionStatus::Active,
            current_step: current_step.into(),
            user_data: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            expires_at,
        }
    }

    /// True when the session should no longer carry its conversation forward:
    /// it was swept as expired, or it is still marked active past `expires_at`.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            SessionStatus::Expired => true,
            SessionStatus::Active => self.expires_at < now,
            SessionStatus::Completed => false,
        }
    }

    /// Refresh `updated_at` and slide the expiry window.
    pub fn touch(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.updated_at = now;
        self.expires_at = now + ttl;
    }

    /// Start the conversation over in place, keeping id, phone and `created_at`.
    pub fn restart(&mut self, welcome_step: &str) {
        self.status = SessionStatus::Active;
        self.current_step = welcome_step.to_string();
        self.user_data = serde_json::json!({});
    }
}
