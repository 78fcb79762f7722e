use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsDirection {
    Incoming,
    Outgoing,
}

impl SmsDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmsDirection::Incoming => "incoming",
            SmsDirection::Outgoing => "outgoing",
        }
    }
}

impl FromStr for SmsDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(SmsDirection::Incoming),
            "outgoing" => Ok(SmsDirection::Outgoing),
            other => Err(format!("unknown sms direction '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsStatus {
    Sent,
    Delivered,
    Failed,
    Pending,
}

impl SmsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmsStatus::Sent => "sent",
            SmsStatus::Delivered => "delivered",
            SmsStatus::Failed => "failed",
            SmsStatus::Pending => "pending",
        }
    }
}

impl FromStr for SmsStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(SmsStatus::Sent),
            "delivered" => Ok(SmsStatus::Delivered),
            "failed" => Ok(SmsStatus::Failed),
            "pending" => Ok(SmsStatus::Pending),
            other => Err(format!("unknown sms status '{}'", other)),
        }
    }
}

/// A logged SMS, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsMessage {
    pub id: Uuid,
    pub phone_number: String,
    pub direction: SmsDirection,
    pub content: String,
    pub status: SmsStatus,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl SmsMessage {
    pub fn incoming(phone_number: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phone_number: phone_number.into(),
            direction: SmsDirection::Incoming,
            content: content.into(),
            status: SmsStatus::Delivered,
            session_id: None,
            created_at: now,
            delivered_at: Some(now),
        }
    }

    pub fn outgoing(
        phone_number: impl Into<String>,
        content: impl Into<String>,
        status: SmsStatus,
        session_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            phone_number: phone_number.into(),
            direction: SmsDirection::Outgoing,
            content: content.into(),
            status,
            session_id,
            created_at: Utc::now(),
            delivered_at: None,
        }
    }
}
