//! Outbound SMS delivery through the Africa's Talking messaging API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MessengerConfig;

/// Delivers a text to a phone number.
#[async_trait]
pub trait OutboundMessenger: Send + Sync {
    async fn send(&self, phone_number: &str, message: &str) -> Result<DeliveryReceipt, MessengerError>;
}

#[derive(Error, Debug)]
pub enum MessengerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway error ({code}): {message}")]
    Gateway { code: u16, message: String },

    #[error("Recipient {number} rejected: {status}")]
    Rejected { number: String, status: String },

    #[error("Gateway response listed no recipients")]
    NoRecipients,

    #[error("Missing API key")]
    MissingApiKey,
}

/// What the gateway reported for a single recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryReceipt {
    pub message_id: String,
    pub number: String,
    pub status: String,
    pub cost: String,
}

// ============================================================================
// Africa's Talking API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct SendForm<'a> {
    username: &'a str,
    to: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendResponse {
    #[serde(rename = "SMSMessageData")]
    sms_message_data: SmsMessageData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SmsMessageData {
    #[serde(default)]
    recipients: Vec<Recipient>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
    number: String,
    status: String,
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    cost: String,
}

// ============================================================================
// AfricasTalkingMessenger
// ============================================================================

#[derive(Debug, Clone)]
pub struct AfricasTalkingMessenger {
    client: Client,
    config: MessengerConfig,
    api_key: String,
}

impl AfricasTalkingMessenger {
    /// API key comes from config, falling back to `AFRICASTALKING_API_KEY`.
    pub fn new(config: MessengerConfig) -> Result<Self, MessengerError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("AFRICASTALKING_API_KEY").ok())
            .unwrap_or_default();

        if api_key.is_empty() {
            return Err(MessengerError::MissingApiKey);
        }

        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }
}

#[async_trait]
impl OutboundMessenger for AfricasTalkingMessenger {
    async fn send(&self, phone_number: &str, message: &str) -> Result<DeliveryReceipt, MessengerError> {
        let url = format!(
            "{}/version1/messaging",
            self.config.base_url.trim_end_matches('/')
        );

        let form = SendForm {
            username: &self.config.username,
            to: phone_number,
            message,
            from: self.config.sender_id.as_deref(),
        };

        let response = self
            .client
            .post(&url)
            .header("apiKey", &self.api_key)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), message = %message, "SMS gateway error");
            return Err(MessengerError::Gateway {
                code: status.as_u16(),
                message,
            });
        }

        let body: SendResponse = response.json().await?;
        let recipient = body
            .sms_message_data
            .recipients
            .into_iter()
            .next()
            .ok_or(MessengerError::NoRecipients)?;

        if recipient.status != "Success" {
            return Err(MessengerError::Rejected {
                number: recipient.number,
                status: recipient.status,
            });
        }

        tracing::info!(to = %recipient.number, message_id = %recipient.message_id, "SMS sent");

        Ok(DeliveryReceipt {
            message_id: recipient.message_id,
            number: recipient.number,
            status: recipient.status,
            cost: recipient.cost,
        })
    }
}

/// Stand-in when no gateway credentials are configured; every send fails.
pub struct UnconfiguredMessenger;

#[async_trait]
impl OutboundMessenger for UnconfiguredMessenger {
    async fn send(&self, _phone_number: &str, _message: &str) -> Result<DeliveryReceipt, MessengerError> {
        Err(MessengerError::MissingApiKey)
    }
}
