//! SMS channel: outbound sends with a delivery log, and incoming messages
//! answered by the conversational responder.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;
use wanjiku_core::menu::APOLOGY;
use wanjiku_core::models::SmsStatus;
use wanjiku_core::{ConversationalResponder, DeliveryReceipt, MessageLog, OutboundMessenger, SmsMessage};

#[derive(Debug, Clone, Serialize)]
pub struct SmsSendOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<DeliveryReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SmsIncomingOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms_result: Option<SmsSendOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct SmsService {
    messages: Arc<dyn MessageLog>,
    messenger: Arc<dyn OutboundMessenger>,
    responder: Arc<dyn ConversationalResponder>,
}

impl SmsService {
    pub fn new(
        messages: Arc<dyn MessageLog>,
        messenger: Arc<dyn OutboundMessenger>,
        responder: Arc<dyn ConversationalResponder>,
    ) -> Self {
        Self {
            messages,
            messenger,
            responder,
        }
    }

    /// Deliver `message` and log it. A transport failure is still logged,
    /// with status failed.
    pub async fn send_sms(
        &self,
        phone_number: &str,
        message: &str,
        session_id: Option<String>,
    ) -> SmsSendOutcome {
        let (status, receipt, error) = match self.messenger.send(phone_number, message).await {
            Ok(receipt) => (SmsStatus::Sent, Some(receipt), None),
            Err(e) => {
                tracing::warn!(to = %phone_number, error = %e, "SMS delivery failed");
                (SmsStatus::Failed, None, Some(e.to_string()))
            }
        };

        let record = SmsMessage::outgoing(phone_number, message, status, session_id);
        if let Err(e) = self.messages.record(&record).await {
            tracing::error!(to = %phone_number, error = %e, "Failed to log outgoing SMS");
            return SmsSendOutcome {
                success: false,
                message_id: None,
                receipt,
                error: Some(e.to_string()),
            };
        }

        SmsSendOutcome {
            success: error.is_none(),
            message_id: Some(record.id),
            receipt,
            error,
        }
    }

    /// Log an incoming SMS, ask the responder and text the answer back.
    pub async fn process_incoming_sms(&self, phone_number: &str, message: &str) -> SmsIncomingOutcome {
        if let Err(e) = self.messages.record(&SmsMessage::incoming(phone_number, message)).await {
            tracing::error!(from = %phone_number, error = %e, "Failed to log incoming SMS");
            return SmsIncomingOutcome {
                success: false,
                response: None,
                sms_result: None,
                error: Some(e.to_string()),
            };
        }

        let session_id = format!("sms_{}_{}", phone_number, Utc::now().timestamp());

        let response = match self.responder.reply(message, &session_id).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Responder failed for SMS");
                APOLOGY.to_string()
            }
        };

        let sms_result = self.send_sms(phone_number, &response, Some(session_id)).await;

        SmsIncomingOutcome {
            success: true,
            response: Some(response),
            sms_result: Some(sms_result),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use wanjiku_core::models::SmsDirection;
    use wanjiku_core::responder::NoResponder;
    use wanjiku_core::store::MemoryStore;
    use wanjiku_core::{MessengerError, ResponderError};

    const PHONE: &str = "+254722000111";

    #[derive(Default)]
    struct RecordingMessenger {
        fail: bool,
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl OutboundMessenger for RecordingMessenger {
        async fn send(&self, phone_number: &str, message: &str) -> Result<DeliveryReceipt, MessengerError> {
            if self.fail {
                return Err(MessengerError::NoRecipients);
            }
            self.sent
                .lock()
                .unwrap()
                .push((phone_number.to_string(), message.to_string()));
            Ok(DeliveryReceipt {
                message_id: "ATXid_1".to_string(),
                number: phone_number.to_string(),
                status: "Success".to_string(),
                cost: "KES 0.8000".to_string(),
            })
        }
    }

    struct EchoResponder;

    #[async_trait]
    impl ConversationalResponder for EchoResponder {
        async fn reply(&self, text: &str, session_id: &str) -> Result<String, ResponderError> {
            assert!(session_id.starts_with("sms_+254722000111_"));
            Ok(format!("Umeuliza: {}", text))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_send_sms_logs_sent_message() {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::default());
        let svc = SmsService::new(store.clone(), messenger.clone(), Arc::new(NoResponder));

        let outcome = svc.send_sms(PHONE, "Karibu", None).await;

        assert!(outcome.success);
        assert_eq!(outcome.receipt.unwrap().message_id, "ATXid_1");
        let logged = MessageLog::list(store.as_ref(), 10).await.unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].status, SmsStatus::Sent);
        assert_eq!(Some(logged[0].id), outcome.message_id);
    }

    #[tokio::test]
    async fn test_send_failure_is_logged_as_failed() {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger {
            fail: true,
            ..Default::default()
        });
        let svc = SmsService::new(store.clone(), messenger, Arc::new(NoResponder));

        let outcome = svc.send_sms(PHONE, "Karibu", None).await;

        assert!(!outcome.success);
        assert!(outcome.error.is_some());
        let logged = MessageLog::list(store.as_ref(), 10).await.unwrap();
        assert_eq!(logged[0].status, SmsStatus::Failed);
    }

    #[tokio::test]
    async fn test_incoming_sms_is_answered() {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::default());
        let svc = SmsService::new(store.clone(), messenger.clone(), Arc::new(EchoResponder));

        let outcome = svc.process_incoming_sms(PHONE, "bei ya pasipoti").await;

        assert!(outcome.success);
        assert_eq!(outcome.response.as_deref(), Some("Umeuliza: bei ya pasipoti"));
        assert_eq!(
            messenger.sent.lock().unwrap().as_slice(),
            &[(PHONE.to_string(), "Umeuliza: bei ya pasipoti".to_string())]
        );

        let logged = MessageLog::list(store.as_ref(), 10).await.unwrap();
        assert_eq!(logged.len(), 2);
        assert_eq!(logged[0].direction, SmsDirection::Outgoing);
        assert_eq!(logged[1].direction, SmsDirection::Incoming);
        assert!(logged[0].session_id.as_deref().unwrap().starts_with("sms_"));
    }

    #[tokio::test]
    async fn test_incoming_sms_with_failing_responder_sends_apology() {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::default());
        let svc = SmsService::new(store, messenger.clone(), Arc::new(NoResponder));

        let outcome = svc.process_incoming_sms(PHONE, "habari").await;

        assert!(outcome.success);
        assert_eq!(outcome.response.as_deref(), Some(APOLOGY));
        assert_eq!(messenger.sent.lock().unwrap()[0].1, APOLOGY);
    }
}
