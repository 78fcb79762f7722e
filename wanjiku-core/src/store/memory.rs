use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{MessageLog, SessionStore, StoreError};
use crate::models::{SessionStatus, SmsMessage, UssdSession};

/// Process-local store. Sessions are keyed by id; the SMS log is a vector.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, UssdSession>>,
    messages: RwLock<Vec<SmsMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, session_id: &str) -> Result<Option<UssdSession>, StoreError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn create(
        &self,
        session_id: &str,
        phone_number: &str,
        current_step: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<UssdSession, StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| UssdSession::new(session_id, phone_number, current_step, expires_at));
        Ok(session.clone())
    }

    async fn save(&self, session: &UssdSession) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<UssdSession>, StoreError> {
        let mut all: Vec<UssdSession> = self.sessions.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut expired = 0;
        for session in self.sessions.write().await.values_mut() {
            if session.status == SessionStatus::Active && session.expires_at < now {
                session.status = SessionStatus::Expired;
                session.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn ping(&self) -> Result<String, StoreError> {
        Ok("memory".to_string())
    }
}

#[async_trait]
impl MessageLog for MemoryStore {
    async fn record(&self, message: &SmsMessage) -> Result<(), StoreError> {
        self.messages.write().await.push(message.clone());
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<SmsMessage>, StoreError> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}
