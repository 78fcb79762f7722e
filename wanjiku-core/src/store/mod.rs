//! Storage for USSD sessions and the SMS log.
//!
//! Two backends sit behind the same traits:
//! - **memory**: process-local maps, used in tests and for local runs
//! - **postgres**: `ussd_sessions` / `sms_messages` tables via sqlx

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::DatabaseConfig;
use crate::models::{SmsMessage, UssdSession};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Unknown storage backend '{0}'")]
    UnknownBackend(String),
}

/// Keyed session storage. `session_id` is unique: `create` on an id that
/// already exists returns the existing record instead of a second one.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<UssdSession>, StoreError>;

    async fn create(
        &self,
        session_id: &str,
        phone_number: &str,
        current_step: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<UssdSession, StoreError>;

    async fn save(&self, session: &UssdSession) -> Result<(), StoreError>;

    /// Newest sessions first.
    async fn list(&self, limit: usize) -> Result<Vec<UssdSession>, StoreError>;

    /// Mark active sessions whose `expires_at` is before `now` as expired.
    /// Returns the number of sessions updated.
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Backend description for health checks.
    async fn ping(&self) -> Result<String, StoreError>;
}

/// Append-only log of SMS traffic.
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn record(&self, message: &SmsMessage) -> Result<(), StoreError>;

    /// Newest messages first.
    async fn list(&self, limit: usize) -> Result<Vec<SmsMessage>, StoreError>;
}

/// Both stores, usually backed by the same pool or map.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionStore>,
    pub messages: Arc<dyn MessageLog>,
}

impl Storage {
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            sessions: store.clone(),
            messages: store,
        }
    }
}

/// Build the configured storage backend. For postgres this connects and
/// ensures the schema exists.
pub async fn create_storage(config: &DatabaseConfig) -> Result<Storage, StoreError> {
    match config.backend.as_str() {
        "memory" => Ok(Storage::in_memory()),
        "postgres" => {
            let pool = crate::db::create_pool(config).await?;
            crate::db::ensure_schema(&pool).await?;
            let store = Arc::new(PgStore::new(pool));
            Ok(Storage {
                sessions: store.clone(),
                messages: store,
            })
        }
        other => Err(StoreError::UnknownBackend(other.to_string())),
    }
}
