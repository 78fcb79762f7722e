//! USSD session flow engine
//!
//! Every gateway callback runs the same pipeline:
//!   1. upsert the session (create on first sight, otherwise slide the expiry;
//!      stale sessions restart at the welcome menu)
//!   2. route the input through `menu::TRANSITIONS`
//!   3. persist any step change, then render the screen
//!
//! `handle` is total: store or responder failures become the apology screen
//! with `success = false`, and the cause goes to the log.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use wanjiku_core::config::{SessionConfig, MAX_SESSION_TTL_SECONDS};
use wanjiku_core::menu::{self, Action, Step, StepChange};
use wanjiku_core::{
    ConversationalResponder, ResponderError, SessionStatus, SessionStore, StoreError, UssdSession,
};

// ============================================================================
// PUBLIC API
// ============================================================================

/// Screen returned to the gateway for one USSD turn.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UssdReply {
    pub success: bool,
    pub response: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UssdReply {
    fn ok(response: String, session_id: &str) -> Self {
        Self {
            success: true,
            response,
            session_id: session_id.to_string(),
            error: None,
        }
    }

    fn failed(session_id: &str, error: String) -> Self {
        Self {
            success: false,
            response: menu::APOLOGY.to_string(),
            session_id: session_id.to_string(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EndSessionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EndSessionOutcome {
    fn ended() -> Self {
        Self {
            success: true,
            message: Some("Session ended".to_string()),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Error, Debug)]
enum DispatchError {
    #[error("session store: {0}")]
    Store(#[from] StoreError),

    #[error("responder: {0}")]
    Responder(#[from] ResponderError),
}

pub struct UssdService {
    sessions: Arc<dyn SessionStore>,
    responder: Arc<dyn ConversationalResponder>,
    ttl: Duration,
    max_reply_chars: usize,
}

impl UssdService {
    /// `ttl_seconds` is clamped to `1..=MAX_SESSION_TTL_SECONDS`; loaded
    /// configs are already validated, hand-built ones may not be.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        responder: Arc<dyn ConversationalResponder>,
        config: &SessionConfig,
    ) -> Self {
        let ttl_seconds = config.ttl_seconds.clamp(1, MAX_SESSION_TTL_SECONDS);
        if ttl_seconds != config.ttl_seconds {
            tracing::warn!(
                configured = config.ttl_seconds,
                used = ttl_seconds,
                "Session TTL out of range, clamped"
            );
        }

        Self {
            sessions,
            responder,
            ttl: Duration::seconds(ttl_seconds),
            max_reply_chars: config.max_reply_chars,
        }
    }

    /// Process one USSD turn. Never fails; see module docs.
    pub async fn handle(&self, session_id: &str, phone_number: &str, text: &str) -> UssdReply {
        match self.dispatch(session_id, phone_number, text).await {
            Ok(response) => UssdReply::ok(response, session_id),
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    phone_number = %phone_number,
                    error = %e,
                    "USSD request failed, returning apology"
                );
                UssdReply::failed(session_id, e.to_string())
            }
        }
    }

    /// Mark a session completed. Repeating the call on a completed session
    /// succeeds again; unknown ids report "Session not found".
    pub async fn end_session(&self, session_id: &str) -> EndSessionOutcome {
        let mut session = match self.sessions.get(session_id).await {
            Ok(Some(s)) => s,
            Ok(None) => return EndSessionOutcome::failed("Session not found"),
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Failed to load session");
                return EndSessionOutcome::failed(e.to_string());
            }
        };

        session.status = SessionStatus::Completed;
        session.updated_at = Utc::now();

        match self.sessions.save(&session).await {
            Ok(()) => {
                tracing::info!(session_id = %session_id, "USSD session ended");
                EndSessionOutcome::ended()
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Failed to end session");
                EndSessionOutcome::failed(e.to_string())
            }
        }
    }

    // ========================================================================
    // INTERNAL
    // ========================================================================

    async fn dispatch(
        &self,
        session_id: &str,
        phone_number: &str,
        text: &str,
    ) -> Result<String, DispatchError> {
        let mut session = self.upsert(session_id, phone_number).await?;
        let transition = menu::route(text);

        tracing::debug!(
            session_id = %session_id,
            step = %session.current_step,
            action = ?transition.action,
            "USSD input routed"
        );

        if let StepChange::Set(step) = transition.step {
            session.current_step = step.as_str().to_string();
            self.sessions.save(&session).await?;
        }

        let response = match transition.action {
            Action::ShowMenu(step) => step.screen().to_string(),
            Action::ServiceDetail => menu::service_detail_screen(text),
            Action::DocumentsInfo => menu::documents_info_screen().to_string(),
            Action::FreeText => {
                let reply = self.responder.reply(text, session_id).await?;
                menu::fit_screen(&reply, self.max_reply_chars)
            }
        };

        Ok(response)
    }

    async fn upsert(&self, session_id: &str, phone_number: &str) -> Result<UssdSession, StoreError> {
        let now = Utc::now();

        let Some(mut session) = self.sessions.get(session_id).await? else {
            let session = self
                .sessions
                .create(session_id, phone_number, Step::Welcome.as_str(), now + self.ttl)
                .await?;
            tracing::info!(session_id = %session_id, phone_number = %phone_number, "USSD session started");
            return Ok(session);
        };

        if session.is_stale(now) {
            tracing::info!(
                session_id = %session_id,
                status = %session.status,
                expired_at = %session.expires_at,
                "Stale USSD session restarted at welcome"
            );
            session.restart(Step::Welcome.as_str());
        }

        session.touch(now, self.ttl);
        self.sessions.save(&session).await?;
        Ok(session)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::Mutex;
    use wanjiku_core::store::MemoryStore;

    const PHONE: &str = "+254712345678";

    /// Replies with a fixed string and remembers what it was asked.
    struct StubResponder {
        reply: Result<String, ()>,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl StubResponder {
        fn replying(reply: impl Into<String>) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ConversationalResponder for StubResponder {
        async fn reply(&self, text: &str, session_id: &str) -> Result<String, ResponderError> {
            self.seen
                .lock()
                .unwrap()
                .push((text.to_string(), session_id.to_string()));
            self.reply.clone().map_err(|_| ResponderError::MissingReply)
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    /// Store whose every call fails.
    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn get(&self, _: &str) -> Result<Option<UssdSession>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn create(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: DateTime<Utc>,
        ) -> Result<UssdSession, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn save(&self, _: &UssdSession) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn list(&self, _: usize) -> Result<Vec<UssdSession>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn expire_stale(&self, _: DateTime<Utc>) -> Result<u64, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn ping(&self) -> Result<String, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    fn service_with(responder: Arc<dyn ConversationalResponder>) -> (UssdService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = UssdService::new(store.clone(), responder, &SessionConfig::default());
        (service, store)
    }

    fn service() -> (UssdService, Arc<MemoryStore>) {
        service_with(StubResponder::replying("Jibu fupi"))
    }

    async fn step_of(store: &MemoryStore, id: &str) -> String {
        store.get(id).await.unwrap().unwrap().current_step
    }

    fn assert_expiry_refreshed(session: &UssdSession) {
        let expected = Utc::now() + Duration::minutes(5);
        let drift = (session.expires_at - expected).num_seconds().abs();
        assert!(drift <= 5, "expires_at off by {}s", drift);
    }

    #[tokio::test]
    async fn test_first_call_creates_one_active_welcome_session() {
        let (svc, store) = service();

        let reply = svc.handle("ATUid_1", PHONE, "").await;

        assert!(reply.success);
        assert_eq!(reply.session_id, "ATUid_1");
        assert!(reply.response.starts_with("Karibu Wanjiku 2.0!"));
        assert_eq!(store.session_count().await, 1);

        let session = store.get("ATUid_1").await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.current_step, "welcome");
        assert_eq!(session.phone_number, PHONE);
    }

    #[tokio::test]
    async fn test_repeated_calls_reuse_the_session() {
        let (svc, store) = service();

        for input in ["", "1", "1.2", "2", "habari", "0"] {
            svc.handle("ATUid_1", PHONE, input).await;
        }

        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_empty_and_zero_show_welcome_from_any_step() {
        let (svc, store) = service();
        let welcome = Step::Welcome.screen();

        svc.handle("s", PHONE, "3").await;
        assert_eq!(step_of(&store, "s").await, "help");
        let a = svc.handle("s", PHONE, "").await;
        assert_eq!(a.response, welcome);
        assert_eq!(step_of(&store, "s").await, "welcome");

        svc.handle("s", PHONE, "2").await;
        let b = svc.handle("s", PHONE, "0").await;
        assert_eq!(b.response, welcome);
        assert_eq!(step_of(&store, "s").await, "welcome");
    }

    #[tokio::test]
    async fn test_top_level_digits_set_step() {
        let (svc, store) = service();

        let r = svc.handle("s", PHONE, "1").await;
        assert_eq!(r.response, Step::Services.screen());
        assert_eq!(step_of(&store, "s").await, "services");

        let r = svc.handle("s", PHONE, "2").await;
        assert_eq!(r.response, Step::Documents.screen());
        assert_eq!(step_of(&store, "s").await, "documents");

        let r = svc.handle("s", PHONE, "3").await;
        assert_eq!(r.response, Step::Help.screen());
        assert_eq!(step_of(&store, "s").await, "help");
    }

    #[tokio::test]
    async fn test_service_detail_names_service_without_moving_step() {
        let (svc, store) = service();
        svc.handle("s", PHONE, "1").await;

        let r = svc.handle("s", PHONE, "1.3").await;

        assert!(r.success);
        assert!(r.response.contains("Leseni ya Biashara"));
        assert_eq!(step_of(&store, "s").await, "services");

        // From another step the step is equally untouched.
        svc.handle("s", PHONE, "3").await;
        svc.handle("s", PHONE, "1.1").await;
        assert_eq!(step_of(&store, "s").await, "help");
    }

    #[tokio::test]
    async fn test_unknown_service_code_uses_placeholder() {
        let (svc, _store) = service();

        let r = svc.handle("s", PHONE, "1.9").await;

        assert!(r.success);
        assert!(r.response.starts_with("Huduma: Huduma\n"));
    }

    #[tokio::test]
    async fn test_document_sub_selection_shows_explainer() {
        let (svc, store) = service();
        svc.handle("s", PHONE, "2").await;

        let r = svc.handle("s", PHONE, "2.2").await;

        assert_eq!(r.response, menu::documents_info_screen());
        assert_eq!(step_of(&store, "s").await, "documents");
    }

    #[tokio::test]
    async fn test_free_text_goes_to_responder_with_session_id() {
        let responder = StubResponder::replying("Tembelea ofisi ya Huduma Centre.");
        let (svc, store) = service_with(responder.clone());
        svc.handle("s", PHONE, "3").await;

        let r = svc.handle("s", PHONE, "Nataka kitambulisho").await;

        assert!(r.success);
        assert_eq!(r.response, "Tembelea ofisi ya Huduma Centre.");
        assert_eq!(
            responder.seen.lock().unwrap().as_slice(),
            &[("Nataka kitambulisho".to_string(), "s".to_string())]
        );
        assert_eq!(step_of(&store, "s").await, "help");
    }

    #[tokio::test]
    async fn test_long_free_text_reply_is_truncated() {
        let (svc, _store) = service_with(StubResponder::replying("x".repeat(200)));

        let r = svc.handle("s", PHONE, "swali refu").await;

        assert!(r.success);
        assert_eq!(r.response.chars().count(), 160);
        assert!(r.response.ends_with("..."));
    }

    #[tokio::test]
    async fn test_responder_failure_returns_apology() {
        let (svc, store) = service_with(StubResponder::failing());
        svc.handle("s", PHONE, "1").await;

        let r = svc.handle("s", PHONE, "habari").await;

        assert!(!r.success);
        assert_eq!(r.response, menu::APOLOGY);
        assert_eq!(r.session_id, "s");
        assert!(r.error.is_some());
        assert_eq!(step_of(&store, "s").await, "services");
    }

    #[tokio::test]
    async fn test_store_failure_returns_apology() {
        let svc = UssdService::new(
            Arc::new(BrokenStore),
            StubResponder::replying("x"),
            &SessionConfig::default(),
        );

        let r = svc.handle("s", PHONE, "1").await;

        assert!(!r.success);
        assert_eq!(r.response, menu::APOLOGY);
        assert!(r.error.unwrap().contains("session store"));
    }

    #[tokio::test]
    async fn test_every_branch_refreshes_expiry() {
        let (svc, store) = service();
        svc.handle("s", PHONE, "").await;

        let mut old = store.get("s").await.unwrap().unwrap();
        old.expires_at = Utc::now() + Duration::seconds(30);
        store.save(&old).await.unwrap();

        for input in ["", "1", "1.4", "2.1", "free text"] {
            svc.handle("s", PHONE, input).await;
            let session = store.get("s").await.unwrap().unwrap();
            assert_expiry_refreshed(&session);
        }
    }

    #[tokio::test]
    async fn test_stale_session_restarts_at_welcome() {
        let (svc, store) = service();
        svc.handle("s", PHONE, "2").await;

        let mut stale = store.get("s").await.unwrap().unwrap();
        stale.expires_at = Utc::now() - Duration::minutes(1);
        stale.user_data = serde_json::json!({"draft": "hati"});
        store.save(&stale).await.unwrap();

        svc.handle("s", PHONE, "2.1").await;

        let session = store.get("s").await.unwrap().unwrap();
        assert_eq!(session.current_step, "welcome");
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.user_data, serde_json::json!({}));
        assert_expiry_refreshed(&session);
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_swept_session_is_revived() {
        let (svc, store) = service();
        svc.handle("s", PHONE, "3").await;
        let mut swept = store.get("s").await.unwrap().unwrap();
        swept.status = SessionStatus::Expired;
        store.save(&swept).await.unwrap();

        svc.handle("s", PHONE, "habari").await;

        let session = store.get("s").await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.current_step, "welcome");
    }

    #[tokio::test]
    async fn test_completed_session_is_not_revived_but_step_moves() {
        let (svc, store) = service();
        svc.handle("s", PHONE, "1").await;
        assert!(svc.end_session("s").await.success);

        let mut ended = store.get("s").await.unwrap().unwrap();
        ended.expires_at = Utc::now() - Duration::minutes(10);
        store.save(&ended).await.unwrap();

        let r = svc.handle("s", PHONE, "3").await;

        assert!(r.success);
        assert_eq!(r.response, Step::Help.screen());
        let session = store.get("s").await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.current_step, "help");
        assert_expiry_refreshed(&session);
        assert_eq!(store.session_count().await, 1);
    }

    fn service_with_session(config: SessionConfig, reply: &str) -> (UssdService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = UssdService::new(store.clone(), StubResponder::replying(reply), &config);
        (service, store)
    }

    #[tokio::test]
    async fn test_non_positive_ttl_is_clamped_and_step_survives() {
        for ttl_seconds in [0, -10] {
            let (svc, store) = service_with_session(
                SessionConfig {
                    ttl_seconds,
                    ..SessionConfig::default()
                },
                "x",
            );

            svc.handle("s", PHONE, "1").await;
            svc.handle("s", PHONE, "1.3").await;

            assert_eq!(step_of(&store, "s").await, "services", "ttl {}", ttl_seconds);
        }
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_panic() {
        let (svc, store) = service_with_session(
            SessionConfig {
                ttl_seconds: i64::MAX,
                ..SessionConfig::default()
            },
            "x",
        );

        let r = svc.handle("s", PHONE, "").await;

        assert!(r.success);
        let session = store.get("s").await.unwrap().unwrap();
        let ttl = session.expires_at - Utc::now();
        assert!(ttl <= Duration::seconds(MAX_SESSION_TTL_SECONDS));
    }

    #[tokio::test]
    async fn test_free_text_respects_tiny_reply_budget() {
        let (svc, _store) = service_with_session(
            SessionConfig {
                max_reply_chars: 2,
                ..SessionConfig::default()
            },
            &"y".repeat(200),
        );

        let r = svc.handle("s", PHONE, "swali").await;

        assert!(r.success);
        assert_eq!(r.response.chars().count(), 2);
    }

    #[tokio::test]
    async fn test_end_session_unknown_id() {
        let (svc, _store) = service();

        let outcome = svc.end_session("nope").await;

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Session not found"));
    }

    #[tokio::test]
    async fn test_end_session_is_idempotent() {
        let (svc, store) = service();
        svc.handle("s", PHONE, "").await;

        let first = svc.end_session("s").await;
        let second = svc.end_session("s").await;

        assert!(first.success);
        assert!(second.success);
        let session = store.get("s").await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_end_session_store_failure_is_reported() {
        let svc = UssdService::new(
            Arc::new(BrokenStore),
            StubResponder::replying("x"),
            &SessionConfig::default(),
        );

        let outcome = svc.end_session("s").await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }
}
