use std::sync::Arc;

use wanjiku_core::config::ResponderConfig;
use wanjiku_core::messenger::UnconfiguredMessenger;
use wanjiku_core::{
    create_responder, create_storage, AfricasTalkingMessenger, ConversationalResponder,
    OutboundMessenger, Storage, WanjikuConfig, WanjikuError,
};

use crate::subsystems::sms::SmsService;
use crate::subsystems::ussd::UssdService;

/// Everything a request needs, shared by the router and HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: WanjikuConfig,
    pub storage: Storage,
    pub ussd: Arc<UssdService>,
    pub sms: Arc<SmsService>,
}

impl AppState {
    pub fn new(
        config: WanjikuConfig,
        storage: Storage,
        responder: Arc<dyn ConversationalResponder>,
        messenger: Arc<dyn OutboundMessenger>,
    ) -> Self {
        let ussd = UssdService::new(storage.sessions.clone(), responder.clone(), &config.session);
        let sms = SmsService::new(storage.messages.clone(), messenger, responder);
        Self {
            config,
            storage,
            ussd: Arc::new(ussd),
            sms: Arc::new(sms),
        }
    }

    /// Build storage and collaborators from config. Missing responder or SMS
    /// credentials degrade those features instead of refusing to start.
    pub async fn from_config(config: WanjikuConfig) -> Result<Self, WanjikuError> {
        let storage = create_storage(&config.database).await?;
        tracing::info!("Storage backend: {}", config.database.backend);

        let responder = match create_responder(&config.responder) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Free-text responder unavailable, intents only: {}", e);
                create_responder(&ResponderConfig {
                    backend: "none".to_string(),
                    ..config.responder.clone()
                })?
            }
        };
        tracing::info!("Free-text responder: {}", responder.name());

        let messenger: Arc<dyn OutboundMessenger> =
            match AfricasTalkingMessenger::new(config.messenger.clone()) {
                Ok(m) => Arc::new(m),
                Err(e) => {
                    tracing::warn!("SMS sending disabled: {}", e);
                    Arc::new(UnconfiguredMessenger)
                }
            };

        Ok(Self::new(config, storage, responder, messenger))
    }
}
