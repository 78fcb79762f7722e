pub mod config;
pub mod db;
pub mod error;
pub mod menu;
pub mod messenger;
pub mod models;
pub mod protocol;
pub mod responder;
pub mod store;

pub use config::WanjikuConfig;
pub use error::WanjikuError;
pub use messenger::{AfricasTalkingMessenger, DeliveryReceipt, MessengerError, OutboundMessenger};
pub use models::{SessionStatus, SmsMessage, UssdSession};
pub use responder::{
    create_responder, ConversationalResponder, IntentResponder, OpenAiResponder, ResponderError,
};
pub use store::{create_storage, MessageLog, SessionStore, Storage, StoreError};
