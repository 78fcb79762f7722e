pub mod session;
pub mod sms;

pub use session::{SessionStatus, UssdSession};
pub use sms::{SmsDirection, SmsMessage, SmsStatus};
