pub mod sms;
pub mod sweep;
pub mod ussd;
