use thiserror::Error;

/// Startup failures surfaced to the binary.
#[derive(Error, Debug)]
pub enum WanjikuError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Responder error: {0}")]
    Responder(#[from] crate::responder::ResponderError),
}
