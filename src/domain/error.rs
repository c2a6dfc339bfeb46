use thiserror::Error;

/// Top-level error type for the shipper binary.
#[derive(Error, Debug)]
pub enum ShipperError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::app::ConfigError),

    #[error("Initialization error: {0}")]
    Initialization(#[from] crate::app::InitializationError),

    #[error("Client error: {0}")]
    Client(#[from] crate::sender::ClsError),

    #[error("Input error: {0}")]
    Input(#[from] std::io::Error),

    #[error("Shutdown error: {0}")]
    Shutdown(String),
}
