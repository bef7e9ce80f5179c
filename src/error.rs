use teloxide::{ApiError, RequestError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CourierError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CourierError>;

/// Failure to deliver a single message (or callback answer) to the platform.
///
/// Surfaced to the caller as-is; nothing in the crate retries on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("chat not found or not reachable: {0}")]
    InvalidChat(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("Telegram API error: {0}")]
    Api(String),
}

impl From<RequestError> for DeliveryError {
    fn from(e: RequestError) -> Self {
        match &e {
            RequestError::Api(ApiError::ChatNotFound) | RequestError::MigrateToChatId(_) => {
                DeliveryError::InvalidChat(e.to_string())
            }
            RequestError::RetryAfter(_) => DeliveryError::RateLimited(e.to_string()),
            RequestError::Network(_) | RequestError::Io(_) => DeliveryError::Network(e.to_string()),
            _ => DeliveryError::Api(e.to_string()),
        }
    }
}

pub type DeliveryResult = std::result::Result<(), DeliveryError>;
