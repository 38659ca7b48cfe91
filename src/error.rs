use shuttle_runtime::Error as ShuttleError;
use teloxide::{ApiError, RequestError};

use crate::config::ConfigError;
use crate::runtime::RuntimeError;
use crate::service::notify::NotifyError;
use crate::service::payment::GatewayError;
use crate::service::provision::ProvisionError;
use crate::service::purchase::PaymentError;
use crate::service::subscription::SubscriptionError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("App state error: {0}")]
    AppStateError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Notify error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Runtime error: {0}")]
    RuntimeError(#[from] RuntimeError),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error(transparent)]
    Other(anyhow::Error),
}

impl From<BotError> for ShuttleError {
    fn from(error: BotError) -> Self {
        ShuttleError::Custom(anyhow::anyhow!(error))
    }
}

impl From<ConfigError> for ShuttleError {
    fn from(error: ConfigError) -> Self {
        BotError::from(error).into()
    }
}

impl From<BotError> for RequestError {
    fn from(error: BotError) -> Self {
        RequestError::Api(ApiError::Unknown(error.to_string()))
    }
}

impl From<anyhow::Error> for BotError {
    fn from(error: anyhow::Error) -> Self {
        BotError::Other(error)
    }
}

pub type HandlerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub type BotResult<T> = Result<T, BotError>;
