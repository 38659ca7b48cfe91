use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Customer not found: {0}")]
    CustomerNotFound(i64),
    #[error("Subscription not found: {0}")]
    NotFound(i64),
    #[error("Subscription {0} belongs to another customer")]
    NotOwner(i64),
    #[error("Invalid subscription name: {0}")]
    InvalidName(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
