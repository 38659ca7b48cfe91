mod error;
mod model;
mod repository;

pub use error::SubscriptionError;
pub use model::{next_sequence, NewSubscription, Subscription, SubscriptionState};
pub(crate) use repository::insert_subscription;
pub use repository::{SubscriptionRepository, TursoSubscriptionRepository};

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use super::customer::CustomerRepository;
use crate::utils::mask_id;

pub const MAX_NAME_LENGTH: usize = 50;

static FORBIDDEN_NAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>"'&]"#).expect("valid regex"));

/// Trims and checks a user-supplied subscription name.
pub fn validate_name(raw: &str) -> Result<String, SubscriptionError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(SubscriptionError::InvalidName("name is empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(SubscriptionError::InvalidName(format!(
            "name is longer than {} characters",
            MAX_NAME_LENGTH
        )));
    }
    if FORBIDDEN_NAME_CHARS.is_match(name) {
        return Err(SubscriptionError::InvalidName("name contains forbidden characters".to_string()));
    }
    Ok(name.to_string())
}

#[derive(Clone)]
pub struct SubscriptionService {
    customers: Arc<dyn CustomerRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl SubscriptionService {
    pub fn new(customers: Arc<dyn CustomerRepository>, subscriptions: Arc<dyn SubscriptionRepository>) -> Self {
        info!("Initializing SubscriptionService...");
        info!("SubscriptionService initialized");
        Self {
            customers,
            subscriptions,
        }
    }

    pub async fn list_active(&self, telegram_id: i64) -> Result<Vec<Subscription>, SubscriptionError> {
        let customer = self
            .customers
            .find_by_telegram_id(telegram_id)
            .await?
            .ok_or(SubscriptionError::CustomerNotFound(telegram_id))?;

        Ok(self.subscriptions.find_active(customer.id).await?)
    }

    pub async fn rename(&self, telegram_id: i64, subscription_id: i64, raw_name: &str) -> Result<Subscription, SubscriptionError> {
        let name = validate_name(raw_name)?;
        let mut subscription = self.find_owned(telegram_id, subscription_id).await?;

        self.subscriptions.rename(subscription.id, &name).await?;
        subscription.name = name;
        Ok(subscription)
    }

    pub async fn deactivate(&self, telegram_id: i64, subscription_id: i64) -> Result<Subscription, SubscriptionError> {
        let mut subscription = self.find_owned(telegram_id, subscription_id).await?;

        if self.subscriptions.deactivate(subscription.id).await? {
            info!("Subscription {} deactivated by {}", subscription.id, mask_id(telegram_id));
        }
        subscription.is_active = false;
        Ok(subscription)
    }

    /// Looks the subscription up and checks it belongs to the customer with `telegram_id`.
    pub async fn find_owned(&self, telegram_id: i64, subscription_id: i64) -> Result<Subscription, SubscriptionError> {
        let customer = self
            .customers
            .find_by_telegram_id(telegram_id)
            .await?
            .ok_or(SubscriptionError::CustomerNotFound(telegram_id))?;

        let subscription = self
            .subscriptions
            .find_by_id(subscription_id)
            .await?
            .ok_or(SubscriptionError::NotFound(subscription_id))?;

        if subscription.customer_id != customer.id {
            return Err(SubscriptionError::NotOwner(subscription_id));
        }
        Ok(subscription)
    }
}
