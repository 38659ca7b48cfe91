use async_trait::async_trait;
use std::time::Duration;

use crate::{
    runtime::{CacheManager, CacheOptions, CacheType, RuntimeError, ScheduledJob},
    storage::StorageError,
};

mod model;
pub use model::{BroadcastAudience, PaymentMessage, PendingAction};

/// Short-lived per-chat state: pending text input and payment prompt messages.
#[derive(Clone)]
pub struct InteractionService {
    cache: CacheManager,
    pending_ttl: Duration,
    payment_message_ttl: Duration,
}

impl InteractionService {
    pub fn new(cache: CacheManager, pending_ttl: Duration, payment_message_ttl: Duration) -> Self {
        info!("Initializing InteractionService...");
        info!("InteractionService initialized");
        Self {
            cache,
            pending_ttl,
            payment_message_ttl,
        }
    }

    fn pending_options(&self) -> CacheOptions {
        CacheOptions {
            cache_type: CacheType::Both,
            ttl: Some(self.pending_ttl),
            prefix: Some("pending".to_string()),
        }
    }

    fn payment_options(&self) -> CacheOptions {
        CacheOptions {
            cache_type: CacheType::Both,
            ttl: Some(self.payment_message_ttl),
            prefix: Some("payment_message".to_string()),
        }
    }

    pub async fn set_pending(&self, chat_id: i64, action: &PendingAction) -> Result<(), StorageError> {
        self.cache
            .set(&chat_id.to_string(), action, &self.pending_options())
            .await
    }

    pub async fn pending(&self, chat_id: i64) -> Result<Option<PendingAction>, StorageError> {
        self.cache.get(&chat_id.to_string(), &self.pending_options()).await
    }

    pub async fn take_pending(&self, chat_id: i64) -> Result<Option<PendingAction>, StorageError> {
        let action = self.pending(chat_id).await?;
        if action.is_some() {
            self.clear_pending(chat_id).await?;
        }
        Ok(action)
    }

    pub async fn clear_pending(&self, chat_id: i64) -> Result<(), StorageError> {
        self.cache.del(&chat_id.to_string(), &self.pending_options()).await
    }

    pub async fn remember_payment_message(&self, purchase_id: i64, message: PaymentMessage) -> Result<(), StorageError> {
        self.cache
            .set(&purchase_id.to_string(), &message, &self.payment_options())
            .await
    }

    pub async fn take_payment_message(&self, purchase_id: i64) -> Result<Option<PaymentMessage>, StorageError> {
        let options = self.payment_options();
        let message = self.cache.get(&purchase_id.to_string(), &options).await?;
        if message.is_some() {
            self.cache.del(&purchase_id.to_string(), &options).await?;
        }
        Ok(message)
    }

    pub fn cleanup_expired(&self) -> usize {
        self.cache.purge_expired()
    }
}

#[async_trait]
impl ScheduledJob for InteractionService {
    fn name(&self) -> &'static str {
        "interaction_cleanup"
    }

    async fn run(&self) -> Result<(), RuntimeError> {
        let removed = self.cleanup_expired();
        if removed > 0 {
            debug!("Removed {} expired interaction entries", removed);
        }
        Ok(())
    }
}
