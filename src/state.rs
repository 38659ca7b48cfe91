use teloxide::adaptors::Throttle;
use teloxide::Bot;

use crate::storage::StorageManager;
use crate::service::ServiceRegistry;

use crate::{config::AppConfig, error::BotResult};

#[derive(Clone)]
pub struct AppState {
    pub config: &'static AppConfig,
    pub storage: StorageManager,
    pub services: ServiceRegistry,
}

impl AppState {
    pub async fn new(config: &'static AppConfig, bot: Throttle<Bot>) -> BotResult<Self> {
        let storage = StorageManager::new(
            &config.storage.turso_url,
            &config.storage.turso_token,
            config.storage.redis_url.as_deref(),
        )
        .await?;

        let services = ServiceRegistry::new(config, &storage, bot).await?;

        Ok(Self {
            config,
            storage,
            services,
        })
    }

    pub fn is_admin(&self, telegram_id: i64) -> bool {
        self.config.telegram.admin_id == telegram_id
    }
}
