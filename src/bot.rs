use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use teloxide::adaptors::throttle::Limits;
use teloxide::adaptors::Throttle;
use teloxide::prelude::*;
use teloxide::Bot;

use crate::config::AppConfig;
use crate::error::{BotError, BotResult, HandlerResult};
use crate::handler::get_handler;
use crate::runtime::Scheduler;
use crate::state::AppState;
use crate::webhook::{self, WebhookState};

const INTERACTION_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

pub struct BotService {
    pub bot: Throttle<Bot>,
    pub state: AppState,
}

impl BotService {
    pub async fn new(config: &'static AppConfig) -> BotResult<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| BotError::Other(anyhow::anyhow!("Failed to build Telegram client: {}", e)))?;

        let bot = Bot::with_client(config.telegram.token.clone(), client).throttle(Limits::default());

        info!("Initializing AppState...");
        let state = AppState::new(config, bot.clone()).await?;
        info!("AppState initialized");

        Ok(Self { bot, state })
    }

    pub async fn start(&self, addr: SocketAddr) -> HandlerResult<()> {
        info!("Testing connection to Telegram API...");
        match self.bot.get_me().await {
            Ok(_) => info!("Successfully connected to Telegram API"),
            Err(e) => {
                error!("Failed to connect to Telegram API: {:?}", e);
                return Err(anyhow::anyhow!("Failed to connect to Telegram API: {}", e).into());
            }
        }

        crate::command::setup_user_commands(&self.bot).await?;

        let config = self.state.config;
        let services = &self.state.services;

        let _jobs = Scheduler::new()
            .add_job(
                services.sweep.clone(),
                Duration::from_secs(config.scheduler.sweep_interval_secs),
            )
            .add_job(Arc::new(services.interaction.clone()), INTERACTION_CLEANUP_INTERVAL)
            .start();

        let router = webhook::router(
            WebhookState::new(config, &self.state.storage, services),
            &config.webhook.path_prefix,
        );
        tokio::spawn(async move {
            if let Err(e) = webhook::serve(router, addr).await {
                error!("Webhook server failed: {}", e);
            }
        });

        Dispatcher::builder(self.bot.clone(), get_handler())
            .dependencies(dptree::deps![self.state.clone()])
            .error_handler(LoggingErrorHandler::with_custom_text(
                "An error has occurred in the dispatcher",
            ))
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        Ok(())
    }
}
