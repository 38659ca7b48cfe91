use bot::BotService;
use config::{build_config, AppConfig};

extern crate pretty_env_logger;
#[macro_use]
extern crate log;
#[macro_use]
extern crate rust_i18n;

i18n!("locales", fallback = "en");

mod bot;
mod command;
mod config;
mod error;
mod handler;
mod runtime;
mod service;
mod state;
mod storage;
#[cfg(test)]
mod testing;
mod utils;
mod webhook;

#[shuttle_runtime::main]
async fn shuttle_main(
    #[shuttle_runtime::Secrets] secrets: shuttle_runtime::SecretStore,
) -> Result<BotService, shuttle_runtime::Error> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = pretty_env_logger::try_init_timed();

    info!("Starting bot...");

    AppConfig::set_global(build_config(&secrets)?)?;
    let config = AppConfig::get()?;

    info!("Initializing BotService...");
    let bot_service = BotService::new(config).await?;
    info!("Bot instance created");

    Ok(bot_service)
}

#[shuttle_runtime::async_trait]
impl shuttle_runtime::Service for BotService {
    async fn bind(self, addr: std::net::SocketAddr) -> Result<(), shuttle_runtime::Error> {
        self.start(addr)
            .await
            .map_err(|e| shuttle_runtime::Error::Custom(anyhow::anyhow!("Bot stopped: {}", e)))?;

        Ok(())
    }
}
