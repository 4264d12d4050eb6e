use std::sync::Arc;

use bot::BotService;
use config::AppConfig;
use state::AppState;

extern crate pretty_env_logger;
#[macro_use]
extern crate log;
#[macro_use]
extern crate rust_i18n;

i18n!("locales", fallback = "en");

mod bot;
mod commands;
mod config;
mod error;
mod fetcher;
mod gateway;
mod runtime;
mod state;
mod storage;
mod utils;

#[cfg(test)]
mod tests;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = pretty_env_logger::try_init_timed();

    info!("Starting bot...");

    let config = AppConfig::from_env()?;
    let state = Arc::new(AppState::new(config).await?);

    BotService::new(state).run().await?;

    Ok(())
}
