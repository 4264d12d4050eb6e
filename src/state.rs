use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::BotResult;
use crate::fetcher::{MediaFetcher, YtDlpFetcher};
use crate::gateway::{Gateway, TelegramGateway};
use crate::storage::{RedisUserStore, UserStore};
use crate::utils::http::{self, HttpClient, HttpService};

/// Shared handles, constructed once at startup and passed into each
/// component by `Arc`. No ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn UserStore>,
    pub gateway: Arc<dyn Gateway>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub http: Arc<dyn HttpService>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> BotResult<Self> {
        let store = RedisUserStore::new(&config.storage.redis_url).await?;

        let client = http::create_client();
        let gateway = TelegramGateway::new(client.clone(), &config.telegram.token);
        let fetcher = YtDlpFetcher::new(&config.download.ytdlp_bin, &config.download.dir);
        let probe = HttpClient::new(client);

        Ok(Self {
            store: Arc::new(store),
            gateway: Arc::new(gateway),
            fetcher: Arc::new(fetcher),
            http: Arc::new(probe),
            config,
        })
    }
}
