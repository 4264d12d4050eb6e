use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "TelegramBot/1.0";

pub fn create_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_keepalive(Duration::from_secs(30))
        .user_agent(DEFAULT_USER_AGENT)
        .build()
        .expect("Failed to build client")
}

#[async_trait]
pub trait HttpService: Send + Sync + 'static {
    /// Lightweight reachability probe. A link counts as good only when a
    /// plain GET answers 200; malformed urls and transport failures both
    /// count as unreachable.
    async fn is_reachable(&self, url: &str) -> bool;
}

pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpService for HttpClient {
    async fn is_reachable(&self, url: &str) -> bool {
        if Url::parse(url).is_err() {
            return false;
        }
        match self.client.get(url).send().await {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(_) => false,
        }
    }
}
