mod telegram;

pub use telegram::TelegramGateway;

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Telegram API error: {0}")]
    Api(String),
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        GatewayError::Transport(error.to_string())
    }
}

/// One entry from `getUpdates`. `update_id` is the poll offset cursor;
/// anything that is not a plain message is carried as `None` and skipped
/// downstream.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub from: Option<Sender>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Address of a message the bot itself sent, kept around for in-place edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle {
    pub chat_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

pub struct AudioUpload<'a> {
    pub path: &'a Path,
    pub title: &'a str,
    pub performer: &'a str,
    pub duration_seconds: u64,
}

#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    async fn get_me(&self) -> Result<BotIdentity, GatewayError>;

    /// Long poll for new updates. Blocks server-side up to `timeout_secs`
    /// and returns zero or more updates ordered by `update_id`.
    async fn fetch_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>, GatewayError>;

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<MessageHandle, GatewayError>;

    async fn edit_message(&self, handle: MessageHandle, text: &str) -> Result<(), GatewayError>;

    async fn delete_message(&self, handle: MessageHandle) -> Result<(), GatewayError>;

    async fn send_audio(&self, chat_id: i64, audio: AudioUpload<'_>) -> Result<(), GatewayError>;
}
