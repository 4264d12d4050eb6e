use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::gateway::IncomingMessage;

/// Worker-local job derived from one inbound message. Lives only for the
/// duration of a single pipeline run; never persisted.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: String,
    pub user_id: i64,
    pub chat_id: i64,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl DownloadJob {
    /// Returns `None` for messages without a sender (channel posts etc.).
    pub fn from_message(message: &IncomingMessage, url: &str) -> Option<Self> {
        let user_id = message.from.as_ref()?.id;
        Some(Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            chat_id: message.chat.id,
            url: url.to_string(),
            created_at: Utc::now(),
        })
    }
}
