use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{AudioUpload, BotIdentity, Gateway, GatewayError, MessageHandle, Update};

const API_BASE: &str = "https://api.telegram.org";

/// Headroom on top of the long-poll timeout so the HTTP layer does not
/// give up before the server answers.
const LONG_POLL_GRACE_SECS: u64 = 10;

/// Audio uploads can be large; give them their own generous timeout.
const UPLOAD_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, GatewayError> {
        if self.ok {
            self.result
                .ok_or_else(|| GatewayError::Api("response marked ok but carried no result".to_string()))
        } else {
            Err(GatewayError::Api(
                self.description.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

pub struct TelegramGateway {
    client: reqwest::Client,
    base: String,
    token: String,
}

impl TelegramGateway {
    pub fn new(client: reqwest::Client, token: &str) -> Self {
        Self {
            client,
            base: API_BASE.to_string(),
            token: token.to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base, self.token, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, payload: serde_json::Value) -> Result<T, GatewayError> {
        let response: ApiResponse<T> = self
            .client
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;
        response.into_result()
    }
}

#[async_trait]
impl Gateway for TelegramGateway {
    async fn get_me(&self) -> Result<BotIdentity, GatewayError> {
        self.call("getMe", json!({})).await
    }

    async fn fetch_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>, GatewayError> {
        let mut payload = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            payload["offset"] = json!(offset);
        }

        let response: ApiResponse<Vec<Update>> = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(Duration::from_secs(timeout_secs + LONG_POLL_GRACE_SECS))
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;
        response.into_result()
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<MessageHandle, GatewayError> {
        let sent: SentMessage = self
            .call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(MessageHandle {
            chat_id,
            message_id: sent.message_id,
        })
    }

    async fn edit_message(&self, handle: MessageHandle, text: &str) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                json!({
                    "chat_id": handle.chat_id,
                    "message_id": handle.message_id,
                    "text": text,
                }),
            )
            .await?;
        Ok(())
    }

    async fn delete_message(&self, handle: MessageHandle) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .call(
                "deleteMessage",
                json!({ "chat_id": handle.chat_id, "message_id": handle.message_id }),
            )
            .await?;
        Ok(())
    }

    async fn send_audio(&self, chat_id: i64, audio: AudioUpload<'_>) -> Result<(), GatewayError> {
        let bytes = tokio::fs::read(audio.path).await?;
        let file_name = audio
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("title", audio.title.to_string())
            .text("performer", audio.performer.to_string())
            .text("duration", audio.duration_seconds.to_string())
            .part("audio", part);

        let response: ApiResponse<serde_json::Value> = self
            .client
            .post(self.method_url("sendAudio"))
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;
        response.into_result().map(|_| ())
    }
}
