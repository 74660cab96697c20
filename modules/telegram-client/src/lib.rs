pub mod error;
pub mod types;

pub use error::{Result, TelegramError};
pub use types::{ApiResponse, IncomingMessage, SentMessage, Update};

const BASE_URL: &str = "https://api.telegram.org";

#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// Send a text message to a chat. Returns the sent message id so callers
    /// can correlate later operator replies to it.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64> {
        let resp = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TelegramError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let api_resp: ApiResponse<SentMessage> = resp.json().await?;
        let sent = api_resp.into_result()?;
        tracing::debug!(chat_id, message_id = sent.message_id, "Telegram message sent");
        Ok(sent.message_id)
    }

    /// Long-poll for updates past `offset`. Returns raw updates; the caller
    /// owns offset advancement.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u32) -> Result<Vec<Update>> {
        let resp = self
            .client
            .post(self.method_url("getUpdates"))
            .json(&serde_json::json!({ "offset": offset, "timeout": timeout_secs }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TelegramError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let api_resp: ApiResponse<Vec<Update>> = resp.json().await?;
        api_resp.into_result()
    }
}
