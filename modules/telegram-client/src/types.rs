use serde::Deserialize;

use crate::error::{Result, TelegramError};

/// Envelope every Bot API method returns.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn into_result(self) -> Result<T> {
        if !self.ok {
            return Err(TelegramError::NotOk(
                self.description.unwrap_or_else(|| "no description".to_string()),
            ));
        }
        self.result
            .ok_or_else(|| TelegramError::NotOk("ok=true but result missing".to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
}

/// An incoming operator message. `reply_to_message` carries the notification
/// the operator replied to, which the approval grammar resolves ids from.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub text: Option<String>,
    pub chat: Chat,
    pub reply_to_message: Option<Box<IncomingMessage>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ok_response_becomes_error() {
        let resp: ApiResponse<SentMessage> = serde_json::from_str(
            r#"{"ok": false, "description": "Bad Request: chat not found"}"#,
        )
        .unwrap();
        assert!(resp.into_result().is_err());
    }

    #[test]
    fn reply_to_message_round_trips() {
        let raw = r##"{
            "update_id": 7,
            "message": {
                "message_id": 12,
                "text": "1",
                "chat": {"id": 99},
                "reply_to_message": {
                    "message_id": 11,
                    "text": "#42 pending: nice work",
                    "chat": {"id": 99}
                }
            }
        }"##;
        let update: Update = serde_json::from_str(raw).unwrap();
        let msg = update.message.unwrap();
        assert_eq!(msg.reply_to_message.unwrap().message_id, 11);
    }
}
