use thiserror::Error;

pub type Result<T> = std::result::Result<T, TelegramError>;

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Telegram API returned ok=false: {0}")]
    NotOk(String),
}
