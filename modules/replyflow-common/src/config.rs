use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // X/Twitter scraper API
    pub x_api_key: String,
    /// The operator's own handle. Posts from this account are never replied to.
    pub x_username: String,

    // LLM provider
    pub llm_api_key: String,
    pub llm_model: String,

    // Telegram operator channel
    pub telegram_bot_token: String,
    pub telegram_chat_id: i64,

    // Discovery tuning
    pub min_followers: i64,
    pub max_followers: i64,
    pub max_candidates_per_cycle: usize,
    pub poll_interval_secs: u64,
    pub search_interval_secs: u64,
    pub feedback_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            x_api_key: required_env("X_API_KEY"),
            x_username: required_env("X_USERNAME"),
            llm_api_key: required_env("LLM_API_KEY"),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            telegram_bot_token: required_env("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: required_env("TELEGRAM_CHAT_ID")
                .parse()
                .expect("TELEGRAM_CHAT_ID must be a number"),
            min_followers: parsed_env("MIN_FOLLOWERS", 50),
            max_followers: parsed_env("MAX_FOLLOWERS", 50_000),
            max_candidates_per_cycle: parsed_env("MAX_CANDIDATES_PER_CYCLE", 5),
            poll_interval_secs: parsed_env("POLL_INTERVAL_SECS", 300),
            search_interval_secs: parsed_env("SEARCH_INTERVAL_SECS", 900),
            feedback_interval_secs: parsed_env("FEEDBACK_INTERVAL_SECS", 3600),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number")),
        Err(_) => default,
    }
}
