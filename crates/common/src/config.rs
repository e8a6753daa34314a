use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// SQLite connection string
    pub database_url: String,

    /// Path to the mutable settings file (destination, style, schedule)
    pub settings_path: String,

    /// Telegram bot token
    pub telegram_bot_token: String,

    /// VK service access token (VK polling disabled when unset)
    pub vk_access_token: Option<String>,

    /// OK application credentials (OK polling disabled when any is unset)
    pub ok_access_token: Option<String>,
    pub ok_public_key: Option<String>,
    pub ok_secret_key: Option<String>,

    /// Polling pass interval in minutes (default: 10)
    pub poll_interval_mins: u64,

    /// Maximum number of SQLite connections in the pool (default: 5)
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://groupwatch.db".to_string()),
            settings_path: std::env::var("SETTINGS_PATH")
                .unwrap_or_else(|_| "settings.json".to_string()),
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").map_err(|_| {
                anyhow::anyhow!("TELEGRAM_BOT_TOKEN environment variable is required")
            })?,
            vk_access_token: std::env::var("VK_ACCESS_TOKEN").ok(),
            ok_access_token: std::env::var("OK_ACCESS_TOKEN").ok(),
            ok_public_key: std::env::var("OK_PUBLIC_KEY").ok(),
            ok_secret_key: std::env::var("OK_SECRET_KEY").ok(),
            poll_interval_mins: std::env::var("POLL_INTERVAL_MINS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("POLL_INTERVAL_MINS must be a valid u64"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
        })
    }
}
