//! Thin Telegram Bot API client over plain HTTPS.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use groupwatch_common::error::AppError;
use groupwatch_common::transport::Transport;

use crate::types::{TgUpdate, TgUser};

const API_BASE: &str = "https://api.telegram.org";

/// Request timeout for ordinary (non-long-poll) calls.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

pub struct TelegramApi {
    token: String,
    http: reqwest::Client,
}

#[derive(Debug, serde::Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
struct TgEnvelope<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Serialize)]
struct SendMessageParams<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i64>,
}

#[derive(Serialize)]
struct GetUpdatesParams {
    offset: i64,
    timeout: u64,
}

impl TelegramApi {
    pub fn new(token: String) -> Self {
        Self {
            token,
            // No global timeout: getUpdates long-polls past any sane default.
            http: reqwest::Client::new(),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &impl Serialize,
        timeout: std::time::Duration,
    ) -> Result<T, AppError> {
        let envelope: TgEnvelope<T> = self
            .http
            .post(format!("{API_BASE}/bot{}/{method}", self.token))
            .timeout(timeout)
            .json(params)
            .send()
            .await?
            .json()
            .await?;

        if !envelope.ok {
            return Err(AppError::Api(format!(
                "Telegram API error in {method}: {}",
                envelope.description.as_deref().unwrap_or("unknown error")
            )));
        }
        envelope
            .result
            .ok_or_else(|| AppError::Api(format!("Telegram API returned no result for {method}")))
    }

    /// The bot's own identity; its id feeds self-loop prevention.
    pub async fn get_me(&self) -> Result<TgUser, AppError> {
        self.call("getMe", &serde_json::json!({}), REQUEST_TIMEOUT)
            .await
    }

    /// Long-poll for updates. Blocks up to `timeout_secs` server-side.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<TgUpdate>, AppError> {
        self.call(
            "getUpdates",
            &GetUpdatesParams {
                offset,
                timeout: timeout_secs,
            },
            std::time::Duration::from_secs(timeout_secs + 10),
        )
        .await
    }
}

#[async_trait]
impl Transport for TelegramApi {
    async fn send_text(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        text: &str,
    ) -> Result<(), AppError> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                &SendMessageParams {
                    chat_id,
                    text,
                    parse_mode: "Markdown",
                    message_thread_id: thread_id,
                },
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(())
    }
}
