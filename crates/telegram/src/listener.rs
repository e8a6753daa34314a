//! Inbound update stream.
//!
//! Long-polls `getUpdates` and forwards message updates to a channel. The
//! connection is re-established on failure with exponential back-off,
//! starting at 5s, doubling, capped at 300s, and reset after any successful
//! receive cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::api::TelegramApi;
use crate::types::TgMessage;

const POLL_TIMEOUT_SECS: u64 = 60;
const RECONNECT_BASE: Duration = Duration::from_secs(5);
const RECONNECT_CAP: Duration = Duration::from_secs(300);

pub struct UpdateListener {
    api: Arc<TelegramApi>,
    /// Unix seconds; messages older than this are leftovers from before the
    /// process started and are dropped.
    started_at: i64,
}

impl UpdateListener {
    pub fn new(api: Arc<TelegramApi>, started_at: i64) -> Self {
        Self { api, started_at }
    }

    /// Run until the receiving side of `tx` is dropped.
    pub async fn run(self, tx: mpsc::Sender<TgMessage>) {
        let mut offset = 0i64;
        let mut delay = RECONNECT_BASE;

        loop {
            match self.api.get_updates(offset, POLL_TIMEOUT_SECS).await {
                Ok(updates) => {
                    delay = RECONNECT_BASE;
                    for update in updates {
                        offset = offset.max(update.update_id + 1);

                        let Some(message) = update.message else {
                            continue;
                        };
                        if message.date < self.started_at {
                            continue;
                        }
                        if tx.send(message).await.is_err() {
                            tracing::info!("Update consumer gone, stopping listener");
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_in_secs = delay.as_secs(),
                        "Telegram update stream failed, reconnecting"
                    );
                    tokio::time::sleep(delay).await;
                    delay = next_reconnect_delay(delay);
                }
            }
        }
    }
}

fn next_reconnect_delay(current: Duration) -> Duration {
    (current * 2).min(RECONNECT_CAP)
}
