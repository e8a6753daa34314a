//! Push comment handling for Telegram groups.
//!
//! Telegram never gets polled: every inbound message in a monitored chat is
//! itself the comment, handled here as it arrives.

use std::sync::Arc;

use chrono::Utc;

use groupwatch_common::error::AppError;
use groupwatch_common::types::{Comment, Network};
use groupwatch_sources::normalize;
use groupwatch_telegram::types::TgMessage;

use crate::pending::PendingCache;
use crate::store::GroupStore;

/// Telegram's service account, which posts on behalf of linked channels and
/// anonymous admins.
const TELEGRAM_SERVICE_ACCOUNT_ID: i64 = 777000;

pub struct PushHandler {
    /// The bot's own user id; its messages must not loop back as comments.
    self_id: i64,
    groups: GroupStore,
    cache: Arc<PendingCache>,
}

impl PushHandler {
    pub fn new(self_id: i64, groups: GroupStore, cache: Arc<PendingCache>) -> Self {
        Self {
            self_id,
            groups,
            cache,
        }
    }

    /// Turn an inbound message into a comment and route it.
    ///
    /// Silently drops: messages without a sender, the bot's own messages,
    /// and Telegram service-account messages. Messages in chats that are not
    /// monitored are dropped with a debug log.
    pub async fn handle_message(&self, msg: &TgMessage) -> Result<(), AppError> {
        let Some(from) = &msg.from else {
            return Ok(());
        };
        if from.id == self.self_id || from.id == TELEGRAM_SERVICE_ACCOUNT_ID {
            return Ok(());
        }

        let Some(group) = self
            .groups
            .get_by_network_and_id(Network::Tg, &msg.chat.id.to_string())
            .await?
        else {
            tracing::debug!(chat_id = msg.chat.id, "Message in unmonitored chat, ignoring");
            return Ok(());
        };

        let now = Utc::now();
        let comment = Comment {
            network: Network::Tg,
            group_id: group.id,
            comment_id: msg.message_id.to_string(),
            author: normalize::normalize_author(&from.display_name()),
            body: normalize::normalize_body(msg.body()),
            timestamp: msg.date,
            post_url: msg.permalink(),
            is_pending: false,
            received_at: now.timestamp(),
        };

        tracing::info!(
            chat_id = msg.chat.id,
            message_id = msg.message_id,
            group = %group.group_name,
            "New Telegram comment"
        );

        self.cache.deliver_or_enqueue(&group, vec![comment], now).await
    }
}
