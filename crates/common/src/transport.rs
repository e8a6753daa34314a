use async_trait::async_trait;

use crate::error::AppError;

/// Outbound message delivery port.
///
/// The pipeline only ever needs "send this Markdown text to that chat"; the
/// concrete Telegram client lives behind this trait so delivery logic can be
/// tested against an in-memory implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        text: &str,
    ) -> Result<(), AppError>;
}
