//! Pending-comment cache and the shared gate-or-deliver routing.
//!
//! Both the polling scheduler and the push handler route fresh comments
//! through [`PendingCache::deliver_or_enqueue`]: if the schedule gate is open
//! the comments go straight out through the transport, otherwise they are
//! persisted as pending and delivered later by [`PendingCache::drain_due`].

use std::sync::Arc;

use chrono::{DateTime, Utc};

use groupwatch_common::error::AppError;
use groupwatch_common::settings::SettingsHandle;
use groupwatch_common::transport::Transport;
use groupwatch_common::types::{Comment, MonitoredGroup};

use crate::render;
use crate::schedule;
use crate::store::{GroupStore, PendingStore};

/// Pending comments older than this are abandoned, not delivered.
pub const PENDING_WINDOW_SECS: i64 = 7 * 24 * 60 * 60;

pub struct PendingCache {
    groups: GroupStore,
    pending: PendingStore,
    transport: Arc<dyn Transport>,
    settings: Arc<SettingsHandle>,
}

impl PendingCache {
    pub fn new(
        groups: GroupStore,
        pending: PendingStore,
        transport: Arc<dyn Transport>,
        settings: Arc<SettingsHandle>,
    ) -> Self {
        Self {
            groups,
            pending,
            transport,
            settings,
        }
    }

    /// Deliver a batch immediately if the gate is open, otherwise enqueue it.
    ///
    /// Send failures log and continue (the comment is lost, like any
    /// delivered-inline comment would be on a crash); an enqueue failure is
    /// returned so the caller can hold the cursor back.
    pub async fn deliver_or_enqueue(
        &self,
        group: &MonitoredGroup,
        comments: Vec<Comment>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let settings = self.settings.get().await;

        if schedule::is_allowed(now, &settings.schedule) {
            let tz = render::display_timezone(&settings.schedule.timezone);
            for comment in &comments {
                let text = render::render(group, comment, settings.style, now, tz);
                if let Err(e) = self
                    .transport
                    .send_text(settings.chat_id, settings.thread_id, &text)
                    .await
                {
                    tracing::warn!(
                        network = %comment.network,
                        comment_id = %comment.comment_id,
                        error = %e,
                        "Failed to send notification"
                    );
                }
            }
            return Ok(());
        }

        tracing::info!(
            group_id = group.id,
            count = comments.len(),
            "Outside delivery window, caching comments"
        );
        self.enqueue(comments, now).await
    }

    /// Persist comments as pending, stamped with the observation time.
    pub async fn enqueue(
        &self,
        comments: Vec<Comment>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        for mut comment in comments {
            comment.is_pending = true;
            comment.received_at = now.timestamp();
            self.pending.upsert(&comment).await?;
        }
        Ok(())
    }

    /// Deliver cached comments once the gate opens.
    ///
    /// No-op while the gate denies. Comments whose owning group no longer
    /// exists are deleted wholesale. Per-item failures log and continue; a
    /// drain never aborts on one bad comment.
    pub async fn drain_due(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        let settings = self.settings.get().await;
        if !schedule::is_allowed(now, &settings.schedule) {
            return Ok(());
        }

        let cutoff = now.timestamp() - PENDING_WINDOW_SECS;
        let due = self.pending.select_pending_received_after(cutoff).await?;
        if due.is_empty() {
            return Ok(());
        }

        tracing::info!(count = due.len(), "Draining pending comments");

        let tz = render::display_timezone(&settings.schedule.timezone);
        for comment in due {
            let group = match self.groups.get_by_internal_id(comment.group_id).await {
                Ok(Some(group)) => group,
                Ok(None) => {
                    tracing::warn!(
                        group_id = comment.group_id,
                        "Pending comments reference a removed group, deleting them"
                    );
                    if let Err(e) = self.pending.delete_all_for_group(comment.group_id).await {
                        tracing::warn!(group_id = comment.group_id, error = %e, "Orphan cleanup failed");
                    }
                    continue;
                }
                Err(e) => {
                    tracing::warn!(group_id = comment.group_id, error = %e, "Group lookup failed");
                    continue;
                }
            };

            let text = render::render(&group, &comment, settings.style, now, tz);
            if let Err(e) = self
                .transport
                .send_text(settings.chat_id, settings.thread_id, &text)
                .await
            {
                tracing::warn!(
                    network = %comment.network,
                    comment_id = %comment.comment_id,
                    error = %e,
                    "Failed to deliver pending comment, will retry next drain"
                );
                continue;
            }

            if let Err(e) = self.pending.clear_pending(&comment).await {
                tracing::warn!(
                    network = %comment.network,
                    comment_id = %comment.comment_id,
                    error = %e,
                    "Delivered but failed to clear pending flag"
                );
            }
        }

        Ok(())
    }
}
