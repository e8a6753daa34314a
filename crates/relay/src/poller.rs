//! Polling scheduler for the REST-polled networks.
//!
//! One tick every `interval`: iterate all monitored groups, fetch comments
//! newer than each group's cursor, route them through the gate-or-cache
//! branch, then drain the pending cache. A tick always runs to completion;
//! missed timer fires are delayed, never stacked.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;

use groupwatch_common::error::AppError;
use groupwatch_common::types::{Comment, MonitoredGroup};
use groupwatch_sources::{CommentSource, SourceRegistry};

use crate::pending::PendingCache;
use crate::store::GroupStore;

/// Pause between consecutive groups within a tick (per-network rate limits).
const GROUP_SPACING: Duration = Duration::from_secs(5);
/// Wait before the single retry of a failed fetch.
const RETRY_DELAY: Duration = Duration::from_secs(15);

pub struct Poller {
    groups: GroupStore,
    registry: Arc<SourceRegistry>,
    cache: Arc<PendingCache>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        groups: GroupStore,
        registry: Arc<SourceRegistry>,
        cache: Arc<PendingCache>,
        interval: Duration,
    ) -> Self {
        Self {
            groups,
            registry,
            cache,
            interval,
        }
    }

    pub async fn run(self) {
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = self.interval.as_secs(), "Poller started");

        loop {
            timer.tick().await;
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "Polling tick failed");
            }
        }
    }

    /// One full polling pass over all monitored groups.
    pub async fn tick(&self) -> Result<(), AppError> {
        let groups = self.groups.get_all().await?;

        for (i, group) in groups.iter().enumerate() {
            if group.network.is_push() {
                continue;
            }
            let Some(source) = self.registry.get(group.network) else {
                tracing::debug!(
                    network = %group.network,
                    group_id = %group.group_id,
                    "No source configured for network, skipping group"
                );
                continue;
            };

            if i > 0 {
                tokio::time::sleep(GROUP_SPACING).await;
            }

            let comments = match self.fetch_with_retry(source, group).await {
                Ok(comments) => comments,
                Err(e) => {
                    tracing::warn!(
                        network = %group.network,
                        group_id = %group.group_id,
                        error = %e,
                        "Fetch failed twice, skipping group until next tick"
                    );
                    continue;
                }
            };

            let now = Utc::now();
            if !comments.is_empty() {
                tracing::info!(
                    network = %group.network,
                    group_id = %group.group_id,
                    count = comments.len(),
                    "New comments fetched"
                );
                if let Err(e) = self.cache.deliver_or_enqueue(group, comments, now).await {
                    // Cursor stays put so these comments are re-fetched.
                    tracing::warn!(
                        group_id = %group.group_id,
                        error = %e,
                        "Caching failed, holding cursor back"
                    );
                    continue;
                }
            }

            // Advance even on zero-comment passes, so an inactive group's
            // history is not re-scanned forever.
            if let Err(e) = self.groups.update_cursor(group.id, now.timestamp()).await {
                tracing::warn!(group_id = %group.group_id, error = %e, "Cursor update failed");
            }
        }

        self.cache.drain_due(Utc::now()).await
    }

    async fn fetch_with_retry(
        &self,
        source: &dyn CommentSource,
        group: &MonitoredGroup,
    ) -> Result<Vec<Comment>, AppError> {
        match source.fetch_new_comments(group).await {
            Ok(comments) => Ok(comments),
            Err(first) => {
                tracing::warn!(
                    network = %group.network,
                    group_id = %group.group_id,
                    error = %first,
                    retry_in_secs = RETRY_DELAY.as_secs(),
                    "Fetch failed, retrying once"
                );
                tokio::time::sleep(RETRY_DELAY).await;
                source.fetch_new_comments(group).await
            }
        }
    }
}
