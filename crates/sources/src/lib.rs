//! Comment sources for the polled social networks.
//!
//! Each network client implements [`CommentSource`] and is looked up through
//! the [`SourceRegistry`] by the polling scheduler. Sources return canonical,
//! already-normalized [`Comment`]s; everything network-specific (auth, wire
//! formats, pagination limits) stays inside the client.

pub mod normalize;
pub mod ok;
pub mod vk;

use std::collections::HashMap;

use async_trait::async_trait;
use groupwatch_common::error::AppError;
use groupwatch_common::types::{Comment, MonitoredGroup, Network};

/// Resolved group metadata, used when registering a group for monitoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    /// Canonical numeric id on the source network, as a string.
    pub external_id: String,
    pub name: String,
    pub screen_name: Option<String>,
}

/// A polled social network.
#[async_trait]
pub trait CommentSource: Send + Sync {
    fn network(&self) -> Network;

    /// Resolve a user-supplied group identifier (numeric id or short name)
    /// into canonical metadata.
    async fn fetch_group_info(&self, external_id: &str) -> Result<GroupInfo, AppError>;

    /// Fetch comments strictly newer than the group's `last_check` cursor.
    ///
    /// Returned comments are normalized and carry the group's internal id.
    async fn fetch_new_comments(&self, group: &MonitoredGroup) -> Result<Vec<Comment>, AppError>;
}

/// Registry of available comment sources, keyed by network.
///
/// Networks without a registered source (missing credentials, or push-only
/// networks like Telegram) simply resolve to `None` and are skipped by the
/// poller.
#[derive(Default)]
pub struct SourceRegistry {
    sources: HashMap<Network, Box<dyn CommentSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Box<dyn CommentSource>) {
        let network = source.network();
        tracing::info!(%network, "Registered comment source");
        self.sources.insert(network, source);
    }

    pub fn get(&self, network: Network) -> Option<&dyn CommentSource> {
        self.sources.get(&network).map(|s| s.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Strict cursor comparison shared by all sources: a comment stamped exactly
/// at the cursor is already seen.
pub fn is_newer_than_cursor(timestamp: i64, cursor: i64) -> bool {
    timestamp > cursor
}
