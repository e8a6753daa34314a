//! Integration tests for the relay pipeline.
//!
//! Each test runs against an ephemeral SQLite database provisioned by
//! `#[sqlx::test]` with the workspace migrations applied, and a recording
//! in-memory transport instead of the real Telegram API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tempfile::TempDir;

use groupwatch_common::error::AppError;
use groupwatch_common::settings::SettingsHandle;
use groupwatch_common::transport::Transport;
use groupwatch_common::types::{Comment, MonitoredGroup, Network};
use groupwatch_relay::pending::{PENDING_WINDOW_SECS, PendingCache};
use groupwatch_relay::poller::Poller;
use groupwatch_relay::push::PushHandler;
use groupwatch_relay::store::{GroupStore, NewGroup, PendingStore};
use groupwatch_sources::{CommentSource, GroupInfo, SourceRegistry};
use groupwatch_telegram::types::{TgChat, TgMessage, TgUser};

const CHAT_ID: i64 = -1009999;

// ============================================================
// Shared helpers
// ============================================================

#[derive(Default)]
struct MockTransport {
    sent: tokio::sync::Mutex<Vec<(i64, Option<i64>, String)>>,
}

impl MockTransport {
    async fn sent(&self) -> Vec<(i64, Option<i64>, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        text: &str,
    ) -> Result<(), AppError> {
        self.sent
            .lock()
            .await
            .push((chat_id, thread_id, text.to_string()));
        Ok(())
    }
}

/// Fixed-response source for the poller tests. Applies the same strict
/// cursor filter a real network client does.
struct MockSource {
    comments: Vec<(&'static str, i64)>,
}

#[async_trait]
impl CommentSource for MockSource {
    fn network(&self) -> Network {
        Network::Vk
    }

    async fn fetch_group_info(&self, external_id: &str) -> Result<GroupInfo, AppError> {
        Ok(GroupInfo {
            external_id: external_id.to_string(),
            name: "Mock Group".to_string(),
            screen_name: None,
        })
    }

    async fn fetch_new_comments(&self, group: &MonitoredGroup) -> Result<Vec<Comment>, AppError> {
        Ok(self
            .comments
            .iter()
            .filter(|(_, ts)| groupwatch_sources::is_newer_than_cursor(*ts, group.last_check))
            .map(|(id, ts)| make_comment(group.id, id, *ts))
            .collect())
    }
}

/// Write a settings file and load it. `deny` produces a schedule that never
/// allows delivery (no allowed weekdays); otherwise the gate is always open.
async fn make_settings(dir: &TempDir, deny: bool) -> Arc<SettingsHandle> {
    let settings = serde_json::json!({
        "chat_id": CHAT_ID,
        "style": "full",
        "schedule": {
            "enabled": deny,
            "days": [],
            "start": "00:00",
            "end": "23:59",
            "timezone": "UTC",
        },
    });
    let path = dir.path().join("settings.json");
    tokio::fs::write(&path, settings.to_string()).await.unwrap();
    Arc::new(SettingsHandle::load(&path).await.unwrap())
}

async fn make_group(pool: &SqlitePool, network: Network, external_id: &str) -> MonitoredGroup {
    GroupStore::new(pool.clone())
        .add(NewGroup {
            network,
            group_id: external_id.to_string(),
            group_name: "Test Group".to_string(),
            last_check: 0,
            extra_data: "{}".to_string(),
        })
        .await
        .unwrap()
}

fn make_comment(group_id: i64, comment_id: &str, timestamp: i64) -> Comment {
    Comment {
        network: Network::Vk,
        group_id,
        comment_id: comment_id.to_string(),
        author: "Ivan Petrov".to_string(),
        body: "a comment".to_string(),
        timestamp,
        post_url: "https://vk.com/wall-1_2".to_string(),
        is_pending: false,
        received_at: timestamp,
    }
}

struct Fixture {
    groups: GroupStore,
    pending: PendingStore,
    transport: Arc<MockTransport>,
    cache: Arc<PendingCache>,
    _dir: TempDir,
}

async fn make_fixture(pool: &SqlitePool, deny: bool) -> Fixture {
    let dir = TempDir::new().unwrap();
    let settings = make_settings(&dir, deny).await;
    let groups = GroupStore::new(pool.clone());
    let pending = PendingStore::new(pool.clone());
    let transport = Arc::new(MockTransport::default());
    let cache = Arc::new(PendingCache::new(
        groups.clone(),
        pending.clone(),
        transport.clone(),
        settings,
    ));
    Fixture {
        groups,
        pending,
        transport,
        cache,
        _dir: dir,
    }
}

fn make_tg_message(from: Option<TgUser>, chat_id: i64, text: &str) -> TgMessage {
    TgMessage {
        message_id: 42,
        from,
        chat: TgChat {
            id: chat_id,
            kind: "supergroup".to_string(),
            title: Some("Chat".to_string()),
            username: None,
        },
        date: Utc::now().timestamp(),
        text: if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        },
        caption: None,
    }
}

fn make_tg_user(id: i64) -> TgUser {
    TgUser {
        id,
        is_bot: false,
        first_name: "Maria".to_string(),
        last_name: None,
        username: Some("maria".to_string()),
    }
}

// ============================================================
// Group store
// ============================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_group_store_crud(pool: SqlitePool) {
    let store = GroupStore::new(pool.clone());

    let group = make_group(&pool, Network::Vk, "club1").await;
    assert_eq!(group.network, Network::Vk);
    assert_eq!(group.group_id, "club1");

    let found = store
        .get_by_network_and_id(Network::Vk, "club1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, group.id);

    make_group(&pool, Network::Ok, "555").await;
    assert_eq!(store.get_all().await.unwrap().len(), 2);
    assert_eq!(store.get_by_network(Network::Ok).await.unwrap().len(), 1);

    assert!(store.remove(Network::Vk, "club1").await.unwrap());
    assert!(!store.remove(Network::Vk, "club1").await.unwrap());
    assert!(
        store
            .get_by_internal_id(group.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_reregistration_keeps_cursor(pool: SqlitePool) {
    let store = GroupStore::new(pool.clone());
    let group = make_group(&pool, Network::Vk, "club1").await;
    store.update_cursor(group.id, 500).await.unwrap();

    let again = store
        .add(NewGroup {
            network: Network::Vk,
            group_id: "club1".to_string(),
            group_name: "Renamed".to_string(),
            last_check: 0,
            extra_data: "{}".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(again.id, group.id);
    assert_eq!(again.group_name, "Renamed");
    assert_eq!(again.last_check, 500);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_cursor_never_decreases(pool: SqlitePool) {
    let store = GroupStore::new(pool.clone());
    let group = make_group(&pool, Network::Vk, "club1").await;

    store.update_cursor(group.id, 100).await.unwrap();
    store.update_cursor(group.id, 50).await.unwrap();
    let g = store.get_by_internal_id(group.id).await.unwrap().unwrap();
    assert_eq!(g.last_check, 100);

    store.update_cursor(group.id, 200).await.unwrap();
    let g = store.get_by_internal_id(group.id).await.unwrap().unwrap();
    assert_eq!(g.last_check, 200);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_group_removal_drops_cached_comments(pool: SqlitePool) {
    let store = GroupStore::new(pool.clone());
    let pending = PendingStore::new(pool.clone());
    let group = make_group(&pool, Network::Vk, "club1").await;

    let mut comment = make_comment(group.id, "c1", 10);
    comment.is_pending = true;
    pending.upsert(&comment).await.unwrap();

    store.remove(Network::Vk, "club1").await.unwrap();
    assert!(
        pending
            .select_pending_received_after(0)
            .await
            .unwrap()
            .is_empty()
    );
}

// ============================================================
// Pending cache
// ============================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_pending_round_trip_delivers_exactly_once(pool: SqlitePool) {
    let fx = make_fixture(&pool, false).await;
    let group = make_group(&pool, Network::Vk, "club1").await;

    let now = Utc::now();
    fx.cache
        .enqueue(
            vec![
                make_comment(group.id, "c1", now.timestamp() - 60),
                make_comment(group.id, "c2", now.timestamp() - 30),
            ],
            now,
        )
        .await
        .unwrap();

    fx.cache.drain_due(now).await.unwrap();
    let sent = fx.transport.sent().await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, CHAT_ID);
    assert!(sent[0].2.contains("Delivered late"));

    // A second drain finds nothing pending.
    fx.cache.drain_due(now).await.unwrap();
    assert_eq!(fx.transport.sent().await.len(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_drain_is_noop_while_gate_closed(pool: SqlitePool) {
    let fx = make_fixture(&pool, true).await;
    let group = make_group(&pool, Network::Vk, "club1").await;

    let now = Utc::now();
    fx.cache
        .enqueue(vec![make_comment(group.id, "c1", now.timestamp())], now)
        .await
        .unwrap();

    fx.cache.drain_due(now).await.unwrap();
    assert!(fx.transport.sent().await.is_empty());
    assert_eq!(
        fx.pending
            .select_pending_received_after(0)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_enqueue_is_idempotent(pool: SqlitePool) {
    let fx = make_fixture(&pool, true).await;
    let group = make_group(&pool, Network::Vk, "club1").await;

    let now = Utc::now();
    let comment = make_comment(group.id, "c1", now.timestamp());
    fx.cache.enqueue(vec![comment.clone()], now).await.unwrap();
    fx.cache.enqueue(vec![comment], now).await.unwrap();

    assert_eq!(
        fx.pending
            .select_pending_received_after(0)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_stale_pending_comments_are_abandoned(pool: SqlitePool) {
    let fx = make_fixture(&pool, false).await;
    let group = make_group(&pool, Network::Vk, "club1").await;

    let now = Utc::now();
    let mut stale = make_comment(group.id, "old", now.timestamp());
    stale.is_pending = true;
    stale.received_at = now.timestamp() - PENDING_WINDOW_SECS - 3600;
    fx.pending.upsert(&stale).await.unwrap();

    fx.cache.drain_due(now).await.unwrap();
    assert!(fx.transport.sent().await.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_drain_cleans_up_orphaned_comments(pool: SqlitePool) {
    let fx = make_fixture(&pool, false).await;

    let now = Utc::now();
    let mut orphan = make_comment(4242, "c1", now.timestamp());
    orphan.is_pending = true;
    orphan.received_at = now.timestamp();
    fx.pending.upsert(&orphan).await.unwrap();

    fx.cache.drain_due(now).await.unwrap();
    assert!(fx.transport.sent().await.is_empty());
    assert!(
        fx.pending
            .select_pending_received_after(0)
            .await
            .unwrap()
            .is_empty()
    );
}

// ============================================================
// Poller
// ============================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_tick_delivers_and_advances_cursor(pool: SqlitePool) {
    let fx = make_fixture(&pool, false).await;
    let group = make_group(&pool, Network::Vk, "club1").await;

    let before = Utc::now().timestamp();
    let mut registry = SourceRegistry::new();
    registry.register(Box::new(MockSource {
        comments: vec![("c1", before - 100), ("c2", before - 50)],
    }));

    let poller = Poller::new(
        fx.groups.clone(),
        Arc::new(registry),
        fx.cache.clone(),
        std::time::Duration::from_secs(600),
    );
    poller.tick().await.unwrap();

    assert_eq!(fx.transport.sent().await.len(), 2);
    let g = fx.groups.get_by_internal_id(group.id).await.unwrap().unwrap();
    assert!(g.last_check >= before);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_tick_advances_cursor_on_zero_comments(pool: SqlitePool) {
    let fx = make_fixture(&pool, false).await;
    let group = make_group(&pool, Network::Vk, "club1").await;

    let before = Utc::now().timestamp();
    let mut registry = SourceRegistry::new();
    registry.register(Box::new(MockSource { comments: vec![] }));

    let poller = Poller::new(
        fx.groups.clone(),
        Arc::new(registry),
        fx.cache.clone(),
        std::time::Duration::from_secs(600),
    );
    poller.tick().await.unwrap();

    assert!(fx.transport.sent().await.is_empty());
    let g = fx.groups.get_by_internal_id(group.id).await.unwrap().unwrap();
    assert!(g.last_check >= before);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_tick_caches_when_gate_closed(pool: SqlitePool) {
    let fx = make_fixture(&pool, true).await;
    let group = make_group(&pool, Network::Vk, "club1").await;

    let before = Utc::now().timestamp();
    let mut registry = SourceRegistry::new();
    registry.register(Box::new(MockSource {
        comments: vec![("c1", before - 10)],
    }));

    let poller = Poller::new(
        fx.groups.clone(),
        Arc::new(registry),
        fx.cache.clone(),
        std::time::Duration::from_secs(600),
    );
    poller.tick().await.unwrap();

    assert!(fx.transport.sent().await.is_empty());
    let cached = fx.pending.select_pending_received_after(0).await.unwrap();
    assert_eq!(cached.len(), 1);
    assert!(cached[0].is_pending);
    assert_eq!(cached[0].group_id, group.id);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_tick_skips_already_seen_comments(pool: SqlitePool) {
    let fx = make_fixture(&pool, false).await;
    let group = make_group(&pool, Network::Vk, "club1").await;
    fx.groups.update_cursor(group.id, 1000).await.unwrap();

    let mut registry = SourceRegistry::new();
    registry.register(Box::new(MockSource {
        comments: vec![("at-cursor", 1000), ("older", 900), ("newer", Utc::now().timestamp())],
    }));

    let poller = Poller::new(
        fx.groups.clone(),
        Arc::new(registry),
        fx.cache.clone(),
        std::time::Duration::from_secs(600),
    );
    poller.tick().await.unwrap();

    // Only the strictly-newer comment is delivered.
    assert_eq!(fx.transport.sent().await.len(), 1);
}

// ============================================================
// Push handler
// ============================================================

const SELF_ID: i64 = 1010;

#[sqlx::test(migrations = "../../migrations")]
async fn test_push_delivers_comment_from_monitored_chat(pool: SqlitePool) {
    let fx = make_fixture(&pool, false).await;
    make_group(&pool, Network::Tg, &CHAT_ID.to_string()).await;

    let handler = PushHandler::new(SELF_ID, fx.groups.clone(), fx.cache.clone());
    let msg = make_tg_message(Some(make_tg_user(7)), CHAT_ID, "great post");
    handler.handle_message(&msg).await.unwrap();

    let sent = fx.transport.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].2.contains("great post"));
    assert!(sent[0].2.contains("Maria (@maria)"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_push_uses_caption_when_text_empty(pool: SqlitePool) {
    let fx = make_fixture(&pool, false).await;
    make_group(&pool, Network::Tg, &CHAT_ID.to_string()).await;

    let handler = PushHandler::new(SELF_ID, fx.groups.clone(), fx.cache.clone());
    let mut msg = make_tg_message(Some(make_tg_user(7)), CHAT_ID, "");
    msg.caption = Some("photo caption".to_string());
    handler.handle_message(&msg).await.unwrap();

    let sent = fx.transport.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].2.contains("photo caption"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_push_ignores_own_and_service_messages(pool: SqlitePool) {
    let fx = make_fixture(&pool, false).await;
    make_group(&pool, Network::Tg, &CHAT_ID.to_string()).await;

    let handler = PushHandler::new(SELF_ID, fx.groups.clone(), fx.cache.clone());

    // No sender at all.
    handler
        .handle_message(&make_tg_message(None, CHAT_ID, "x"))
        .await
        .unwrap();
    // The bot's own message.
    handler
        .handle_message(&make_tg_message(Some(make_tg_user(SELF_ID)), CHAT_ID, "x"))
        .await
        .unwrap();
    // Telegram's service account.
    handler
        .handle_message(&make_tg_message(Some(make_tg_user(777000)), CHAT_ID, "x"))
        .await
        .unwrap();

    assert!(fx.transport.sent().await.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_push_own_message_never_cached_even_when_gate_closed(pool: SqlitePool) {
    // With the gate closed a real comment would be persisted as pending, so
    // this is the path where a self-loop would leave a durable trace.
    let fx = make_fixture(&pool, true).await;
    make_group(&pool, Network::Tg, &CHAT_ID.to_string()).await;

    let handler = PushHandler::new(SELF_ID, fx.groups.clone(), fx.cache.clone());
    handler
        .handle_message(&make_tg_message(Some(make_tg_user(SELF_ID)), CHAT_ID, "x"))
        .await
        .unwrap();
    handler
        .handle_message(&make_tg_message(Some(make_tg_user(777000)), CHAT_ID, "x"))
        .await
        .unwrap();

    assert!(fx.transport.sent().await.is_empty());
    assert!(
        fx.pending
            .select_pending_received_after(0)
            .await
            .unwrap()
            .is_empty()
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_push_ignores_unmonitored_chat(pool: SqlitePool) {
    let fx = make_fixture(&pool, false).await;

    let handler = PushHandler::new(SELF_ID, fx.groups.clone(), fx.cache.clone());
    handler
        .handle_message(&make_tg_message(Some(make_tg_user(7)), -555, "x"))
        .await
        .unwrap();

    assert!(fx.transport.sent().await.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_push_caches_when_gate_closed(pool: SqlitePool) {
    let fx = make_fixture(&pool, true).await;
    let group = make_group(&pool, Network::Tg, &CHAT_ID.to_string()).await;

    let handler = PushHandler::new(SELF_ID, fx.groups.clone(), fx.cache.clone());
    handler
        .handle_message(&make_tg_message(Some(make_tg_user(7)), CHAT_ID, "late night"))
        .await
        .unwrap();

    assert!(fx.transport.sent().await.is_empty());
    let cached = fx.pending.select_pending_received_after(0).await.unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].group_id, group.id);
    assert_eq!(cached[0].network, Network::Tg);
}
