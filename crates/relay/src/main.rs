use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use groupwatch_common::config::AppConfig;
use groupwatch_common::db;
use groupwatch_common::settings::SettingsHandle;
use groupwatch_common::transport::Transport;
use groupwatch_relay::pending::PendingCache;
use groupwatch_relay::poller::Poller;
use groupwatch_relay::push::PushHandler;
use groupwatch_relay::store::{GroupStore, PendingStore};
use groupwatch_sources::SourceRegistry;
use groupwatch_sources::ok::OkClient;
use groupwatch_sources::vk::VkClient;
use groupwatch_telegram::api::TelegramApi;
use groupwatch_telegram::listener::UpdateListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "groupwatch_relay=info,groupwatch_sources=info".into()),
        )
        .init();

    tracing::info!("GroupWatch relay starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database and apply migrations
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Runtime-mutable settings (destination chat, style, schedule)
    let settings = Arc::new(SettingsHandle::load(&config.settings_path).await?);

    // Telegram transport and identity
    let api = Arc::new(TelegramApi::new(config.telegram_bot_token.clone()));
    let me = api.get_me().await?;
    tracing::info!(bot_id = me.id, username = ?me.username, "Bot authorized");

    // Polled sources, registered only when credentialed
    let mut registry = SourceRegistry::new();
    if let Some(token) = &config.vk_access_token {
        registry.register(Box::new(VkClient::new(token.clone())));
    }
    if let (Some(token), Some(public), Some(secret)) = (
        &config.ok_access_token,
        &config.ok_public_key,
        &config.ok_secret_key,
    ) {
        registry.register(Box::new(OkClient::new(
            token.clone(),
            public.clone(),
            secret.clone(),
        )));
    }
    if registry.is_empty() {
        tracing::warn!("No polled sources configured, only Telegram push will be relayed");
    }

    let groups = GroupStore::new(pool.clone());
    let pending = PendingStore::new(pool);
    let transport: Arc<dyn Transport> = api.clone();
    let cache = Arc::new(PendingCache::new(
        groups.clone(),
        pending,
        transport,
        settings.clone(),
    ));

    // Background polling task
    let poller = Poller::new(
        groups.clone(),
        Arc::new(registry),
        cache.clone(),
        Duration::from_secs(config.poll_interval_mins * 60),
    );
    let poller_task = tokio::spawn(poller.run());

    // Inbound update stream, consumed fire-and-forget per message
    let (tx, mut rx) = mpsc::channel(256);
    let listener = UpdateListener::new(api.clone(), Utc::now().timestamp());
    let listener_task = tokio::spawn(listener.run(tx));

    let push = Arc::new(PushHandler::new(me.id, groups, cache));
    let push_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let handler = push.clone();
            tokio::spawn(async move {
                if let Err(e) = handler.handle_message(&msg).await {
                    tracing::error!(error = %e, "Failed to handle inbound message");
                }
            });
        }
    });

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
        _ = poller_task => {
            tracing::error!("Poller task exited unexpectedly");
        }
        _ = listener_task => {
            tracing::error!("Update listener exited unexpectedly");
        }
        _ = push_task => {
            tracing::error!("Push consumer exited unexpectedly");
        }
    }

    tracing::info!("GroupWatch relay stopped.");
    Ok(())
}
