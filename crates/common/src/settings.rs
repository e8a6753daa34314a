use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::types::{NotifyStyle, Schedule};

/// Mutable runtime settings persisted as a JSON file.
///
/// Everything delivery-related that an operator may change while the service
/// runs lives here rather than in the environment: the destination chat, the
/// notification style and the delivery schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Destination Telegram chat id (channel or supergroup).
    pub chat_id: i64,
    /// Optional forum topic within the destination chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    #[serde(default)]
    pub style: NotifyStyle,
    #[serde(default)]
    pub schedule: Schedule,
}

impl Settings {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.chat_id == 0 {
            return Err(AppError::Validation(
                "chat_id must be a non-zero Telegram chat id".to_string(),
            ));
        }
        self.schedule.validate()
    }
}

/// Shared handle to the settings file.
///
/// Reads are cheap clones of the in-memory copy; updates are validated,
/// written back to disk and only then made visible to readers. An update that
/// fails validation or persistence leaves the previous settings in effect.
pub struct SettingsHandle {
    path: PathBuf,
    inner: RwLock<Settings>,
}

impl SettingsHandle {
    /// Load settings from `path`, validating before anything else sees them.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            AppError::Config(format!("cannot read settings file {}: {e}", path.display()))
        })?;
        let settings: Settings = serde_json::from_str(&raw)?;
        settings.validate()?;

        tracing::info!(
            path = %path.display(),
            chat_id = settings.chat_id,
            "Loaded settings"
        );

        Ok(Self {
            path,
            inner: RwLock::new(settings),
        })
    }

    /// Current settings snapshot.
    pub async fn get(&self) -> Settings {
        self.inner.read().await.clone()
    }

    /// Apply a mutation, validate the result and persist it.
    pub async fn update<F>(&self, mutate: F) -> Result<Settings, AppError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self.inner.write().await;
        let mut candidate = guard.clone();
        mutate(&mut candidate);
        candidate.validate()?;

        let json = serde_json::to_string_pretty(&candidate)?;
        tokio::fs::write(&self.path, json).await.map_err(|e| {
            AppError::Config(format!(
                "cannot write settings file {}: {e}",
                self.path.display()
            ))
        })?;

        *guard = candidate.clone();
        Ok(candidate)
    }
}
