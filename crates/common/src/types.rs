use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported social networks.
///
/// `Vk` and `Ok` are polled on a timer; `Tg` (Telegram) is push-delivered —
/// comments arrive as inbound bot updates and the network is never polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Vk,
    Ok,
    Tg,
}

impl Network {
    /// Whether comments for this network arrive via push instead of polling.
    pub fn is_push(&self) -> bool {
        matches!(self, Network::Tg)
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Vk => write!(f, "vk"),
            Network::Ok => write!(f, "ok"),
            Network::Tg => write!(f, "tg"),
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vk" => Ok(Network::Vk),
            "ok" => Ok(Network::Ok),
            "tg" => Ok(Network::Tg),
            other => Err(format!("unsupported network: {other}")),
        }
    }
}

/// A social-network group registered for comment monitoring.
///
/// `last_check` is the per-group cursor: a Unix timestamp such that only
/// comments strictly newer than it are considered new. It is mutated only by
/// the polling scheduler after a successful fetch and never decreases.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MonitoredGroup {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub network: Network,
    /// External group id, opaque and network-specific ("club123", chat id, ...).
    pub group_id: String,
    pub group_name: String,
    pub last_check: i64,
    /// Network-specific auxiliary fields as JSON (e.g. resolved screen name).
    pub extra_data: String,
}

/// A canonical comment, normalized from whatever the source network returned.
///
/// Identity is the composite `(network, group_id, comment_id)`. `body` and
/// `author` are already normalized: attachment placeholders substituted,
/// body truncated to 500 code points, Markdown specials escaped. The renderer
/// only does layout on top of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub network: Network,
    /// Internal id of the owning `MonitoredGroup`.
    pub group_id: i64,
    /// Network-native comment id.
    pub comment_id: String,
    pub author: String,
    pub body: String,
    /// Origination time as reported by the network (Unix seconds).
    pub timestamp: i64,
    pub post_url: String,
    pub is_pending: bool,
    /// When this pipeline first observed the comment (Unix seconds).
    pub received_at: i64,
}

/// Notification layout selected in the settings file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyStyle {
    #[default]
    Full,
    Minimalistic,
    Spaced,
}

/// Weekly delivery window. When `enabled` is false the schedule gate always
/// allows delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub enabled: bool,
    /// Allowed weekday tokens, subset of `mon..sun`.
    pub days: Vec<String>,
    /// Window start, zero-padded 24-hour "HH:MM".
    pub start: String,
    /// Window end, inclusive, "HH:MM". Must not precede `start`.
    pub end: String,
    /// IANA timezone name, e.g. "Europe/Moscow".
    pub timezone: String,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            enabled: false,
            days: vec!["mon", "tue", "wed", "thu", "fri"]
                .into_iter()
                .map(String::from)
                .collect(),
            start: "08:00".to_string(),
            end: "18:00".to_string(),
            timezone: "Europe/Moscow".to_string(),
        }
    }
}

const VALID_DAYS: &[&str] = &["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

impl Schedule {
    /// Validate a schedule at the configuration boundary.
    ///
    /// An invalid schedule is rejected here and never reaches the gate.
    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        for day in &self.days {
            if !VALID_DAYS.contains(&day.to_lowercase().as_str()) {
                return Err(AppError::Validation(format!(
                    "invalid weekday '{day}', expected one of {}",
                    VALID_DAYS.join(",")
                )));
            }
        }

        if !is_valid_time(&self.start) || !is_valid_time(&self.end) {
            return Err(AppError::Validation(
                "time must be in zero-padded HH:MM format".to_string(),
            ));
        }

        if self.start > self.end {
            return Err(AppError::Validation(
                "window start must not be later than window end".to_string(),
            ));
        }

        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(AppError::Validation(format!(
                "invalid timezone '{}', expected an IANA name like Europe/Moscow",
                self.timezone
            )));
        }

        Ok(())
    }
}

/// Check "HH:MM" with zero padding, 00:00..=23:59.
fn is_valid_time(t: &str) -> bool {
    let Some((h, m)) = t.split_once(':') else {
        return false;
    };
    if h.len() != 2 || m.len() != 2 {
        return false;
    }
    matches!((h.parse::<u8>(), m.parse::<u8>()), (Ok(h), Ok(m)) if h < 24 && m < 60)
}
