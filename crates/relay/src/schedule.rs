//! Delivery schedule gate.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use groupwatch_common::types::Schedule;

/// Decide whether delivery is currently allowed. Pure, no side effects.
///
/// A disabled schedule always allows. An unresolvable timezone fails open:
/// delivering at the wrong hour beats never delivering. The localized weekday
/// must appear in the allowed set, and the localized `HH:MM` must fall inside
/// `start..=end` (lexicographic comparison is valid for zero-padded 24-hour
/// times).
pub fn is_allowed(now: DateTime<Utc>, schedule: &Schedule) -> bool {
    if !schedule.enabled {
        return true;
    }

    let Ok(tz) = schedule.timezone.parse::<Tz>() else {
        return true;
    };
    let local = now.with_timezone(&tz);

    let weekday = local.format("%a").to_string().to_lowercase();
    if !schedule.days.iter().any(|d| d.to_lowercase() == weekday) {
        return false;
    }

    let time = local.format("%H:%M").to_string();
    schedule.start <= time && time <= schedule.end
}
