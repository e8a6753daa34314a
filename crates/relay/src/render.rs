//! Notification rendering.
//!
//! Pure layout over already-normalized comment text. `now` is a parameter so
//! the relative and absolute time strings are deterministic for a given
//! input; nothing here reads the clock.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;

use groupwatch_common::types::{Comment, MonitoredGroup, NotifyStyle};
use groupwatch_sources::normalize;

const DIVIDER_WIDTH: usize = 35;

const STATUS_IMMEDIATE: &str = "Just now";
const STATUS_DELAYED: &str = "Delivered late (comment received outside working hours)";

/// Resolve a schedule timezone name for display, falling back to UTC.
pub fn display_timezone(name: &str) -> Tz {
    name.parse().unwrap_or(chrono_tz::UTC)
}

pub fn render(
    group: &MonitoredGroup,
    comment: &Comment,
    style: NotifyStyle,
    now: DateTime<Utc>,
    tz: Tz,
) -> String {
    // Comment author/body are escaped at normalization; group names are
    // stored as the network reports them and get escaped here.
    let group_name = normalize::escape_markdown(&group.group_name);

    let status = if comment.is_pending {
        STATUS_DELAYED
    } else {
        STATUS_IMMEDIATE
    };
    let time = format_absolute(comment.timestamp, now, tz);

    match style {
        NotifyStyle::Full => format!(
            "💬 *New comment in \"{group_name}\" ({network})*:\n\n\
             📝 *Text*: {body}\n\n\
             👤 *Author*: {author}\n\
             🔗 *Link*: [Go to post]({url})\n\
             ⏰ *Posted*: {time}\n\
             📌 *Delivery status*: {status}",
            network = group.network,
            body = comment.body,
            author = comment.author,
            url = comment.post_url,
        ),
        NotifyStyle::Minimalistic => format!(
            "🌐 ({network}) *{group_name}*\n\
             💬 {body}\n\
             ⏰ {time} | (status: {status})\n\
             👤 *{author}*\n\
             🔗 [Go to post]({url}) • {ago}",
            network = group.network,
            body = comment.body,
            author = comment.author,
            url = comment.post_url,
            ago = format_time_ago(comment.timestamp, now),
        ),
        NotifyStyle::Spaced => {
            let divider = "•".repeat(DIVIDER_WIDTH);
            format!(
                "*💬 NEW COMMENT*\n\
                 *Group:* _{group_name}_ ({network})\n\
                 {divider}\n\
                 *📝 Comment text:*\n{body}\n\
                 {divider}\n\
                 *👤 Author:* {author}\n\
                 *⏰ Time:* {time}\n\
                 *📌 Status:* {status}\n\
                 *🔗 Link:* [Go to post]({url})",
                network = group.network,
                body = comment.body,
                author = comment.author,
                url = comment.post_url,
            )
        }
    }
}

/// `today at HH:MM` when the comment is from the same day as `now`,
/// otherwise `DD.MM.YYYY at HH:MM` — both in the schedule's timezone, so the
/// reader sees the same clock the delivery window is gated on.
fn format_absolute(timestamp: i64, now: DateTime<Utc>, tz: Tz) -> String {
    let t = Utc
        .timestamp_opt(timestamp, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
        .with_timezone(&tz);
    let now = now.with_timezone(&tz);
    if (t.year(), t.month(), t.day()) == (now.year(), now.month(), now.day()) {
        t.format("today at %H:%M").to_string()
    } else {
        t.format("%d.%m.%Y at %H:%M").to_string()
    }
}

/// Coarse relative age for the minimalistic style.
fn format_time_ago(timestamp: i64, now: DateTime<Utc>) -> String {
    let ago = now.timestamp() - timestamp;
    match ago {
        i64::MIN..10 => "just now".to_string(),
        10..60 => format!("{ago} sec ago"),
        60..3600 => format!("{} min ago", ago / 60),
        3600..86400 => format!("{} hr ago", ago / 3600),
        _ => "long ago".to_string(),
    }
}
