//! Comment text normalization.
//!
//! Applied exactly once, when a raw comment enters the pipeline. The renderer
//! and transport never escape or truncate again, so everything stored in a
//! [`Comment`](groupwatch_common::types::Comment) body is already safe to
//! embed in Markdown.

/// Substituted for a comment with no text at all.
pub const EMPTY_PLACEHOLDER: &str = "((Empty text, possibly a file or sticker))";
/// Substituted for OK sticker tags (`#ud6f8934c00#192:192s#` and the like).
pub const STICKER_PLACEHOLDER: &str = "((Message contains a sticker or attached file))";
/// Substituted when the body carries the OK attached-files boilerplate.
pub const ATTACHED_FILES_PLACEHOLDER: &str = "((Message contains attached files))";
/// Substituted when the body embeds a raw media payload.
pub const MEDIA_PLACEHOLDER: &str = "((Message contains media))";

/// Appended when a body exceeds [`MAX_BODY_CHARS`].
pub const TRUNCATION_NOTICE: &str = "\n\n⚠️ Message was truncated.";
/// Body length cap, in Unicode code points.
pub const MAX_BODY_CHARS: usize = 500;

/// OK ships this boilerplate inside the comment body itself, in Russian;
/// the marker must match the wire text, not our placeholder language.
const ATTACHED_FILES_MARKERS: &[&str] = &[
    "Сообщение содержит прикрепленные файлы",
    "Message contains attached files",
];
const MEDIA_MARKER: &str = "media_url";
const STICKER_PREFIX: &str = "#ud";

/// Full body pipeline: placeholder substitution, then truncation, then
/// Markdown escaping. Order matters: the length cap applies to what the
/// reader sees, not to escape backslashes.
pub fn normalize_body(raw: &str) -> String {
    escape_markdown(&truncate(substitute_placeholders(raw)))
}

/// Author names get escaped only; they are never attachment markers.
pub fn normalize_author(raw: &str) -> String {
    escape_markdown(raw)
}

/// Replace network attachment markers with fixed human-readable placeholders.
///
/// This is a substitution table, not a parser: the first matching rule wins
/// and replaces the whole body.
pub fn substitute_placeholders(text: &str) -> &str {
    if text.is_empty() {
        return EMPTY_PLACEHOLDER;
    }
    if text.starts_with(STICKER_PREFIX) {
        return STICKER_PLACEHOLDER;
    }
    if ATTACHED_FILES_MARKERS.iter().any(|m| text.contains(m)) {
        return ATTACHED_FILES_PLACEHOLDER;
    }
    if text.contains(MEDIA_MARKER) {
        return MEDIA_PLACEHOLDER;
    }
    text
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_BODY_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_BODY_CHARS).collect();
    out.push_str(TRUNCATION_NOTICE);
    out
}

/// Escape the four Markdown-significant characters with a leading backslash.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
