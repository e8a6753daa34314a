use serde::Deserialize;

/// Inbound update from `getUpdates`. Only message updates are consumed;
/// everything else deserializes with `message: None` and is dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct TgUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TgUser>,
    pub chat: TgChat,
    /// Unix seconds.
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    /// Present instead of `text` for media messages.
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl TgUser {
    /// "First Last (@username)", with the optional parts omitted when absent.
    pub fn display_name(&self) -> String {
        let mut name = self.first_name.clone();
        if let Some(last) = &self.last_name {
            name.push(' ');
            name.push_str(last);
        }
        if let Some(username) = &self.username {
            name.push_str(" (@");
            name.push_str(username);
            name.push(')');
        }
        name
    }
}

impl TgMessage {
    /// Body text, falling back to the media caption.
    pub fn body(&self) -> &str {
        self.text
            .as_deref()
            .or(self.caption.as_deref())
            .unwrap_or("")
    }

    /// Public permalink to this message.
    ///
    /// Public chats link by username; private supergroups use the `/c/` form
    /// with the `-100` chat-id prefix stripped.
    pub fn permalink(&self) -> String {
        if let Some(username) = &self.chat.username {
            return format!("https://t.me/{username}/{}", self.message_id);
        }
        let raw = self.chat.id.to_string();
        let internal = raw.strip_prefix("-100").unwrap_or(&raw);
        format!("https://t.me/c/{internal}/{}", self.message_id)
    }
}
