use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// One attachment carried by a chat message. `proxy_url` is the CDN copy
/// and is tried first; `url` is the origin fallback.
#[derive(Debug, Clone)]
pub struct ChatAttachment {
    pub filename: String,
    pub url: String,
    pub proxy_url: String,
}

/// A chat message as the platform hands it to us. Plain data only; the
/// archival core never talks to the platform except through `ChatClient`.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: u64,
    pub channel_id: u64,
    pub timestamp: DateTime<Utc>,
    pub edited_timestamp: Option<DateTime<Utc>>,
    pub author_name: String,
    pub author_discriminator: String,
    pub content: String,
    pub embeds: Vec<Value>,
    pub attachments: Vec<ChatAttachment>,
    pub pinned: bool,
    pub tts: bool,
}

impl ChatMessage {
    /// `name#discriminator`, the rendering the archive stores.
    pub fn author_tag(&self) -> String {
        format!("{}#{}", self.author_name, self.author_discriminator)
    }
}

/// The consumed boundary of the chat platform. Paging is strictly
/// backward: `messages_before` returns up to `limit` messages strictly
/// older than `before_id`, newest first, or an empty page when history is
/// exhausted. Implementations absorb rate limiting by blocking.
pub trait ChatClient: Send + Sync {
    fn messages_before(&self, channel_id: u64, before_id: u64, limit: u8)
    -> Result<Vec<ChatMessage>>;

    /// Resolve one message by id, `None` when it no longer exists.
    fn message_by_id(&self, channel_id: u64, message_id: u64) -> Result<Option<ChatMessage>>;
}
