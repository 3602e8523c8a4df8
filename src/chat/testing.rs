//! In-memory chat channel used by unit tests across the crate.

use crate::chat::client::{ChatAttachment, ChatClient, ChatMessage};
use anyhow::Result;
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};

/// Fake channel holding messages newest-first, like the platform returns
/// them. `fail_fetches` makes every page request error, for failure-path
/// tests.
pub struct MemoryChannel {
    channel_id: u64,
    messages: Vec<ChatMessage>,
    fail_fetches: AtomicBool,
}

impl MemoryChannel {
    pub fn new(channel_id: u64, mut messages: Vec<ChatMessage>) -> Self {
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        Self {
            channel_id,
            messages,
            fail_fetches: AtomicBool::new(false),
        }
    }

    pub fn with_ids(channel_id: u64, ids: &[u64]) -> Self {
        let messages = ids.iter().map(|&id| sample_message(channel_id, id)).collect();
        Self::new(channel_id, messages)
    }

    pub fn fail_fetches(&self) {
        self.fail_fetches.store(true, Ordering::SeqCst);
    }
}

/// A deterministic message whose timestamp tracks its id, so newer ids are
/// newer in time.
pub fn sample_message(channel_id: u64, id: u64) -> ChatMessage {
    ChatMessage {
        id,
        channel_id,
        timestamp: Utc
            .timestamp_opt(1_600_000_000 + id as i64, 0)
            .single()
            .expect("valid timestamp"),
        edited_timestamp: None,
        author_name: "tester".into(),
        author_discriminator: "0001".into(),
        content: format!("message {id}"),
        embeds: Vec::new(),
        attachments: Vec::new(),
        pinned: false,
        tts: false,
    }
}

pub fn with_attachment(mut message: ChatMessage, filename: &str) -> ChatMessage {
    message.attachments.push(ChatAttachment {
        filename: filename.into(),
        url: format!("origin://{}/{filename}", message.id),
        proxy_url: format!("proxy://{}/{filename}", message.id),
    });
    message
}

impl ChatClient for MemoryChannel {
    fn messages_before(
        &self,
        channel_id: u64,
        before_id: u64,
        limit: u8,
    ) -> Result<Vec<ChatMessage>> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            anyhow::bail!("simulated fetch failure");
        }
        anyhow::ensure!(channel_id == self.channel_id, "unknown channel {channel_id}");
        Ok(self
            .messages
            .iter()
            .filter(|m| m.id < before_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    fn message_by_id(&self, channel_id: u64, message_id: u64) -> Result<Option<ChatMessage>> {
        anyhow::ensure!(channel_id == self.channel_id, "unknown channel {channel_id}");
        Ok(self.messages.iter().find(|m| m.id == message_id).cloned())
    }
}
