pub mod telegram;

#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{DeliveryResult, Result};

/// Who sent an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderInfo {
    pub user_id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl SenderInfo {
    pub fn display_name(&self) -> &str {
        &self.first_name
    }

    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatKind::Private => "private",
            ChatKind::Group => "group",
            ChatKind::Supergroup => "supergroup",
            ChatKind::Channel => "channel",
        }
    }
}

impl std::fmt::Display for ChatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a message-like event came from. Replies thread onto `message_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOrigin {
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    pub message_id: i32,
    /// Absent for channel posts.
    pub from: Option<SenderInfo>,
}

/// An inbound event from the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Text {
        origin: MessageOrigin,
        text: String,
    },
    Command {
        origin: MessageOrigin,
        /// Lower-cased, without the leading `/` or `@botname` suffix.
        name: String,
        /// Everything after the command token, trimmed.
        args: String,
    },
    CallbackQuery {
        chat_id: i64,
        query_id: String,
        from: SenderInfo,
        data: Option<String>,
    },
    /// A message without text (photo, sticker, members joining). Only makes
    /// the chat known; nothing is replied.
    Other { chat_id: i64 },
}

impl InboundEvent {
    /// The conversation this event belongs to.
    pub fn chat_id(&self) -> i64 {
        match self {
            InboundEvent::Text { origin, .. } | InboundEvent::Command { origin, .. } => {
                origin.chat_id
            }
            InboundEvent::CallbackQuery { chat_id, .. } | InboundEvent::Other { chat_id } => {
                *chat_id
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Text { .. } => "text",
            InboundEvent::Command { .. } => "command",
            InboundEvent::CallbackQuery { .. } => "callback_query",
            InboundEvent::Other { .. } => "other",
        }
    }
}

/// Outbound primitives of a messaging platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Deliver `text` to `chat_id`. Never retried.
    async fn send(&self, chat_id: i64, text: &str) -> DeliveryResult;

    /// Deliver `text` to `chat_id` as a reply to `message_id`.
    async fn reply(&self, chat_id: i64, message_id: i32, text: &str) -> DeliveryResult;

    /// Acknowledge a callback query so the client stops its loading indicator.
    async fn answer_callback(&self, query_id: &str, text: &str) -> DeliveryResult;
}

/// A long-polled stream of inbound events.
#[async_trait]
pub trait UpdateSource: Send {
    fn name(&self) -> &str;

    /// Fetch the next batch. May block up to the long-poll timeout and may
    /// return an empty batch. Must be cancel-safe: dropping the future before
    /// it resolves must not lose events.
    async fn next_batch(&mut self) -> Result<Vec<InboundEvent>>;

    /// The last `unhandled` events of the most recent batch were never
    /// dispatched. Sources that acknowledge batches should make sure those
    /// events are delivered again.
    fn rewind(&mut self, _unhandled: usize) {}

    /// Stop the update stream. Called once, after the last `next_batch`.
    async fn stop(&mut self) -> Result<()>;
}

/// Outcome of sending one message to many chats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastTally {
    pub success: usize,
    pub failed: usize,
}

/// Send `text` to every id in `chat_ids`, one after another.
pub async fn broadcast(messenger: &dyn Messenger, chat_ids: &[i64], text: &str) -> BroadcastTally {
    let mut tally = BroadcastTally::default();
    for &chat_id in chat_ids {
        match messenger.send(chat_id, text).await {
            Ok(()) => tally.success += 1,
            Err(e) => {
                warn!("Broadcast to chat {chat_id} failed: {e}");
                tally.failed += 1;
            }
        }
    }
    tally
}
