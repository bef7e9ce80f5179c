use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channels::{self, InboundEvent, MessageOrigin, Messenger};
use crate::error::Result;
use crate::registry::ChatRegistry;
use crate::replies::{self, Phrase};

/// Routes inbound events to canned replies.
pub struct Dispatcher {
    registry: Arc<ChatRegistry>,
    messenger: Arc<dyn Messenger>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ChatRegistry>, messenger: Arc<dyn Messenger>) -> Self {
        Self {
            registry,
            messenger,
        }
    }

    /// Core routing: record the chat, classify the event, reply.
    ///
    /// The chat is recorded before anything else, including for events whose
    /// reply later fails.
    pub async fn handle(&self, event: InboundEvent) -> Result<()> {
        self.registry.record(event.chat_id()).await;

        match event {
            InboundEvent::Command { origin, name, args } => {
                self.handle_command(&origin, &name, &args).await
            }
            InboundEvent::Text { origin, text } => self.handle_text(&origin, &text).await,
            InboundEvent::CallbackQuery {
                chat_id,
                query_id,
                from,
                data,
            } => {
                info!(
                    "Callback query from {} in chat {chat_id}: {}",
                    from.user_id,
                    data.as_deref().unwrap_or("")
                );
                self.messenger
                    .answer_callback(&query_id, replies::CALLBACK_ACK)
                    .await?;
                Ok(())
            }
            InboundEvent::Other { chat_id } => {
                debug!("Non-text message in chat {chat_id}");
                Ok(())
            }
        }
    }

    async fn handle_command(&self, origin: &MessageOrigin, name: &str, args: &str) -> Result<()> {
        info!(
            "Command /{name} args='{args}' from {}",
            origin
                .from
                .as_ref()
                .and_then(|f| f.username.as_deref())
                .unwrap_or("unknown")
        );

        let reply = match name {
            "start" => replies::welcome(display_name(origin)),
            "help" => replies::help(),
            "info" => replies::info(origin.from.as_ref(), origin.chat_kind, origin.chat_id),
            "echo" if args.is_empty() => replies::ECHO_USAGE.to_string(),
            "echo" => replies::echo(args),
            "sendto" => self.send_to(args).await,
            "broadcast" => self.broadcast(args).await,
            _ => replies::UNKNOWN_COMMAND.to_string(),
        };

        self.reply(origin, &reply).await
    }

    /// `/sendto <chat_id> <message>`; returns the status text for the requester.
    async fn send_to(&self, args: &str) -> String {
        let Some((id, text)) = args.split_once(char::is_whitespace) else {
            return replies::SENDTO_USAGE.to_string();
        };
        let text = text.trim();
        if text.is_empty() {
            return replies::SENDTO_USAGE.to_string();
        }
        let Ok(chat_id) = id.parse::<i64>() else {
            return replies::SENDTO_INVALID_ID.to_string();
        };

        match self.messenger.send(chat_id, text).await {
            Ok(()) => {
                info!("Relayed message to chat {chat_id}");
                replies::sendto_ok(chat_id)
            }
            Err(e) => {
                warn!("Failed to send message to chat {chat_id}: {e}");
                replies::sendto_failed(&e)
            }
        }
    }

    async fn broadcast(&self, text: &str) -> String {
        if text.is_empty() {
            return replies::BROADCAST_USAGE.to_string();
        }
        let chat_ids = self.registry.snapshot().await;
        if chat_ids.is_empty() {
            return replies::NO_KNOWN_CHATS.to_string();
        }

        let tally = channels::broadcast(self.messenger.as_ref(), &chat_ids, text).await;
        info!(
            "Broadcast via command: {} succeeded, {} failed",
            tally.success, tally.failed
        );
        replies::broadcast_summary(tally.success, tally.failed)
    }

    async fn handle_text(&self, origin: &MessageOrigin, text: &str) -> Result<()> {
        let text = text.trim();
        debug!("Text message in chat {}: {text}", origin.chat_id);

        let reply = match replies::match_phrase(text) {
            Some(Phrase::Greeting) => replies::greeting(display_name(origin)),
            Some(Phrase::Thanks) => replies::THANKS.to_string(),
            Some(Phrase::Farewell) => replies::FAREWELL.to_string(),
            None => replies::fallback(text),
        };

        self.reply(origin, &reply).await
    }

    async fn reply(&self, origin: &MessageOrigin, text: &str) -> Result<()> {
        self.messenger
            .reply(origin.chat_id, origin.message_id, text)
            .await?;
        Ok(())
    }
}

fn display_name(origin: &MessageOrigin) -> &str {
    origin
        .from
        .as_ref()
        .map(|f| f.display_name())
        .unwrap_or("there")
}
