use std::time::Duration;

use async_trait::async_trait;
use teloxide::net::default_reqwest_settings;
use teloxide::payloads::{AnswerCallbackQuerySetters, GetUpdatesSetters, SendMessageSetters};
use teloxide::requests::Requester;
use teloxide::types::{
    AllowedUpdate, Chat, ChatId, Message, MessageId, ReplyParameters, Update, UpdateKind, User,
};
use teloxide::Bot;
use tracing::{debug, info, warn};

use crate::channels::{ChatKind, InboundEvent, MessageOrigin, Messenger, SenderInfo, UpdateSource};
use crate::config::TelegramConfig;
use crate::error::{CourierError, DeliveryResult, Result};

/// Extra headroom on top of the long-poll timeout for the HTTP client.
const CLIENT_TIMEOUT_SLACK_SECS: u64 = 10;

pub struct TelegramChannel {
    bot: Bot,
    poll_timeout_secs: u32,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let token = config
            .bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CourierError::Config("Telegram bot_token is required".to_string()))?;

        // Default teloxide client has a 17s timeout, too short for a 60s long-poll.
        let client = default_reqwest_settings()
            .timeout(Duration::from_secs(
                u64::from(config.poll_timeout_secs) + CLIENT_TIMEOUT_SLACK_SECS,
            ))
            .build()
            .map_err(|e| CourierError::Channel(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            bot: Bot::with_client(token, client),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    /// Check the token against the Bot API. Returns the bot's username.
    pub async fn authorize(&self) -> Result<String> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| CourierError::Channel(format!("Telegram authorization failed: {e}")))?;
        Ok(me.username().to_string())
    }

    pub fn messenger(&self) -> TelegramMessenger {
        TelegramMessenger {
            bot: self.bot.clone(),
        }
    }

    pub fn updates(&self) -> TelegramUpdates {
        TelegramUpdates {
            bot: self.bot.clone(),
            offset: 0,
            timeout_secs: self.poll_timeout_secs,
            batch_ids: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send(&self, chat_id: i64, text: &str) -> DeliveryResult {
        self.bot.send_message(ChatId(chat_id), text).await?;
        Ok(())
    }

    async fn reply(&self, chat_id: i64, message_id: i32, text: &str) -> DeliveryResult {
        self.bot
            .send_message(ChatId(chat_id), text)
            .reply_parameters(ReplyParameters::new(MessageId(message_id)))
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, query_id: &str, text: &str) -> DeliveryResult {
        self.bot
            .answer_callback_query(query_id.to_string())
            .text(text)
            .await?;
        Ok(())
    }
}

/// `getUpdates` long-poll cursor.
pub struct TelegramUpdates {
    bot: Bot,
    offset: i32,
    timeout_secs: u32,
    /// Update id behind each event of the last batch, in order.
    batch_ids: Vec<i32>,
}

#[async_trait]
impl UpdateSource for TelegramUpdates {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn next_batch(&mut self) -> Result<Vec<InboundEvent>> {
        // The offset only advances after a batch arrives, so dropping this
        // future mid-request means Telegram redelivers on the next call.
        let updates = self
            .bot
            .get_updates()
            .offset(self.offset)
            .timeout(self.timeout_secs)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
            .await
            .map_err(|e| CourierError::Channel(format!("getUpdates failed: {e}")))?;

        let mut events = Vec::with_capacity(updates.len());
        self.batch_ids.clear();
        for update in &updates {
            let id = update.id.0 as i32;
            self.offset = id + 1;
            match convert_update(update) {
                Some(event) => {
                    events.push(event);
                    self.batch_ids.push(id);
                }
                None => debug!("Skipping unsupported update {id}"),
            }
        }
        Ok(events)
    }

    fn rewind(&mut self, unhandled: usize) {
        let first = self
            .batch_ids
            .len()
            .checked_sub(unhandled)
            .and_then(|i| self.batch_ids.get(i));
        if let Some(&id) = first {
            debug!("Rewinding update offset from {} to {id}", self.offset);
            self.offset = id;
            self.batch_ids.clear();
        }
    }

    async fn stop(&mut self) -> Result<()> {
        // Confirm the last handled offset so those updates are not redelivered
        // after a restart.
        if self.offset > 0 {
            if let Err(e) = self
                .bot
                .get_updates()
                .offset(self.offset)
                .timeout(0)
                .limit(1)
                .await
            {
                warn!("Failed to confirm update offset {}: {e}", self.offset);
            }
        }
        info!("Telegram update stream stopped");
        Ok(())
    }
}

/// Map a raw Telegram update onto an [`InboundEvent`]. Updates other than
/// messages and callback queries yield `None`.
pub fn convert_update(update: &Update) -> Option<InboundEvent> {
    match &update.kind {
        UpdateKind::Message(message) => convert_message(message),
        UpdateKind::CallbackQuery(query) => {
            // Without an attached message the query can only come from a
            // private chat, whose id equals the user id.
            let chat_id = update
                .chat()
                .map(|chat| chat.id.0)
                .unwrap_or(query.from.id.0 as i64);
            Some(InboundEvent::CallbackQuery {
                chat_id,
                query_id: query.id.clone(),
                from: sender_info(&query.from),
                data: query.data.clone(),
            })
        }
        _ => None,
    }
}

fn convert_message(message: &Message) -> Option<InboundEvent> {
    let Some(text) = message.text() else {
        return Some(InboundEvent::Other {
            chat_id: message.chat.id.0,
        });
    };
    let origin = MessageOrigin {
        chat_id: message.chat.id.0,
        chat_kind: chat_kind(&message.chat),
        message_id: message.id.0,
        from: message.from.as_ref().map(sender_info),
    };

    match parse_command(text) {
        Some((name, args)) => Some(InboundEvent::Command { origin, name, args }),
        None => Some(InboundEvent::Text {
            origin,
            text: text.to_string(),
        }),
    }
}

/// Split `/cmd@botname arg1 ...` into `("cmd", "arg1 ...")`.
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let rest = text.trim_start().strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts
        .next()
        .unwrap_or("")
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();
    if name.is_empty() {
        return None;
    }
    let args = parts.next().unwrap_or("").trim().to_string();
    Some((name, args))
}

fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Private
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else if chat.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Group
    }
}

fn sender_info(user: &User) -> SenderInfo {
    SenderInfo {
        user_id: user.id.0 as i64,
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        username: user.username.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(
            parse_command("/echo Hello World"),
            Some(("echo".to_string(), "Hello World".to_string()))
        );
        assert_eq!(
            parse_command("/Start@relay_bot"),
            Some(("start".to_string(), String::new()))
        );
        assert_eq!(
            parse_command("/sendto   -100123   hi there  "),
            Some(("sendto".to_string(), "-100123   hi there".to_string()))
        );
    }

    #[test]
    fn test_parse_command_rejects_plain_text() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("/ spaced"), None);
    }

    #[test]
    fn test_new_requires_token() {
        let config = TelegramConfig {
            bot_token: None,
            ..TelegramConfig::default()
        };
        assert!(TelegramChannel::new(&config).is_err());

        let config = TelegramConfig {
            bot_token: Some(String::new()),
            ..TelegramConfig::default()
        };
        assert!(TelegramChannel::new(&config).is_err());
    }

    // `from_value` turns every update into `UpdateKind::Error`; parse text.
    fn parse_update(value: serde_json::Value) -> Update {
        serde_json::from_str(&value.to_string()).unwrap()
    }

    fn user_json(id: u64, first_name: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "is_bot": false,
            "first_name": first_name,
            "username": first_name.to_lowercase()
        })
    }

    #[test]
    fn test_convert_private_command() {
        let update = parse_update(serde_json::json!({
            "update_id": 7,
            "message": {
                "message_id": 5,
                "date": 1700000000,
                "chat": {"id": 42, "type": "private", "first_name": "Ann", "username": "ann"},
                "from": {"id": 42, "is_bot": false, "first_name": "Ann", "username": "ann"},
                "text": "/echo hi",
                "entities": [{"type": "bot_command", "offset": 0, "length": 5}]
            }
        }));

        let event = convert_update(&update).unwrap();
        match event {
            InboundEvent::Command { origin, name, args } => {
                assert_eq!(origin.chat_id, 42);
                assert_eq!(origin.message_id, 5);
                assert_eq!(origin.chat_kind, ChatKind::Private);
                assert_eq!(origin.from.unwrap().first_name, "Ann");
                assert_eq!(name, "echo");
                assert_eq!(args, "hi");
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn test_rewind_moves_offset_back_to_first_unhandled() {
        let channel = TelegramChannel::new(&TelegramConfig {
            bot_token: Some("1:test".to_string()),
            ..TelegramConfig::default()
        })
        .unwrap();
        let mut updates = channel.updates();
        updates.offset = 104;
        updates.batch_ids = vec![100, 101, 103];

        updates.rewind(0);
        assert_eq!(updates.offset, 104);

        updates.rewind(2);
        assert_eq!(updates.offset, 101);

        // Nothing left to rewind to.
        updates.rewind(1);
        assert_eq!(updates.offset, 101);
    }

    #[test]
    fn test_convert_group_text() {
        let update = parse_update(serde_json::json!({
            "update_id": 8,
            "message": {
                "message_id": 12,
                "date": 1700000000,
                "chat": {"id": -100200, "type": "supergroup", "title": "Ops"},
                "from": user_json(42, "Ann"),
                "text": "hello"
            }
        }));

        match convert_update(&update).unwrap() {
            InboundEvent::Text { origin, text } => {
                assert_eq!(origin.chat_id, -100200);
                assert_eq!(origin.chat_kind, ChatKind::Supergroup);
                assert_eq!(text, "hello");
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_convert_members_joined_registers_group() {
        let update = parse_update(serde_json::json!({
            "update_id": 9,
            "message": {
                "message_id": 3,
                "date": 1700000000,
                "chat": {"id": -100555, "type": "group", "title": "Team"},
                "from": user_json(42, "Ann"),
                "new_chat_members": [{
                    "id": 5,
                    "is_bot": true,
                    "first_name": "Courier",
                    "username": "courier_bot"
                }]
            }
        }));

        assert_eq!(
            convert_update(&update),
            Some(InboundEvent::Other { chat_id: -100555 })
        );
    }

    #[test]
    fn test_convert_callback_uses_message_chat() {
        let update = parse_update(serde_json::json!({
            "update_id": 10,
            "callback_query": {
                "id": "4382",
                "from": user_json(42, "Ann"),
                "chat_instance": "-7001",
                "data": "choice:a",
                "message": {
                    "message_id": 20,
                    "date": 1700000000,
                    "chat": {"id": -100300, "type": "supergroup", "title": "Ops"},
                    "from": {"id": 5, "is_bot": true, "first_name": "Courier"},
                    "text": "Pick one"
                }
            }
        }));

        match convert_update(&update).unwrap() {
            InboundEvent::CallbackQuery {
                chat_id,
                query_id,
                from,
                data,
            } => {
                assert_eq!(chat_id, -100300);
                assert_eq!(query_id, "4382");
                assert_eq!(from.user_id, 42);
                assert_eq!(data.as_deref(), Some("choice:a"));
            }
            other => panic!("expected callback query, got {other:?}"),
        }
    }

    #[test]
    fn test_convert_inline_callback_falls_back_to_user() {
        let update = parse_update(serde_json::json!({
            "update_id": 11,
            "callback_query": {
                "id": "4383",
                "from": user_json(77, "Bo"),
                "chat_instance": "-7002",
                "inline_message_id": "AAEx",
                "data": "choice:b"
            }
        }));

        let event = convert_update(&update).unwrap();
        assert_eq!(event.kind(), "callback_query");
        assert_eq!(event.chat_id(), 77);
    }
}
