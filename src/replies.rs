//! Canned reply texts.

use crate::channels::{ChatKind, SenderInfo};

const COMMAND_LIST: &str = "\
/start - Show the welcome message
/help - Show this help
/info - Show your user info
/echo <text> - Repeat your text
/sendto <chat_id> <message> - Send a message to a chat
/broadcast <message> - Send a message to every known chat";

pub const UNKNOWN_COMMAND: &str = "Sorry, I don't know that command. Type /help to see what I can do.";
pub const ECHO_USAGE: &str = "Please type some text after /echo.\nExample: /echo Hello World";
pub const SENDTO_USAGE: &str =
    "Usage: /sendto <chat_id> <message>\nExample: /sendto -1001234567890 Hello Group!";
pub const SENDTO_INVALID_ID: &str = "Invalid chat ID. A chat ID must be a number.";
pub const BROADCAST_USAGE: &str =
    "Usage: /broadcast <message>\nExample: /broadcast Scheduled maintenance tonight";
pub const NO_KNOWN_CHATS: &str =
    "There are no known chats yet. Add the bot to a group or send it a message first.";
pub const CALLBACK_ACK: &str = "Processed!";
pub const THANKS: &str = "You're welcome! Happy to help 😊";
pub const FAREWELL: &str = "Goodbye! See you next time 👋";

pub fn welcome(name: &str) -> String {
    format!(
        "👋 Welcome, {name}!\n\n\
         I'm a Telegram relay bot.\n\n\
         Available commands:\n{COMMAND_LIST}\n\n\
         You can also just send me a message and I'll answer!"
    )
}

pub fn help() -> String {
    format!(
        "📚 Available commands:\n\n{COMMAND_LIST}\n\n\
         💡 You can also send me any text message and I'll respond!"
    )
}

pub fn info(sender: Option<&SenderInfo>, chat_kind: ChatKind, chat_id: i64) -> String {
    let (name, user_id, username) = match sender {
        Some(s) => (
            s.full_name(),
            s.user_id.to_string(),
            s.username.clone().unwrap_or_default(),
        ),
        None => ("unknown".to_string(), "unknown".to_string(), String::new()),
    };
    format!(
        "ℹ️ Your info:\n\n\
         👤 Name: {name}\n\
         🆔 User ID: {user_id}\n\
         📝 Username: @{username}\n\
         💬 Chat type: {chat_kind}\n\
         🔢 Chat ID: {chat_id}"
    )
}

pub fn echo(text: &str) -> String {
    format!("🔄 You said: {text}")
}

pub fn sendto_ok(chat_id: i64) -> String {
    format!("✅ Message sent to chat {chat_id}")
}

pub fn sendto_failed(err: &impl std::fmt::Display) -> String {
    format!("❌ Send failed: {err}")
}

pub fn broadcast_summary(success: usize, failed: usize) -> String {
    format!("📢 Broadcast finished!\n✅ Succeeded: {success} chats\n❌ Failed: {failed} chats")
}

pub fn greeting(name: &str) -> String {
    format!("Hello {name}! Nice to meet you 😊")
}

pub fn fallback(text: &str) -> String {
    format!(
        "You sent: \"{text}\"\n\n\
         I'm a simple bot and still learning! Type /help to see what I can do."
    )
}

/// Reply category for a plain text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phrase {
    Greeting,
    Thanks,
    Farewell,
}

const PHRASES: &[(&str, Phrase)] = &[
    ("hello", Phrase::Greeting),
    ("hi", Phrase::Greeting),
    ("你好", Phrase::Greeting),
    ("thanks", Phrase::Thanks),
    ("thank you", Phrase::Thanks),
    ("謝謝", Phrase::Thanks),
    ("bye", Phrase::Farewell),
    ("goodbye", Phrase::Farewell),
    ("再見", Phrase::Farewell),
];

/// Whole-message, case-insensitive lookup in the phrase table.
pub fn match_phrase(text: &str) -> Option<Phrase> {
    let normalized = text.trim().to_lowercase();
    PHRASES
        .iter()
        .find(|(phrase, _)| *phrase == normalized)
        .map(|(_, kind)| *kind)
}
