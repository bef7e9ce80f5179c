//! In-memory fakes for the channel traits.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{ChatKind, InboundEvent, MessageOrigin, Messenger, SenderInfo, UpdateSource};
use crate::error::{DeliveryError, DeliveryResult, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub chat_id: i64,
    pub message_id: i32,
    pub text: String,
}

/// Messenger that records every call and fails sends to selected chats.
#[derive(Default)]
pub struct RecordingMessenger {
    failing: HashSet<i64>,
    failing_callbacks: bool,
    sends: Mutex<Vec<(i64, String)>>,
    replies: Mutex<Vec<Reply>>,
    callbacks: Mutex<Vec<(String, String)>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, chat_id: i64) -> Self {
        self.failing.insert(chat_id);
        self
    }

    pub fn failing_callbacks(mut self) -> Self {
        self.failing_callbacks = true;
        self
    }

    pub fn sends(&self) -> Vec<(i64, String)> {
        self.sends.lock().unwrap().clone()
    }

    pub fn sent_to(&self) -> Vec<i64> {
        self.sends().into_iter().map(|(id, _)| id).collect()
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.replies.lock().unwrap().clone()
    }

    pub fn last_reply(&self) -> Option<Reply> {
        self.replies.lock().unwrap().last().cloned()
    }

    pub fn callbacks(&self) -> Vec<(String, String)> {
        self.callbacks.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, chat_id: i64, text: &str) -> DeliveryResult {
        self.sends.lock().unwrap().push((chat_id, text.to_string()));
        if self.failing.contains(&chat_id) {
            return Err(DeliveryError::InvalidChat(format!("chat {chat_id} not found")));
        }
        Ok(())
    }

    async fn reply(&self, chat_id: i64, message_id: i32, text: &str) -> DeliveryResult {
        self.replies.lock().unwrap().push(Reply {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        if self.failing.contains(&chat_id) {
            return Err(DeliveryError::InvalidChat(format!("chat {chat_id} not found")));
        }
        Ok(())
    }

    async fn answer_callback(&self, query_id: &str, text: &str) -> DeliveryResult {
        self.callbacks
            .lock()
            .unwrap()
            .push((query_id.to_string(), text.to_string()));
        if self.failing_callbacks {
            return Err(DeliveryError::Api(format!("query {query_id} is too old")));
        }
        Ok(())
    }
}

/// Update source that hands out queued batches, then parks until dropped.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    batches: Arc<Mutex<VecDeque<Result<Vec<InboundEvent>>>>>,
    polls: Arc<AtomicUsize>,
    stopped: Arc<AtomicBool>,
    drained: Arc<Notify>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&self, batch: Vec<InboundEvent>) {
        self.batches.lock().unwrap().push_back(Ok(batch));
    }

    pub fn push_error(&self, err: crate::error::CourierError) {
        self.batches.lock().unwrap().push_back(Err(err));
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once every queued batch has been handed out.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            if self.batches.lock().unwrap().is_empty() {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn next_batch(&mut self) -> Result<Vec<InboundEvent>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(batch) => {
                if self.batches.lock().unwrap().is_empty() {
                    self.drained.notify_waiters();
                }
                batch
            }
            None => {
                // Behaves like an idle long poll.
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub fn sender(user_id: i64, first_name: &str) -> SenderInfo {
    SenderInfo {
        user_id,
        first_name: first_name.to_string(),
        last_name: None,
        username: Some(first_name.to_lowercase()),
    }
}

pub fn origin(chat_id: i64, message_id: i32) -> MessageOrigin {
    MessageOrigin {
        chat_id,
        chat_kind: ChatKind::Private,
        message_id,
        from: Some(sender(chat_id, "Alice")),
    }
}

pub fn text(chat_id: i64, body: &str) -> InboundEvent {
    InboundEvent::Text {
        origin: origin(chat_id, 10),
        text: body.to_string(),
    }
}

pub fn command(chat_id: i64, name: &str, args: &str) -> InboundEvent {
    InboundEvent::Command {
        origin: origin(chat_id, 10),
        name: name.to_string(),
        args: args.to_string(),
    }
}
