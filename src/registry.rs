use std::collections::HashSet;

use tokio::sync::RwLock;
use tracing::debug;

/// Set of conversation ids the bot has seen since startup.
///
/// Membership only grows. The set lives in memory only, so it starts empty on
/// every restart and fills up again as inbound events arrive.
#[derive(Debug, Default)]
pub struct ChatRegistry {
    chats: RwLock<HashSet<i64>>,
}

impl ChatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `chat_id` if absent. Returns `true` when the id was new.
    pub async fn record(&self, chat_id: i64) -> bool {
        let inserted = self.chats.write().await.insert(chat_id);
        if inserted {
            debug!("Registered new chat {chat_id}");
        }
        inserted
    }

    /// Copy of every known id at call time, in no particular order.
    pub async fn snapshot(&self) -> Vec<i64> {
        self.chats.read().await.iter().copied().collect()
    }

    pub async fn contains(&self, chat_id: i64) -> bool {
        self.chats.read().await.contains(&chat_id)
    }

    pub async fn len(&self) -> usize {
        self.chats.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chats.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let registry = ChatRegistry::new();
        assert!(registry.record(42).await);
        assert!(!registry.record(42).await);
        assert_eq!(registry.snapshot().await, vec![42]);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let registry = ChatRegistry::new();
        assert!(registry.is_empty().await);
        assert!(registry.snapshot().await.is_empty());
        assert!(!registry.contains(1).await);
    }

    #[tokio::test]
    async fn test_negative_group_ids() {
        let registry = ChatRegistry::new();
        registry.record(-1001234567890).await;
        registry.record(12345).await;
        assert!(registry.contains(-1001234567890).await);
        let mut ids = registry.snapshot().await;
        ids.sort();
        assert_eq!(ids, vec![-1001234567890, 12345]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records_yield_distinct_set() {
        let registry = Arc::new(ChatRegistry::new());
        let mut handles = Vec::new();

        // 16 writers, each recording an overlapping range.
        for task in 0..16i64 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                for id in 0..100i64 {
                    registry.record((id + task * 10) % 250).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut ids = registry.snapshot().await;
        ids.sort();
        let expected: Vec<i64> = (0..250).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_completed_record_visible_to_later_snapshot() {
        let registry = Arc::new(ChatRegistry::new());

        let reader = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let ids = registry.snapshot().await;
                    // Ids are recorded in ascending order, so any snapshot is a prefix.
                    let mut sorted = ids.clone();
                    sorted.sort();
                    let expected: Vec<i64> = (0..sorted.len() as i64).collect();
                    assert_eq!(sorted, expected);
                    tokio::task::yield_now().await;
                }
            })
        };

        for id in 0..500i64 {
            registry.record(id).await;
            assert!(registry.snapshot().await.contains(&id));
        }

        reader.await.unwrap();
    }
}
