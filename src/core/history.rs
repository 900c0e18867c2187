//! Rolling chat history, cached per conversation with a time-to-live.
//!
//! Each conversation id owns a slot guarded by an async mutex. A turn holds the
//! slot from the moment it reads the history until it has stored the reply, so
//! concurrent turns for the same conversation run one after another and never
//! overwrite each other's messages.

use crate::core::assistant::{ChatMessage, most_recent};
use crate::infrastructure::settings::Settings;
use dashmap::DashMap;
use di::{Ref, inject, injectable};
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Slot {
    messages: Vec<ChatMessage>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline > now)
    }
}

pub struct HistoryCache {
    slots: DashMap<String, Arc<Mutex<Slot>>>,
    ttl: Duration,
    limit: usize,
}

#[injectable]
impl HistoryCache {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> HistoryCache {
        HistoryCache::new(settings.history_ttl, settings.history_cache_limit)
    }
}

impl HistoryCache {
    pub fn new(ttl: Duration, limit: usize) -> HistoryCache {
        HistoryCache {
            slots: DashMap::new(),
            ttl,
            limit,
        }
    }

    /// Waits until no other turn holds this conversation's history.
    pub async fn lock(&self, conversation_id: &str) -> HistoryGuard {
        let slot = self
            .slots
            .entry(conversation_id.to_owned())
            .or_default()
            .clone();

        HistoryGuard {
            slot: slot.lock_owned().await,
            ttl: self.ttl,
            limit: self.limit,
        }
    }

    /// Drops expired slots nobody is currently using. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();

        self.slots.retain(|_, slot| {
            // Anyone else holding the Arc may be about to write to it.
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(guard) => guard.is_live(now),
                Err(_) => true,
            }
        });

        let removed = before.saturating_sub(self.slots.len());
        if removed > 0 {
            debug!("purged {removed} expired conversation histories");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Exclusive access to one conversation's cached history.
pub struct HistoryGuard {
    slot: OwnedMutexGuard<Slot>,
    ttl: Duration,
    limit: usize,
}

impl HistoryGuard {
    /// The cached messages, or nothing if the entry is absent or expired.
    pub fn messages(&self) -> Vec<ChatMessage> {
        if self.slot.is_live(Instant::now()) {
            self.slot.messages.clone()
        } else {
            Vec::new()
        }
    }

    /// Keeps the most recent messages and restarts the time-to-live.
    pub fn store(&mut self, messages: &[ChatMessage]) {
        self.slot.messages = most_recent(messages, self.limit);
        self.slot.expires_at = Some(Instant::now() + self.ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> HistoryCache {
        HistoryCache::new(Duration::from_secs(3600), 10)
    }

    #[tokio::test]
    async fn test_absent_entry_reads_as_empty() {
        let cache = cache();
        let guard = cache.lock("c1").await;
        assert!(guard.messages().is_empty());
    }

    #[tokio::test]
    async fn test_store_truncates_to_limit() {
        let cache = cache();
        let messages: Vec<ChatMessage> = (0..14).map(|n| ChatMessage::user(n.to_string())).collect();

        cache.lock("c1").await.store(&messages);

        let stored = cache.lock("c1").await.messages();
        assert_eq!(stored.len(), 10);
        assert_eq!(stored[0].content, "4");
        assert_eq!(stored[9].content, "13");
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = HistoryCache::new(Duration::from_secs(60), 10);
        cache.lock("c1").await.store(&[ChatMessage::user("hi")]);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.lock("c1").await.messages().len(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.lock("c1").await.messages().is_empty());

        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_keeps_live_and_locked_entries() {
        let cache = HistoryCache::new(Duration::from_secs(60), 10);
        cache.lock("live").await.store(&[ChatMessage::user("hi")]);
        let _held = cache.lock("busy").await;

        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_turns_on_one_conversation_do_not_lose_updates() {
        let cache = Arc::new(cache());

        let tasks: Vec<_> = (0..5)
            .map(|n| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let mut guard = cache.lock("shared").await;
                    let mut history = guard.messages();
                    tokio::task::yield_now().await;
                    history.push(ChatMessage::user(format!("turn {n}")));
                    guard.store(&history);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(cache.lock("shared").await.messages().len(), 5);
    }
}
