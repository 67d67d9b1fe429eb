//! services/client/src/adapters/memory.rs
//!
//! An in-process origin storage. Every `MemoryStorage` opened from the same
//! `MemoryOrigin` behaves like one browser tab: they share all values, and each
//! one is told about the changes the *others* make.

use async_stream::stream;
use async_trait::async_trait;
use dermassist_core::ports::{KeyValueStorage, PortResult, StorageEvent, StorageEvents};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::warn;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Change {
    source: u64,
    event: StorageEvent,
}

struct OriginInner {
    items: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<Change>,
    next_tab: AtomicU64,
}

impl OriginInner {
    fn publish(&self, source: u64, key: Option<&str>, new_value: Option<&str>) {
        // No receivers simply means no other tab is listening.
        let _ = self.events.send(Change {
            source,
            event: StorageEvent {
                key: key.map(str::to_string),
                new_value: new_value.map(str::to_string),
            },
        });
    }
}

/// The shared storage area of one origin.
#[derive(Clone)]
pub struct MemoryOrigin {
    inner: Arc<OriginInner>,
}

impl MemoryOrigin {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(OriginInner {
                items: Mutex::new(HashMap::new()),
                events,
                next_tab: AtomicU64::new(1),
            }),
        }
    }

    /// Opens a new handle with its own identity.
    pub fn open_tab(&self) -> MemoryStorage {
        MemoryStorage {
            tab_id: self.inner.next_tab.fetch_add(1, Ordering::Relaxed),
            origin: self.inner.clone(),
        }
    }

    /// Removes every key. All tabs are notified with a key-less event.
    pub fn clear(&self) {
        self.inner
            .items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        self.inner.publish(0, None, None);
    }
}

impl Default for MemoryOrigin {
    fn default() -> Self {
        Self::new()
    }
}

/// One tab's handle on a `MemoryOrigin`.
#[derive(Clone)]
pub struct MemoryStorage {
    tab_id: u64,
    origin: Arc<OriginInner>,
}

impl MemoryStorage {
    fn items(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.origin
            .items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get_item(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.items().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> PortResult<()> {
        self.items().insert(key.to_string(), value.to_string());
        self.origin.publish(self.tab_id, Some(key), Some(value));
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> PortResult<()> {
        let removed = self.items().remove(key);
        if removed.is_some() {
            self.origin.publish(self.tab_id, Some(key), None);
        }
        Ok(())
    }

    async fn watch(&self) -> PortResult<StorageEvents> {
        let mut rx = self.origin.events.subscribe();
        let me = self.tab_id;

        Ok(Box::pin(stream! {
            loop {
                match rx.recv().await {
                    Ok(change) if change.source != me => yield change.event,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Storage listener of tab {} missed {} changes", me, skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dermassist_core::persisted::{load_shared_chat, read_json, write_json};
    use dermassist_core::ports::keys;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn tabs_share_values() {
        let origin = MemoryOrigin::new();
        let a = origin.open_tab();
        let b = origin.open_tab();

        a.set_item("session_id", "abc").await.unwrap();
        assert_eq!(b.get_item("session_id").await.unwrap().as_deref(), Some("abc"));

        b.remove_item("session_id").await.unwrap();
        assert_eq!(a.get_item("session_id").await.unwrap(), None);
    }

    #[tokio::test]
    async fn writer_is_not_notified_of_its_own_change() {
        let origin = MemoryOrigin::new();
        let a = origin.open_tab();
        let b = origin.open_tab();
        let mut a_events = a.watch().await.unwrap();
        let mut b_events = b.watch().await.unwrap();

        a.set_item("sharedChat", "[]").await.unwrap();

        let event = timeout(Duration::from_secs(1), b_events.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.key.as_deref(), Some("sharedChat"));
        assert_eq!(event.new_value.as_deref(), Some("[]"));
        assert!(timeout(Duration::from_millis(50), a_events.next()).await.is_err());
    }

    #[tokio::test]
    async fn clear_notifies_everyone() {
        let origin = MemoryOrigin::new();
        let a = origin.open_tab();
        a.set_item("doctorData", "{}").await.unwrap();
        let mut events = a.watch().await.unwrap();

        origin.clear();

        let event = events.next().await.unwrap();
        assert!(event.touches(keys::SHARED_CHAT));
        assert_eq!(a.get_item("doctorData").await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_json_reads_as_absent() {
        let tab = MemoryOrigin::new().open_tab();
        tab.set_item(keys::SHARED_CHAT, "{not json").await.unwrap();
        assert!(load_shared_chat(&tab).await.is_empty());

        write_json(&tab, "numbers", &vec![1, 2, 3]).await.unwrap();
        let numbers: Option<Vec<i32>> = read_json(&tab, "numbers").await;
        assert_eq!(numbers, Some(vec![1, 2, 3]));
    }
}
