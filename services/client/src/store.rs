//! services/client/src/store.rs
//!
//! The view-state store of one session. It owns the current `ViewState`,
//! serializes every dispatch through the pure reducer, publishes the new state
//! to subscribers, and performs the one storage side effect the reducer leaves
//! out: keeping `sharedChat` in origin storage equal to the in-memory list.

use dermassist_core::persisted::write_json;
use dermassist_core::ports::{keys, KeyValueStorage};
use dermassist_core::{persisted, reduce, Action, ViewState};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{trace, warn};

const DISPATCH_LOG_CAPACITY: usize = 1024;

/// What one dispatch did, for observers that care about actions rather than
/// states (the terminal front end, tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRecord {
    pub action: &'static str,
    pub changed: bool,
}

struct StoreInner {
    /// Held across the reducer *and* the storage write so that dispatches apply
    /// and persist in issue order.
    current: Mutex<Arc<ViewState>>,
    published: watch::Sender<Arc<ViewState>>,
    log: broadcast::Sender<DispatchRecord>,
    storage: Arc<dyn KeyValueStorage>,
}

/// A cheaply cloneable handle on one session's state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Creates a store seeded with the shared chat already in `storage`.
    pub async fn open(storage: Arc<dyn KeyValueStorage>) -> Self {
        let shared_chat = persisted::load_shared_chat(storage.as_ref()).await;
        Self::with_state(storage, ViewState::with_shared_chat(shared_chat))
    }

    pub fn with_state(storage: Arc<dyn KeyValueStorage>, state: ViewState) -> Self {
        let state = Arc::new(state);
        let (published, _rx) = watch::channel(state.clone());
        let (log, _rx) = broadcast::channel(DISPATCH_LOG_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                current: Mutex::new(state),
                published,
                log,
                storage,
            }),
        }
    }

    /// The latest published state.
    pub fn state(&self) -> Arc<ViewState> {
        self.inner.published.borrow().clone()
    }

    /// A receiver that is marked changed after every dispatch that changed
    /// the state.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ViewState>> {
        self.inner.published.subscribe()
    }

    /// A feed of every dispatched action from now on.
    pub fn observe(&self) -> broadcast::Receiver<DispatchRecord> {
        self.inner.log.subscribe()
    }

    pub fn storage(&self) -> Arc<dyn KeyValueStorage> {
        self.inner.storage.clone()
    }

    /// Applies `action` and returns the resulting state. Never fails: storage
    /// write errors are logged and the in-memory state still advances.
    pub async fn dispatch(&self, action: Action) -> Arc<ViewState> {
        let name = action.name();
        let touches_shared_chat =
            matches!(action, Action::AddSharedMessage(_) | Action::ClearSharedChat);

        let mut current = self.inner.current.lock().await;
        let next = reduce(&current, action);
        let changed = !Arc::ptr_eq(&current, &next);

        if changed && touches_shared_chat {
            self.persist_shared_chat(&next).await;
        }

        *current = next.clone();
        if changed {
            self.inner.published.send_replace(next.clone());
        }
        drop(current);

        trace!("Dispatched {} (changed: {})", name, changed);
        // Nobody observing is fine.
        let _ = self.inner.log.send(DispatchRecord {
            action: name,
            changed,
        });
        next
    }

    async fn persist_shared_chat(&self, state: &ViewState) {
        let storage = self.inner.storage.as_ref();
        let result = if state.shared_chat.is_empty() {
            storage.remove_item(keys::SHARED_CHAT).await
        } else {
            write_json(storage, keys::SHARED_CHAT, &state.shared_chat).await
        };

        if let Err(e) = result {
            warn!("Failed to persist the shared chat: {}", e);
        }
    }
}
