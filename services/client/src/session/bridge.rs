//! services/client/src/session/bridge.rs
//!
//! Keeps a patient transcript in step with the doctor replies that other
//! sessions write to the shared chat in origin storage.

use crate::store::Store;
use dermassist_core::persisted::load_shared_chat;
use dermassist_core::ports::{keys, KeyValueStorage, PortResult};
use dermassist_core::sync::merge_doctor_messages;
use dermassist_core::Action;
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone)]
pub struct SyncBridge {
    store: Store,
    storage: Arc<dyn KeyValueStorage>,
}

impl SyncBridge {
    pub fn new(store: Store, storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { store, storage }
    }

    /// Reads the persisted shared chat once and appends every doctor reply the
    /// transcript is missing. Returns how many messages were added.
    pub async fn sync_once(&self) -> usize {
        let persisted = load_shared_chat(self.storage.as_ref()).await;

        if self.store.state().shared_chat != persisted {
            self.store
                .dispatch(Action::SyncSharedChat(persisted.clone()))
                .await;
        }

        let new_messages = merge_doctor_messages(&persisted, &self.store.state().chat_history);
        let added = new_messages.len();
        for message in new_messages {
            self.store.dispatch(Action::AddMessage(message)).await;
        }

        if added > 0 {
            debug!("Merged {} doctor replies into the transcript", added);
        }
        added
    }

    /// Subscribes to storage changes, syncs once, then syncs again after every
    /// change to the shared chat until `token` is cancelled or the storage
    /// goes away.
    pub async fn spawn(self, token: CancellationToken) -> PortResult<JoinHandle<()>> {
        // Subscribe first so no change between the first read and the loop is missed.
        let mut events = self.storage.watch().await?;
        self.sync_once().await;

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.next() => match event {
                        Some(event) if event.touches(keys::SHARED_CHAT) => {
                            self.sync_once().await;
                        }
                        Some(_) => {}
                        None => {
                            info!("Storage change feed ended; shared chat sync stopped");
                            break;
                        }
                    },
                }
            }
        }))
    }
}
