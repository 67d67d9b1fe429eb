//! services/client/src/session/mod.rs
//!
//! The patient session: one open "tab" of the patient view with its store,
//! its background tasks, and the user-facing operations (intake form, chat,
//! physician hand-off).

pub mod bridge;
pub mod chat;
pub mod handoff;
pub mod intake;
pub mod typing;

pub use bridge::SyncBridge;
pub use handoff::HandoffHandle;
pub use intake::{DiagnosisSubmission, UserDetails};
pub use typing::{RevealRequest, TypingHandle, TypingRenderer};

use crate::config::SessionTimings;
use crate::store::Store;
use dermassist_core::domain::{ChatMessage, ImageHandle, MessageType, ViewState};
use dermassist_core::ports::{keys, DiagnosisService, KeyValueStorage, PortResult};
use dermassist_core::{Action, MessageIdGenerator};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

pub const WELCOME_TEXT: &str = "Hello! I'm your dermatology assistant. How can I help you today?";

//=========================================================================================
// PatientSession
//=========================================================================================

pub struct PatientSession {
    store: Store,
    service: Arc<dyn DiagnosisService>,
    ids: Arc<MessageIdGenerator>,
    typing: TypingRenderer,
    timings: SessionTimings,
    /// Cancels every task this session started.
    token: CancellationToken,
    upload_progress: Arc<watch::Sender<u8>>,
    diagnosing: AtomicBool,
    chat_in_flight: AtomicBool,
    handoff_requested: AtomicBool,
    bridge: Mutex<Option<JoinHandle<()>>>,
}

impl PatientSession {
    /// Opens a session on `storage`. Call `start` before using it.
    pub async fn open(
        storage: Arc<dyn KeyValueStorage>,
        service: Arc<dyn DiagnosisService>,
        timings: SessionTimings,
    ) -> Self {
        let store = Store::open(storage).await;
        let ids = Arc::new(MessageIdGenerator::new());
        let token = CancellationToken::new();
        let typing = TypingRenderer::new(
            store.clone(),
            ids.clone(),
            timings.typing_interval,
            token.clone(),
        );
        let (upload_progress, _rx) = watch::channel(0u8);

        Self {
            store,
            service,
            ids,
            typing,
            timings,
            token,
            upload_progress: Arc::new(upload_progress),
            diagnosing: AtomicBool::new(false),
            chat_in_flight: AtomicBool::new(false),
            handoff_requested: AtomicBool::new(false),
            bridge: Mutex::new(None),
        }
    }

    /// Restores or creates the conversation id, greets an empty transcript and
    /// starts listening for doctor replies.
    pub async fn start(&self) -> PortResult<()> {
        let storage = self.store.storage();

        let session_id = match storage.get_item(keys::SESSION_ID).await {
            Ok(Some(id)) if !id.is_empty() => id,
            Ok(_) => {
                let id = Uuid::new_v4().to_string();
                if let Err(e) = storage.set_item(keys::SESSION_ID, &id).await {
                    warn!("Could not store the new session id, it will not survive a restart: {}", e);
                }
                id
            }
            Err(e) => {
                warn!("Could not read the stored session id, starting a new one: {}", e);
                Uuid::new_v4().to_string()
            }
        };
        info!("Patient session {} started", session_id);
        self.store.dispatch(Action::SetSession(session_id)).await;

        if self.store.state().chat_history.is_empty() {
            let welcome = ChatMessage::bot(self.ids.next_id(), WELCOME_TEXT, MessageType::Text);
            self.store.dispatch(Action::AddMessage(welcome)).await;
        }

        let task = SyncBridge::new(self.store.clone(), storage)
            .spawn(self.token.child_token())
            .await?;
        if let Some(previous) = self.bridge_slot().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    fn bridge_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.bridge
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn state(&self) -> Arc<ViewState> {
        self.store.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ViewState>> {
        self.store.subscribe()
    }

    /// Upload progress of the diagnosis request in flight, 0 when idle.
    pub fn upload_progress(&self) -> watch::Receiver<u8> {
        self.upload_progress.subscribe()
    }

    pub fn typing(&self) -> &TypingRenderer {
        &self.typing
    }

    /// Whether a request is in flight or a message is still being revealed.
    pub fn is_busy(&self) -> bool {
        use std::sync::atomic::Ordering;
        self.diagnosing.load(Ordering::Acquire)
            || self.chat_in_flight.load(Ordering::Acquire)
            || self.typing.is_typing()
    }

    /// Holds the image in memory and gives it a local object URL.
    pub async fn select_image(&self, image: ImageHandle) -> String {
        let url = format!("blob:dermassist/{}", Uuid::new_v4());
        self.store.dispatch(Action::SetImage(image)).await;
        self.store.dispatch(Action::SetImageUrl(url.clone())).await;
        url
    }

    pub async fn set_symptoms(&self, symptoms: impl Into<String>) {
        self.store
            .dispatch(Action::SetSymptoms(symptoms.into()))
            .await;
    }

    pub async fn resize(&self, width: u32) {
        self.store.dispatch(Action::SetScreenWidth(width)).await;
    }

    /// Stops the sync bridge and every pending timer of this session.
    pub fn shutdown(&self) {
        self.token.cancel();
        info!("Patient session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for PatientSession {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Clears a busy flag when the guarded operation ends, however it ends.
pub(crate) struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    /// Sets `flag`, or returns `None` if it was already set.
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        use std::sync::atomic::Ordering;
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, std::sync::atomic::Ordering::Release);
    }
}
