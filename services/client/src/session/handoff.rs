//! services/client/src/session/handoff.rs
//!
//! Hand-off of the case to a physician: snapshot the case for the doctor
//! dashboard, announce the request, and after a simulated delay mark the
//! physician as connected.

use super::PatientSession;
use crate::store::Store;
use chrono::Utc;
use dermassist_core::domain::{ChatMessage, MessageId, MessagePatch, MessageType, PhysicianButtonState};
use dermassist_core::persisted::write_json;
use dermassist_core::ports::keys;
use dermassist_core::Action;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const CONNECTING_TEXT: &str = "Connecting you to a physician...";
pub const CONNECTED_TEXT: &str =
    "You are now connected to a physician. They will review your case and respond shortly.";

/// A hand-off waiting for its simulated connection.
pub struct HandoffHandle {
    /// The system message that announces the hand-off.
    pub message_id: MessageId,
    task: JoinHandle<()>,
}

impl HandoffHandle {
    /// Resolves once the physician shows as connected, or once the session is
    /// closed.
    pub async fn connected(self) {
        let _ = self.task.await;
    }
}

impl PatientSession {
    /// Hands the case over to a physician. Returns `None` when a hand-off is
    /// already connecting or connected.
    pub async fn request_physician(&self) -> Option<HandoffHandle> {
        if self.is_closed()
            || self.store.state().physician_button_state != PhysicianButtonState::Disconnected
            || self
                .handoff_requested
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return None;
        }

        info!("Patient requested a physician");
        self.store
            .dispatch(Action::UpdatePhysicianButton(PhysicianButtonState::Connecting))
            .await;
        self.store
            .dispatch(Action::RequestPhysician {
                timestamp: Utc::now(),
            })
            .await;

        let snapshot = self.store.state().doctor_snapshot();
        self.store
            .dispatch(Action::SetDoctorData(snapshot.clone()))
            .await;
        let storage = self.store.storage();
        if let Err(e) = write_json(storage.as_ref(), keys::DOCTOR_DATA, &snapshot).await {
            warn!("Failed to hand the case snapshot to the dashboard: {}", e);
        }

        let message_id = self.ids.next_id();
        self.store
            .dispatch(Action::AddMessage(ChatMessage::bot(
                message_id,
                CONNECTING_TEXT,
                MessageType::System,
            )))
            .await;

        let task = tokio::spawn(complete_handoff(
            self.store.clone(),
            message_id,
            self.timings.physician_connect_delay,
            self.token.child_token(),
        ));

        Some(HandoffHandle { message_id, task })
    }
}

async fn complete_handoff(
    store: Store,
    message_id: MessageId,
    delay: Duration,
    token: CancellationToken,
) {
    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(delay) => {}
    }

    store
        .dispatch(Action::UpdatePhysicianButton(PhysicianButtonState::Connected))
        .await;
    store
        .dispatch(Action::PhysicianConnected {
            timestamp: Utc::now(),
        })
        .await;
    store
        .dispatch(Action::UpdateMessage {
            id: message_id,
            updates: MessagePatch::text(CONNECTED_TEXT),
        })
        .await;

    if let Err(e) = store
        .storage()
        .set_item(keys::PHYSICIAN_CONNECTED, "true")
        .await
    {
        warn!("Failed to record the physician connection: {}", e);
    }
    info!("Physician connected");
}
