//! crates/dermassist_core/src/reducer.rs
//!
//! The view-state reducer: a pure function from (state, action) to the next state.
//!
//! States are shared behind `Arc`. An action that changes nothing hands back the
//! very same `Arc`, so callers can detect no-ops with `Arc::ptr_eq`.

use crate::domain::{
    ChatMessage, DiagnosisResult, DoctorData, ImageHandle, MessageId, MessagePatch,
    PhysicianButtonState, PhysicianRequest, PhysicianRequestStatus, SharedChatEntry,
    SharedMessage, UserProfile, ViewState,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

/// Every state transition a session can request.
///
/// Actions deserialize from `{"type": "...", "payload": ...}` using the tag
/// names the browser client used; an unrecognised tag becomes `Unknown`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    SetUser(UserProfile),
    #[serde(skip)]
    SetImage(ImageHandle),
    SetImageUrl(String),
    SetSymptoms(String),
    SetDiagnosis(DiagnosisResult),
    AddMessage(ChatMessage),
    SetDoctorData(DoctorData),
    SetScreenWidth(u32),
    SetSession(String),
    ResetChat,
    UpdateMessageText {
        id: MessageId,
        text: String,
    },
    UpdateMessage {
        id: MessageId,
        updates: MessagePatch,
    },
    RemoveMessage(MessageId),
    AddSharedMessage(SharedMessage),
    ClearSharedChat,
    SyncSharedChat(Vec<SharedChatEntry>),
    RequestPhysician {
        timestamp: DateTime<Utc>,
    },
    PhysicianConnected {
        timestamp: DateTime<Utc>,
    },
    UpdatePhysicianButton(PhysicianButtonState),
    #[serde(other)]
    Unknown,
}

impl Action {
    /// Decodes an action from its JSON form. Anything that does not decode
    /// into a known action becomes `Unknown`, so replaying foreign actions can
    /// never fail.
    pub fn from_value(value: serde_json::Value) -> Self {
        match serde_json::from_value(value) {
            Ok(action) => action,
            Err(e) => {
                warn!("Treating undecodable action as a no-op: {}", e);
                Action::Unknown
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::SetUser(_) => "SET_USER",
            Action::SetImage(_) => "SET_IMAGE",
            Action::SetImageUrl(_) => "SET_IMAGE_URL",
            Action::SetSymptoms(_) => "SET_SYMPTOMS",
            Action::SetDiagnosis(_) => "SET_DIAGNOSIS",
            Action::AddMessage(_) => "ADD_MESSAGE",
            Action::SetDoctorData(_) => "SET_DOCTOR_DATA",
            Action::SetScreenWidth(_) => "SET_SCREEN_WIDTH",
            Action::SetSession(_) => "SET_SESSION",
            Action::ResetChat => "RESET_CHAT",
            Action::UpdateMessageText { .. } => "UPDATE_MESSAGE_TEXT",
            Action::UpdateMessage { .. } => "UPDATE_MESSAGE",
            Action::RemoveMessage(_) => "REMOVE_MESSAGE",
            Action::AddSharedMessage(_) => "ADD_SHARED_MESSAGE",
            Action::ClearSharedChat => "CLEAR_SHARED_CHAT",
            Action::SyncSharedChat(_) => "SYNC_SHARED_CHAT",
            Action::RequestPhysician { .. } => "REQUEST_PHYSICIAN",
            Action::PhysicianConnected { .. } => "PHYSICIAN_CONNECTED",
            Action::UpdatePhysicianButton(_) => "UPDATE_PHYSICIAN_BUTTON",
            Action::Unknown => "UNKNOWN",
        }
    }
}

fn position(state: &ViewState, id: MessageId) -> Option<usize> {
    state.chat_history.iter().position(|m| m.id == id)
}

/// Applies `action` to `state`. Never panics; unknown actions and updates that
/// target a missing message return `state` itself.
pub fn reduce(state: &Arc<ViewState>, action: Action) -> Arc<ViewState> {
    let mut next = ViewState::clone(state);

    match action {
        Action::SetUser(user) => next.user = Some(user),
        Action::SetImage(image) => next.image = Some(image),
        Action::SetImageUrl(url) => next.image_url = Some(url),
        Action::SetSymptoms(symptoms) => next.symptoms = symptoms,
        Action::SetDiagnosis(diagnosis) => next.diagnosis = Some(diagnosis),
        Action::AddMessage(message) => next.chat_history.push(message),
        Action::SetDoctorData(data) => next.doctor_data = Some(data),
        Action::SetScreenWidth(width) => next.screen_width = width,
        Action::SetSession(session) => next.active_session = Some(session),
        Action::ResetChat => next.chat_history.clear(),
        Action::UpdateMessageText { id, text } => match position(state, id) {
            Some(idx) => next.chat_history[idx].text = text,
            None => return Arc::clone(state),
        },
        Action::UpdateMessage { id, updates } => match position(state, id) {
            Some(idx) => updates.apply(&mut next.chat_history[idx]),
            None => return Arc::clone(state),
        },
        Action::RemoveMessage(id) => {
            if position(state, id).is_none() {
                return Arc::clone(state);
            }
            next.chat_history.retain(|m| m.id != id);
        }
        Action::AddSharedMessage(message) => next.shared_chat.push(message.into()),
        Action::ClearSharedChat => next.shared_chat.clear(),
        Action::SyncSharedChat(entries) => next.shared_chat = entries,
        Action::RequestPhysician { timestamp } => {
            next.physician_request = Some(PhysicianRequest {
                status: PhysicianRequestStatus::Pending,
                timestamp,
            })
        }
        Action::PhysicianConnected { timestamp } => {
            next.physician_request = Some(PhysicianRequest {
                status: PhysicianRequestStatus::Connected,
                timestamp,
            })
        }
        Action::UpdatePhysicianButton(button) => next.physician_button_state = button,
        Action::Unknown => return Arc::clone(state),
    }

    Arc::new(next)
}
