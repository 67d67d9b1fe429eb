//! crates/dermassist_core/src/domain.rs
//!
//! Defines the core data structures shared by the patient and doctor views.
//! Field names serialize in the same camelCase layout the browser storage uses,
//! so persisted values written by either side stay readable by the other.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message identity. Values come from a millisecond clock (see `ids`).
pub type MessageId = i64;

/// The default viewport width used before the host reports a real one.
pub const DEFAULT_SCREEN_WIDTH: u32 = 1280;

//=========================================================================================
// Chat Transcript
//=========================================================================================

/// The semantic kind of a chat message, which drives how it is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    #[default]
    Text,
    Diagnosis,
    System,
    Error,
    TypingIndicator,
}

/// A single entry in a session's in-memory chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub is_doctor: bool,
    #[serde(default)]
    pub is_typing: bool,
    #[serde(rename = "type", default)]
    pub kind: MessageType,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl ChatMessage {
    /// A message authored by the assistant.
    pub fn bot(id: MessageId, text: impl Into<String>, kind: MessageType) -> Self {
        Self {
            id,
            text: text.into(),
            timestamp: Utc::now(),
            is_bot: true,
            is_doctor: false,
            is_typing: false,
            kind,
            suggested_actions: Vec::new(),
            confidence: None,
            condition: None,
            sender: None,
        }
    }

    /// A message typed by the patient.
    pub fn patient(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            is_bot: false,
            sender: Some(SenderType::Patient.as_str().to_string()),
            ..Self::bot(id, text, MessageType::Text)
        }
    }

    pub fn with_actions(mut self, actions: Vec<String>) -> Self {
        self.suggested_actions = actions;
        self
    }

    pub fn typing(mut self) -> Self {
        self.is_typing = true;
        self
    }
}

/// A partial update applied to one message by `UPDATE_MESSAGE`.
/// Only the fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePatch {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub is_typing: Option<bool>,
    #[serde(default, rename = "type")]
    pub kind: Option<MessageType>,
    #[serde(default)]
    pub suggested_actions: Option<Vec<String>>,
    #[serde(default)]
    pub confidence: Option<i64>,
    #[serde(default)]
    pub condition: Option<String>,
}

impl MessagePatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn typing_done() -> Self {
        Self {
            is_typing: Some(false),
            ..Default::default()
        }
    }

    pub(crate) fn apply(self, message: &mut ChatMessage) {
        if let Some(text) = self.text {
            message.text = text;
        }
        if let Some(is_typing) = self.is_typing {
            message.is_typing = is_typing;
        }
        if let Some(kind) = self.kind {
            message.kind = kind;
        }
        if let Some(actions) = self.suggested_actions {
            message.suggested_actions = actions;
        }
        if self.confidence.is_some() {
            message.confidence = self.confidence;
        }
        if self.condition.is_some() {
            message.condition = self.condition;
        }
    }
}

//=========================================================================================
// Shared (Cross-Tab) Chat
//=========================================================================================

/// Who wrote an entry of the shared chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Doctor,
    #[default]
    Patient,
}

impl SenderType {
    /// Anything other than an explicit "doctor" sender counts as the patient.
    pub fn from_sender(sender: Option<&str>) -> Self {
        match sender {
            Some("doctor") => SenderType::Doctor,
            _ => SenderType::Patient,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::Doctor => "doctor",
            SenderType::Patient => "patient",
        }
    }
}

/// A message as it is written to the persisted `sharedChat` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedChatEntry {
    pub id: MessageId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default)]
    pub sender_type: SenderType,
}

impl SharedChatEntry {
    /// The transcript form of a doctor reply as the patient sees it.
    pub fn to_doctor_message(&self) -> ChatMessage {
        ChatMessage {
            id: self.id,
            text: self.text.clone(),
            timestamp: self.timestamp,
            is_bot: true,
            is_doctor: true,
            is_typing: false,
            kind: MessageType::Text,
            suggested_actions: Vec::new(),
            confidence: None,
            condition: None,
            sender: self.sender.clone(),
        }
    }
}

/// The payload of `ADD_SHARED_MESSAGE`; the reducer derives `senderType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedMessage {
    pub id: MessageId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub sender: Option<String>,
}

impl From<SharedMessage> for SharedChatEntry {
    fn from(message: SharedMessage) -> Self {
        let sender_type = SenderType::from_sender(message.sender.as_deref());
        Self {
            id: message.id,
            text: message.text,
            timestamp: message.timestamp,
            sender: message.sender,
            sender_type,
        }
    }
}

//=========================================================================================
// Patient Case
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    pub age: Option<u32>,
}

/// An uploaded skin image. Held in memory only; never persisted.
#[derive(Clone, PartialEq)]
pub struct ImageHandle {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl ImageHandle {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_name: String,
    #[serde(default)]
    pub age: Option<u32>,
}

/// The normalized outcome of one successful diagnosis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub predicted_disease: String,
    pub confidence_score: i64,
    pub chatbot_response: String,
    pub suggested_actions: Vec<String>,
    pub user_info: UserInfo,
}

/// The case snapshot handed to the doctor dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorData {
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default, rename = "imageURL")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub symptoms: String,
    #[serde(default)]
    pub diagnosis: Option<DiagnosisResult>,
}

//=========================================================================================
// Physician Hand-off
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhysicianButtonState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhysicianRequestStatus {
    Pending,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicianRequest {
    pub status: PhysicianRequestStatus,
    pub timestamp: DateTime<Utc>,
}

//=========================================================================================
// View State
//=========================================================================================

/// Everything one patient or doctor session renders from.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub user: Option<UserProfile>,
    pub image: Option<ImageHandle>,
    pub image_url: Option<String>,
    pub symptoms: String,
    pub diagnosis: Option<DiagnosisResult>,
    pub chat_history: Vec<ChatMessage>,
    pub doctor_data: Option<DoctorData>,
    pub screen_width: u32,
    pub active_session: Option<String>,
    pub shared_chat: Vec<SharedChatEntry>,
    pub physician_request: Option<PhysicianRequest>,
    pub physician_button_state: PhysicianButtonState,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            user: None,
            image: None,
            image_url: None,
            symptoms: String::new(),
            diagnosis: None,
            chat_history: Vec::new(),
            doctor_data: None,
            screen_width: DEFAULT_SCREEN_WIDTH,
            active_session: None,
            shared_chat: Vec::new(),
            physician_request: None,
            physician_button_state: PhysicianButtonState::Disconnected,
        }
    }
}

impl ViewState {
    /// Initial state of a freshly opened session, seeded with whatever shared
    /// chat is already persisted.
    pub fn with_shared_chat(shared_chat: Vec<SharedChatEntry>) -> Self {
        Self {
            shared_chat,
            ..Default::default()
        }
    }

    pub fn message(&self, id: MessageId) -> Option<&ChatMessage> {
        self.chat_history.iter().find(|m| m.id == id)
    }

    /// The case snapshot a doctor receives on hand-off.
    pub fn doctor_snapshot(&self) -> DoctorData {
        DoctorData {
            user: self.user.clone(),
            chat_history: self.chat_history.clone(),
            image_url: self.image_url.clone(),
            symptoms: self.symptoms.clone(),
            diagnosis: self.diagnosis.clone(),
        }
    }
}
