//! crates/dermassist_core/src/ports.rs
//!
//! Defines the service contracts (traits) the client core depends on.
//! The storage port stands in for origin-scoped browser storage shared by every
//! open session; the diagnosis port stands in for the remote assistant service.

use crate::protocol::{ChatReply, ChatRequest, DiagnosisReply, DiagnosisRequest};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., storage, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Storage failure: {0}")]
    Storage(String),
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error("Service rejected the request with status {status}")]
    Rejected { status: u16, message: Option<String> },
    #[error("Could not decode the service response: {0}")]
    Decode(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// The message the server attached to a rejection, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            PortError::Rejected { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Port
//=========================================================================================

/// Well-known keys of the persisted origin storage.
pub mod keys {
    pub const SESSION_ID: &str = "session_id";
    pub const SHARED_CHAT: &str = "sharedChat";
    pub const DOCTOR_DATA: &str = "doctorData";
    pub const PHYSICIAN_CONNECTED: &str = "physicianConnected";
}

/// A change made to storage by some *other* session of the same origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// `None` when the whole storage area was cleared.
    pub key: Option<String>,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
}

impl StorageEvent {
    /// Whether this change can affect the value stored under `key`.
    pub fn touches(&self, key: &str) -> bool {
        self.key.as_deref().map_or(true, |k| k == key)
    }
}

pub type StorageEvents = Pin<Box<dyn Stream<Item = StorageEvent> + Send>>;

/// Origin-scoped string key-value storage.
///
/// Writes are atomic per key. Change notifications are delivered to every
/// handle of the origin except the one that made the change, and may coalesce
/// rapid successive writes.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> PortResult<Option<String>>;

    async fn set_item(&self, key: &str, value: &str) -> PortResult<()>;

    async fn remove_item(&self, key: &str) -> PortResult<()>;

    /// Subscribes to changes made by other handles from this point on. The
    /// stream ends when the storage backend goes away.
    async fn watch(&self) -> PortResult<StorageEvents>;
}

//=========================================================================================
// Diagnosis Service Port
//=========================================================================================

/// Receives upload progress as a percentage in 0..=100.
pub type ProgressSink = Arc<dyn Fn(u8) + Send + Sync>;

#[async_trait]
pub trait DiagnosisService: Send + Sync {
    /// Submits an image and symptom description for diagnosis.
    async fn diagnose(
        &self,
        request: DiagnosisRequest,
        progress: ProgressSink,
    ) -> PortResult<DiagnosisReply>;

    /// Submits one follow-up chat turn.
    async fn chat(&self, request: ChatRequest) -> PortResult<ChatReply>;
}
