//! crates/dermassist_core/src/persisted.rs
//!
//! Typed access to the JSON values kept in origin storage.
//! Reads never fail: absent, unreadable or malformed values come back as `None`.

use crate::domain::{DoctorData, SharedChatEntry};
use crate::ports::{keys, KeyValueStorage, PortResult};
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

/// Reads and decodes the JSON value under `key`.
pub async fn read_json<T: DeserializeOwned>(storage: &dyn KeyValueStorage, key: &str) -> Option<T> {
    let raw = match storage.get_item(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!("Failed to read '{}' from storage: {}", key, e);
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring malformed value under '{}': {}", key, e);
            None
        }
    }
}

/// Encodes `value` as JSON and stores it under `key`.
pub async fn write_json<T: Serialize + ?Sized>(
    storage: &dyn KeyValueStorage,
    key: &str,
    value: &T,
) -> PortResult<()> {
    let raw = serde_json::to_string(value)
        .map_err(|e| crate::ports::PortError::Unexpected(e.to_string()))?;
    storage.set_item(key, &raw).await
}

pub async fn load_shared_chat(storage: &dyn KeyValueStorage) -> Vec<SharedChatEntry> {
    read_json(storage, keys::SHARED_CHAT).await.unwrap_or_default()
}

pub async fn load_doctor_data(storage: &dyn KeyValueStorage) -> Option<DoctorData> {
    read_json(storage, keys::DOCTOR_DATA).await
}
