//! crates/dermassist_core/src/sync.rs
//!
//! Merging the persisted shared chat into a patient transcript.

use crate::domain::{ChatMessage, SenderType, SharedChatEntry};
use std::collections::HashSet;

/// Returns the doctor-authored entries of `persisted` that `transcript` does not
/// contain yet, in persisted order, as patient-facing doctor messages.
///
/// Only doctor messages of the transcript count as already shown, so a patient
/// or assistant message that happens to share an id does not hide a reply.
///
/// Running the merge again after appending its output yields nothing.
pub fn merge_doctor_messages(
    persisted: &[SharedChatEntry],
    transcript: &[ChatMessage],
) -> Vec<ChatMessage> {
    let mut seen: HashSet<_> = transcript
        .iter()
        .filter(|m| m.is_doctor)
        .map(|m| m.id)
        .collect();

    persisted
        .iter()
        .filter(|entry| entry.sender_type == SenderType::Doctor)
        .filter(|entry| seen.insert(entry.id))
        .map(SharedChatEntry::to_doctor_message)
        .collect()
}
