//! services/client/src/session/chat.rs
//!
//! Follow-up chat turns with the assistant.

use super::{FlagGuard, PatientSession, RevealRequest, TypingHandle};
use crate::error::ChatTurnError;
use dermassist_core::domain::{ChatMessage, MessageType};
use dermassist_core::protocol::ChatRequest;
use dermassist_core::Action;
use tracing::{debug, error};
use uuid::Uuid;

pub const THINKING_TEXT: &str = "thinking...";
pub const CHAT_FAILED_TEXT: &str = "Sorry, I encountered an error. Please try again.";

impl PatientSession {
    /// Sends one chat turn. The patient's message and a "thinking..."
    /// indicator appear right away; the indicator is replaced by the revealed
    /// reply, or by an error message when the request fails.
    pub async fn send_chat(&self, input: &str) -> Result<TypingHandle, ChatTurnError> {
        if self.is_closed() {
            return Err(ChatTurnError::Closed);
        }
        if input.trim().is_empty() {
            return Err(ChatTurnError::EmptyInput);
        }
        if self.typing.is_typing() {
            return Err(ChatTurnError::Busy);
        }
        let _in_flight = FlagGuard::acquire(&self.chat_in_flight).ok_or(ChatTurnError::Busy)?;

        self.store
            .dispatch(Action::AddMessage(ChatMessage::patient(
                self.ids.next_id(),
                input,
            )))
            .await;

        let thinking_id = self.ids.next_id();
        self.store
            .dispatch(Action::AddMessage(
                ChatMessage::bot(thinking_id, THINKING_TEXT, MessageType::TypingIndicator).typing(),
            ))
            .await;

        let session_id = self
            .store
            .state()
            .active_session
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let request = ChatRequest {
            message: input.to_string(),
            session_id,
        };

        debug!("Sending chat turn");
        let reply = tokio::select! {
            _ = self.token.cancelled() => return Err(ChatTurnError::Closed),
            reply = self.service.chat(request) => reply,
        };

        self.store.dispatch(Action::RemoveMessage(thinking_id)).await;

        let reveal = match reply {
            Ok(reply) => {
                RevealRequest::new(reply.reply_text(), MessageType::Text).with_actions(reply.actions())
            }
            Err(e) => {
                error!("Chat request failed: {}", e);
                RevealRequest::new(CHAT_FAILED_TEXT, MessageType::Error)
            }
        };
        Ok(self.typing.reveal(reveal).await)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{fast_timings, FakeService};
    use super::*;
    use crate::adapters::MemoryOrigin;
    use dermassist_core::ports::PortError;
    use dermassist_core::protocol::CHAT_FALLBACK_TEXT;
    use std::sync::Arc;

    async fn started(service: Arc<FakeService>) -> PatientSession {
        let session =
            PatientSession::open(Arc::new(MemoryOrigin::new().open_tab()), service, fast_timings())
                .await;
        session.start().await.unwrap();
        session
    }

    #[tokio::test]
    async fn reply_replaces_the_thinking_indicator() {
        let service = Arc::new(FakeService::answering("Keep the area moisturized."));
        let session = started(service.clone()).await;

        let reveal = session.send_chat("What should I do?").await.unwrap();
        let reply_id = reveal.message_id;
        reveal.finished().await;

        let state = session.state();
        // welcome, patient question, revealed reply
        assert_eq!(state.chat_history.len(), 3);
        let question = &state.chat_history[1];
        assert!(!question.is_bot);
        assert_eq!(question.sender.as_deref(), Some("patient"));
        assert!(state
            .chat_history
            .iter()
            .all(|m| m.kind != MessageType::TypingIndicator));
        assert_eq!(state.message(reply_id).unwrap().text, "Keep the area moisturized.");

        let sent = service.chats.lock().unwrap();
        assert_eq!(sent[0].message, "What should I do?");
        assert_eq!(Some(&sent[0].session_id), state.active_session.as_ref());
    }

    #[tokio::test]
    async fn missing_reply_text_uses_fallback() {
        let session = started(Arc::new(FakeService::default())).await;
        let reveal = session.send_chat("Is it contagious?").await.unwrap();
        let id = reveal.message_id;
        reveal.finished().await;
        assert_eq!(session.state().message(id).unwrap().text, CHAT_FALLBACK_TEXT);
    }

    #[tokio::test]
    async fn failure_reveals_an_error_message() {
        let service = Arc::new(FakeService::failing(PortError::Transport("timed out".into())));
        let session = started(service).await;

        let reveal = session.send_chat("Hello?").await.unwrap();
        let id = reveal.message_id;
        reveal.finished().await;

        let state = session.state();
        let message = state.message(id).unwrap();
        assert_eq!(message.kind, MessageType::Error);
        assert_eq!(message.text, CHAT_FAILED_TEXT);
        assert!(state.chat_history.iter().all(|m| m.text != THINKING_TEXT));
    }

    #[tokio::test]
    async fn blank_input_and_re_entry_are_rejected() {
        let session = started(Arc::new(FakeService::answering("A fairly long answer"))).await;
        assert_eq!(session.send_chat("   ").await.err(), Some(ChatTurnError::EmptyInput));

        let reveal = session.send_chat("first").await.unwrap();
        assert_eq!(session.send_chat("second").await.err(), Some(ChatTurnError::Busy));
        reveal.finished().await;
        assert!(session.send_chat("third").await.is_ok());
    }
}
