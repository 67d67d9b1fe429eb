//! services/client/src/session/typing.rs
//!
//! Reveals assistant messages one character at a time, the way the chat window
//! "types" them.

use crate::store::Store;
use dermassist_core::domain::{ChatMessage, DiagnosisResult, MessageId, MessagePatch, MessageType};
use dermassist_core::{Action, MessageIdGenerator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A message to reveal, with the metadata its placeholder carries from the
/// start.
#[derive(Debug, Clone, PartialEq)]
pub struct RevealRequest {
    pub text: String,
    pub suggested_actions: Vec<String>,
    pub kind: MessageType,
    pub confidence: Option<i64>,
    pub condition: Option<String>,
}

impl RevealRequest {
    pub fn new(text: impl Into<String>, kind: MessageType) -> Self {
        Self {
            text: text.into(),
            suggested_actions: Vec::new(),
            kind,
            confidence: None,
            condition: None,
        }
    }

    pub fn with_actions(mut self, actions: Vec<String>) -> Self {
        self.suggested_actions = actions;
        self
    }

    /// The chat message that presents a diagnosis result.
    pub fn diagnosis(result: &DiagnosisResult) -> Self {
        Self {
            text: result.chatbot_response.clone(),
            suggested_actions: result.suggested_actions.clone(),
            kind: MessageType::Diagnosis,
            confidence: Some(result.confidence_score),
            condition: Some(result.predicted_disease.clone()),
        }
    }

    fn placeholder(&self, id: MessageId) -> ChatMessage {
        let mut message = ChatMessage::bot(id, "", self.kind)
            .with_actions(self.suggested_actions.clone())
            .typing();
        message.confidence = self.confidence;
        message.condition = self.condition.clone();
        message
    }
}

/// A reveal in progress.
pub struct TypingHandle {
    pub message_id: MessageId,
    task: JoinHandle<()>,
}

impl TypingHandle {
    /// Resolves once the message is fully revealed, or once the reveal was
    /// cancelled with its session.
    pub async fn finished(self) {
        // A panicking reveal has nothing left to report.
        let _ = self.task.await;
    }
}

/// Decrements the active-reveal counter however the reveal task ends.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Clone)]
pub struct TypingRenderer {
    store: Store,
    ids: Arc<MessageIdGenerator>,
    interval: Duration,
    token: CancellationToken,
    active: Arc<AtomicUsize>,
}

impl TypingRenderer {
    pub fn new(
        store: Store,
        ids: Arc<MessageIdGenerator>,
        interval: Duration,
        token: CancellationToken,
    ) -> Self {
        Self {
            store,
            ids,
            // tokio intervals cannot tick with a zero period.
            interval: interval.max(Duration::from_millis(1)),
            token,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of reveals that have not finished yet.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_typing(&self) -> bool {
        self.active() > 0
    }

    /// Adds an empty typing placeholder right away, then fills it in one
    /// character per interval and finally clears its typing flag: N + 1
    /// updates for an N-character text.
    pub async fn reveal(&self, request: RevealRequest) -> TypingHandle {
        let id = self.ids.next_id();
        self.active.fetch_add(1, Ordering::AcqRel);
        let guard = ActiveGuard(self.active.clone());

        self.store
            .dispatch(Action::AddMessage(request.placeholder(id)))
            .await;

        let store = self.store.clone();
        let token = self.token.child_token();
        let period = self.interval;
        let text = request.text;

        let task = tokio::spawn(async move {
            let _guard = guard;
            let mut ticker = interval_at(Instant::now() + period, period);

            let prefix_ends = text.char_indices().map(|(at, c)| at + c.len_utf8());
            for end in prefix_ends {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Reveal of message {} cancelled", id);
                        return;
                    }
                    _ = ticker.tick() => {}
                }
                store
                    .dispatch(Action::UpdateMessageText {
                        id,
                        text: text[..end].to_string(),
                    })
                    .await;
            }

            tokio::select! {
                _ = token.cancelled() => return,
                _ = ticker.tick() => {}
            }
            store
                .dispatch(Action::UpdateMessage {
                    id,
                    updates: MessagePatch::typing_done(),
                })
                .await;
        });

        TypingHandle {
            message_id: id,
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryOrigin;

    async fn renderer(token: CancellationToken) -> TypingRenderer {
        let store = Store::open(Arc::new(MemoryOrigin::new().open_tab())).await;
        TypingRenderer::new(
            store,
            Arc::new(MessageIdGenerator::new()),
            Duration::from_millis(1),
            token,
        )
    }

    #[tokio::test]
    async fn reveals_text_with_n_plus_one_updates() {
        let typing = renderer(CancellationToken::new()).await;
        let mut log = typing.store.observe();

        let handle = typing
            .reveal(RevealRequest::new("Hi é!", MessageType::Text))
            .await;
        assert!(typing.is_typing());
        handle.finished().await;
        assert!(!typing.is_typing());

        let mut updates = Vec::new();
        while let Ok(record) = log.try_recv() {
            updates.push(record.action);
        }
        assert_eq!(updates.first(), Some(&"ADD_MESSAGE"));
        let text_updates = updates.iter().filter(|a| **a == "UPDATE_MESSAGE_TEXT").count();
        assert_eq!(text_updates, 5);
        assert_eq!(updates.last(), Some(&"UPDATE_MESSAGE"));
        assert_eq!(updates.len(), 1 + 5 + 1);

        let state = typing.store.state();
        let message = &state.chat_history[0];
        assert_eq!(message.text, "Hi é!");
        assert!(!message.is_typing);
        assert!(message.is_bot);
    }

    #[tokio::test]
    async fn diagnosis_placeholder_carries_metadata() {
        let typing = renderer(CancellationToken::new()).await;
        let result = DiagnosisResult {
            predicted_disease: "Eczema".into(),
            confidence_score: 87,
            chatbot_response: "Looks like eczema.".into(),
            suggested_actions: vec!["learn_more".into()],
            user_info: Default::default(),
        };

        let handle = typing.reveal(RevealRequest::diagnosis(&result)).await;
        let placeholder = typing.store.state().message(handle.message_id).cloned().unwrap();
        assert_eq!(placeholder.text, "");
        assert!(placeholder.is_typing);
        assert_eq!(placeholder.kind, MessageType::Diagnosis);
        assert_eq!(placeholder.confidence, Some(87));
        assert_eq!(placeholder.condition.as_deref(), Some("Eczema"));

        handle.finished().await;
    }

    #[tokio::test]
    async fn empty_text_only_clears_typing_flag() {
        let typing = renderer(CancellationToken::new()).await;
        let handle = typing.reveal(RevealRequest::new("", MessageType::Text)).await;
        let id = handle.message_id;
        handle.finished().await;

        let state = typing.store.state();
        assert!(!state.message(id).unwrap().is_typing);
    }

    #[tokio::test]
    async fn cancelling_the_session_stops_reveals() {
        let token = CancellationToken::new();
        let store = Store::open(Arc::new(MemoryOrigin::new().open_tab())).await;
        let typing = TypingRenderer::new(
            store,
            Arc::new(MessageIdGenerator::new()),
            Duration::from_secs(60),
            token.clone(),
        );

        let handle = typing
            .reveal(RevealRequest::new("a long answer", MessageType::Text))
            .await;
        token.cancel();
        let id = handle.message_id;
        tokio::time::timeout(Duration::from_secs(1), handle.finished())
            .await
            .unwrap();

        assert_eq!(typing.active(), 0);
        assert_eq!(typing.store.state().message(id).unwrap().text, "");
    }
}
