//! services/client/src/session/intake.rs
//!
//! The diagnosis intake form: validates the case, uploads it with progress,
//! records the normalized result and reveals it in the chat.

use super::{FlagGuard, PatientSession, RevealRequest, TypingHandle};
use crate::error::IntakeError;
use dermassist_core::domain::{DiagnosisResult, UserInfo, UserProfile};
use dermassist_core::ports::ProgressSink;
use dermassist_core::protocol::DiagnosisRequest;
use dermassist_core::Action;
use std::sync::Arc;
use tracing::{error, info};

pub const DIAGNOSIS_FAILED_TEXT: &str = "Failed to get diagnosis. Please try again.";

/// Who the patient says they are on the intake form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDetails {
    pub user_name: String,
    pub age: Option<u32>,
}

/// The outcome of a successful submission. `reveal` finishes once the
/// diagnosis message is fully typed out.
pub struct DiagnosisSubmission {
    pub result: DiagnosisResult,
    pub reveal: TypingHandle,
}

/// Resets the published upload progress when the request ends.
struct ProgressReset<'a>(&'a tokio::sync::watch::Sender<u8>);

impl Drop for ProgressReset<'_> {
    fn drop(&mut self) {
        self.0.send_replace(0);
    }
}

impl PatientSession {
    /// Sends the selected image and symptoms for diagnosis.
    ///
    /// Nothing is sent unless both an image and a non-blank description are
    /// present. A failed request leaves the state untouched and is not retried.
    pub async fn submit_diagnosis(
        &self,
        details: UserDetails,
    ) -> Result<DiagnosisSubmission, IntakeError> {
        if self.is_closed() {
            return Err(IntakeError::Closed);
        }

        let state = self.store.state();
        let image = match &state.image {
            Some(image) if !state.symptoms.trim().is_empty() => image.clone(),
            _ => return Err(IntakeError::MissingInput),
        };

        let _busy = FlagGuard::acquire(&self.diagnosing).ok_or(IntakeError::Busy)?;
        let _progress_reset = ProgressReset(self.upload_progress.as_ref());

        let progress: ProgressSink = {
            let tx = self.upload_progress.clone();
            Arc::new(move |percent| {
                tx.send_replace(percent.min(100));
            })
        };

        let request = DiagnosisRequest {
            image,
            symptoms: state.symptoms.clone(),
            user_name: details.user_name.clone(),
            age: details.age,
            session_id: state.active_session.clone(),
        };

        info!("Submitting case for diagnosis");
        let reply = tokio::select! {
            _ = self.token.cancelled() => return Err(IntakeError::Closed),
            reply = self.service.diagnose(request, progress) => reply,
        };

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                error!("Diagnosis request failed: {}", e);
                let message = e
                    .server_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| DIAGNOSIS_FAILED_TEXT.to_string());
                return Err(IntakeError::Transport(message));
            }
        };

        let result = reply.normalize(UserInfo {
            user_name: details.user_name.clone(),
            age: details.age,
        });
        info!(
            "Diagnosis received: {} ({}%)",
            result.predicted_disease, result.confidence_score
        );

        self.store
            .dispatch(Action::SetDiagnosis(result.clone()))
            .await;
        self.store
            .dispatch(Action::SetUser(UserProfile {
                username: details.user_name,
                age: details.age,
            }))
            .await;

        let reveal = self.typing.reveal(RevealRequest::diagnosis(&result)).await;
        Ok(DiagnosisSubmission { result, reveal })
    }
}
