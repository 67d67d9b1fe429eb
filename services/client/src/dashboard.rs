//! services/client/src/dashboard.rs
//!
//! The doctor dashboard: the consultation view of a handed-off patient case.
//! It reads the case snapshot the patient session persisted, follows the shared
//! chat, and writes doctor replies back to it for the patient tabs.

use crate::config::SessionTimings;
use crate::store::Store;
use chrono::{DateTime, Utc};
use dermassist_core::domain::{DoctorData, MessageId, SenderType, SharedMessage};
use dermassist_core::persisted::{load_doctor_data, load_shared_chat};
use dermassist_core::ports::{keys, PortResult};
use dermassist_core::{Action, MessageIdGenerator};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const CASE_INTRO_TEXT: &str =
    "Patient has requested to speak with a doctor. Here's their case information:";

const UNKNOWN_PATIENT: &str = "Unknown Patient";
const NOT_PROVIDED: &str = "Not provided";
const NOT_AVAILABLE: &str = "Not available";

//=========================================================================================
// Consultation Transcript
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsultSender {
    Patient,
    Ai,
    System,
    Doctor,
}

impl ConsultSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultSender::Patient => "patient",
            ConsultSender::Ai => "ai",
            ConsultSender::System => "system",
            ConsultSender::Doctor => "doctor",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsultMessage {
    /// Only entries that came through the shared chat carry an id.
    pub id: Option<MessageId>,
    pub sender: ConsultSender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConsultMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            id: None,
            sender: ConsultSender::System,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The sidebar facts about the patient, with placeholders filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientSummary {
    pub name: String,
    pub age: String,
    pub symptoms: String,
    pub diagnosis: String,
}

impl PatientSummary {
    pub fn from_case(case: &DoctorData) -> Self {
        let user = case.user.as_ref();
        Self {
            name: user
                .map(|u| u.username.clone())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNKNOWN_PATIENT.to_string()),
            age: user
                .and_then(|u| u.age)
                .filter(|age| *age > 0)
                .map(|age| age.to_string())
                .unwrap_or_else(|| NOT_PROVIDED.to_string()),
            symptoms: Some(case.symptoms.clone())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| NOT_PROVIDED.to_string()),
            diagnosis: case
                .diagnosis
                .as_ref()
                .map(|d| d.predicted_disease.clone())
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        }
    }
}

/// The summary posted by "Analyze Case".
pub fn case_analysis(case: &DoctorData) -> String {
    let (condition, confidence) = match &case.diagnosis {
        Some(d) if !d.predicted_disease.is_empty() => (d.predicted_disease.as_str(), d.confidence_score),
        Some(d) => ("Unknown", d.confidence_score),
        None => ("Unknown", 0),
    };
    format!(
        "Analysis complete based on patient data:\n\
         - Primary condition: {}\n\
         - Confidence: {}%\n\
         - Symptoms: {}\n\
         \n\
         Recommended next steps: Review patient history and provide treatment plan",
        condition, confidence, case.symptoms
    )
}

//=========================================================================================
// DoctorConsole
//=========================================================================================

#[derive(Clone)]
pub struct DoctorConsole {
    store: Store,
    ids: Arc<MessageIdGenerator>,
    case: Arc<DoctorData>,
    transcript: Arc<Mutex<Vec<ConsultMessage>>>,
    analysis_delay: Duration,
    analyzing: Arc<AtomicBool>,
    token: CancellationToken,
}

impl DoctorConsole {
    /// Opens the case handed off by a patient session. Returns `None` when no
    /// patient has requested a doctor yet.
    pub async fn load(store: Store, timings: &SessionTimings) -> Option<Self> {
        let storage = store.storage();
        let case = match load_doctor_data(storage.as_ref()).await {
            Some(case) => case,
            None => store.state().doctor_data.clone()?,
        };
        info!(
            "Loaded patient case ({} chat messages)",
            case.chat_history.len()
        );

        let mut transcript: Vec<ConsultMessage> = case
            .chat_history
            .iter()
            .map(|m| ConsultMessage {
                id: None,
                sender: if m.is_bot {
                    ConsultSender::Ai
                } else {
                    ConsultSender::Patient
                },
                content: m.text.clone(),
                timestamp: m.timestamp,
            })
            .collect();
        transcript.push(ConsultMessage::system(CASE_INTRO_TEXT));

        let console = Self {
            store,
            ids: Arc::new(MessageIdGenerator::new()),
            case: Arc::new(case),
            transcript: Arc::new(Mutex::new(transcript)),
            analysis_delay: timings.case_analysis_delay,
            analyzing: Arc::new(AtomicBool::new(false)),
            token: CancellationToken::new(),
        };
        console.sync_shared().await;
        Some(console)
    }

    pub fn case(&self) -> &DoctorData {
        &self.case
    }

    pub fn summary(&self) -> PatientSummary {
        PatientSummary::from_case(&self.case)
    }

    pub async fn transcript(&self) -> Vec<ConsultMessage> {
        self.transcript.lock().await.clone()
    }

    pub fn is_analyzing(&self) -> bool {
        self.analyzing.load(Ordering::Acquire)
    }

    /// Appends every shared-chat entry the consultation does not show yet.
    /// Returns how many were added.
    pub async fn sync_shared(&self) -> usize {
        let persisted = load_shared_chat(self.store.storage().as_ref()).await;
        let mut transcript = self.transcript.lock().await;
        let mut seen: HashSet<MessageId> = transcript.iter().filter_map(|m| m.id).collect();

        let before = transcript.len();
        for entry in persisted {
            if !seen.insert(entry.id) {
                continue;
            }
            transcript.push(ConsultMessage {
                id: Some(entry.id),
                sender: match entry.sender_type {
                    SenderType::Doctor => ConsultSender::Doctor,
                    SenderType::Patient => ConsultSender::Patient,
                },
                content: entry.text,
                timestamp: entry.timestamp,
            });
        }
        transcript.len() - before
    }

    /// Keeps syncing the shared chat whenever another session changes it.
    pub async fn follow(&self) -> PortResult<JoinHandle<()>> {
        let mut events = self.store.storage().watch().await?;
        self.sync_shared().await;

        let console = self.clone();
        let token = self.token.child_token();
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.next() => match event {
                        Some(event) if event.touches(keys::SHARED_CHAT) => {
                            let added = console.sync_shared().await;
                            debug!("Consultation picked up {} shared messages", added);
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
        }))
    }

    /// Sends a reply to the patient. Blank text is ignored.
    pub async fn send_message(&self, text: &str) -> Option<MessageId> {
        if text.trim().is_empty() {
            return None;
        }

        let id = self.ids.next_id();
        let timestamp = Utc::now();
        self.transcript.lock().await.push(ConsultMessage {
            id: Some(id),
            sender: ConsultSender::Doctor,
            content: text.to_string(),
            timestamp,
        });

        // Pick up what other tabs appended before adding ours on top.
        let persisted = load_shared_chat(self.store.storage().as_ref()).await;
        self.store.dispatch(Action::SyncSharedChat(persisted)).await;
        self.store
            .dispatch(Action::AddSharedMessage(SharedMessage {
                id,
                text: text.to_string(),
                timestamp,
                sender: Some(SenderType::Doctor.as_str().to_string()),
            }))
            .await;

        info!("Doctor reply {} shared with the patient", id);
        Some(id)
    }

    /// Posts the case analysis after the simulated analysis time. Returns
    /// `None` while a previous analysis is still running.
    pub fn analyze_case(&self) -> Option<JoinHandle<()>> {
        if self
            .analyzing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let console = self.clone();
        let token = self.token.child_token();
        Some(tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(console.analysis_delay) => {
                    let analysis = case_analysis(&console.case);
                    console
                        .transcript
                        .lock()
                        .await
                        .push(ConsultMessage::system(analysis));
                }
            }
            console.analyzing.store(false, Ordering::Release);
        }))
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }
}
