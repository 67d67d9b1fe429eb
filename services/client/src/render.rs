//! services/client/src/render.rs
//!
//! Plain-text rendering of transcripts for the terminal front end.

use crate::dashboard::{ConsultMessage, PatientSummary};
use chrono::{DateTime, Local, Utc};
use dermassist_core::domain::{ChatMessage, MessageType};
use dermassist_core::presentation::action_label;

/// Hours and minutes in local time, as the chat bubbles show them.
pub fn format_time(timestamp: &DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%H:%M").to_string()
}

fn author(message: &ChatMessage) -> &'static str {
    if message.is_doctor {
        "Doctor"
    } else if message.is_bot {
        "Assistant"
    } else {
        "You"
    }
}

/// One patient-side chat message, with its diagnosis details and quick actions.
pub fn chat_line(message: &ChatMessage) -> String {
    let mut line = match message.kind {
        MessageType::TypingIndicator => {
            return format!("[{}] {} ...", format_time(&message.timestamp), author(message))
        }
        MessageType::System => format!("[{}] * {}", format_time(&message.timestamp), message.text),
        MessageType::Error => format!(
            "[{}] {} (error): {}",
            format_time(&message.timestamp),
            author(message),
            message.text
        ),
        _ => format!(
            "[{}] {}: {}",
            format_time(&message.timestamp),
            author(message),
            message.text
        ),
    };

    if message.kind == MessageType::Diagnosis {
        if let Some(condition) = &message.condition {
            line.push_str(&format!("\n        Condition: {}", condition));
        }
        if let Some(confidence) = message.confidence {
            line.push_str(&format!("\n        Confidence: {}%", confidence));
        }
    }
    if !message.suggested_actions.is_empty() && !message.is_typing {
        let labels: Vec<String> = message
            .suggested_actions
            .iter()
            .map(|a| format!("[{}]", action_label(a)))
            .collect();
        line.push_str(&format!("\n        {}", labels.join(" ")));
    }
    line
}

/// One line of the doctor's consultation view.
pub fn consult_line(message: &ConsultMessage) -> String {
    format!(
        "[{}] {}: {}",
        format_time(&message.timestamp),
        message.sender.as_str(),
        message.content
    )
}

pub fn summary_block(summary: &PatientSummary) -> String {
    format!(
        "Patient: {}\nAge: {}\nSymptoms: {}\nAI Diagnosis: {}",
        summary.name, summary.age, summary.symptoms, summary.diagnosis
    )
}
