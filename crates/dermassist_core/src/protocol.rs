//! crates/dermassist_core/src/protocol.rs
//!
//! Defines the request and response shapes of the remote medical-assistant
//! endpoint, and the normalization of its loosely-typed diagnosis response.

use crate::domain::{DiagnosisResult, ImageHandle, UserInfo};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const UNKNOWN_DISEASE: &str = "Unknown";
pub const NO_DIAGNOSIS_TEXT: &str = "No diagnosis available";
pub const CHAT_FALLBACK_TEXT: &str = "Here's what I found:";

//=========================================================================================
// Requests
//=========================================================================================

/// Everything sent with a multipart diagnosis submission.
#[derive(Debug, Clone)]
pub struct DiagnosisRequest {
    pub image: ImageHandle,
    pub symptoms: String,
    pub user_name: String,
    pub age: Option<u32>,
    pub session_id: Option<String>,
}

/// The JSON body of one chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: String,
}

//=========================================================================================
// Responses
//=========================================================================================
// Every field is optional: the service omits or nulls fields freely, and the
// client substitutes placeholders instead of failing.
//=========================================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagnosisPayload {
    #[serde(default)]
    pub predicted_disease: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub chatbot_response: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagnosisReply {
    #[serde(default)]
    pub diagnosis: Option<DiagnosisPayload>,
    #[serde(default)]
    pub suggested_actions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatPayload {
    #[serde(default)]
    pub chatbot_response: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub chat_response: Option<ChatPayload>,
    #[serde(default)]
    pub suggested_actions: Option<Vec<String>>,
}

/// Error bodies carry a human-readable `message` the form shows verbatim.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// Accepts a JSON number or a numeric string. Anything else reads as missing.
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

impl DiagnosisReply {
    /// Turns the raw reply into a `DiagnosisResult`, substituting placeholders
    /// for anything missing and rounding the confidence into 0..=100.
    pub fn normalize(self, user_info: UserInfo) -> DiagnosisResult {
        let payload = self.diagnosis.unwrap_or_default();
        let confidence = payload
            .confidence_score
            .filter(|c| c.is_finite())
            .unwrap_or(0.0)
            .round()
            .clamp(0.0, 100.0) as i64;

        DiagnosisResult {
            predicted_disease: non_empty(payload.predicted_disease)
                .unwrap_or_else(|| UNKNOWN_DISEASE.to_string()),
            confidence_score: confidence,
            chatbot_response: non_empty(payload.chatbot_response)
                .unwrap_or_else(|| NO_DIAGNOSIS_TEXT.to_string()),
            suggested_actions: self.suggested_actions.unwrap_or_default(),
            user_info,
        }
    }
}

impl ChatReply {
    /// The assistant text to reveal, with the generic fallback when empty.
    pub fn reply_text(&self) -> String {
        self.chat_response
            .as_ref()
            .and_then(|c| non_empty(c.chatbot_response.clone()))
            .unwrap_or_else(|| CHAT_FALLBACK_TEXT.to_string())
    }

    pub fn actions(&self) -> Vec<String> {
        self.suggested_actions.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_diagnosis_gets_placeholders() {
        let reply: DiagnosisReply = serde_json::from_str(r#"{"diagnosis":{}}"#).unwrap();
        let result = reply.normalize(UserInfo::default());
        assert_eq!(result.confidence_score, 0);
        assert_eq!(result.predicted_disease, "Unknown");
        assert_eq!(result.chatbot_response, "No diagnosis available");
        assert!(result.suggested_actions.is_empty());
    }

    #[test]
    fn confidence_is_rounded() {
        let reply: DiagnosisReply = serde_json::from_str(
            r#"{"diagnosis":{"predicted_disease":"Eczema","confidence_score":87.4}}"#,
        )
        .unwrap();
        let result = reply.normalize(UserInfo {
            user_name: "Ada".into(),
            age: Some(34),
        });
        assert_eq!(result.confidence_score, 87);
        assert_eq!(result.predicted_disease, "Eczema");
        assert_eq!(result.user_info.user_name, "Ada");
    }

    #[test]
    fn nulls_and_out_of_range_values_are_tolerated() {
        let reply: DiagnosisReply = serde_json::from_str(
            r#"{"diagnosis":{"predicted_disease":null,"confidence_score":140.0,"chatbot_response":""},"suggested_actions":["learn_more"]}"#,
        )
        .unwrap();
        let result = reply.normalize(UserInfo::default());
        assert_eq!(result.confidence_score, 100);
        assert_eq!(result.predicted_disease, UNKNOWN_DISEASE);
        assert_eq!(result.chatbot_response, NO_DIAGNOSIS_TEXT);
        assert_eq!(result.suggested_actions, vec!["learn_more".to_string()]);
    }

    #[test]
    fn numeric_string_confidence_is_accepted() {
        let confidence = |raw: &str| {
            let body = format!(r#"{{"diagnosis":{{"confidence_score":{}}}}}"#, raw);
            serde_json::from_str::<DiagnosisReply>(&body)
                .unwrap()
                .normalize(UserInfo::default())
                .confidence_score
        };
        assert_eq!(confidence(r#""87.4""#), 87);
        assert_eq!(confidence(r#"" 92 ""#), 92);
        assert_eq!(confidence(r#""high""#), 0);
        assert_eq!(confidence("true"), 0);
        assert_eq!(confidence("null"), 0);
    }

    #[test]
    fn chat_reply_falls_back_when_text_missing() {
        let reply: ChatReply = serde_json::from_str(r#"{"chat_response":{}}"#).unwrap();
        assert_eq!(reply.reply_text(), CHAT_FALLBACK_TEXT);
        assert!(reply.actions().is_empty());

        let reply: ChatReply = serde_json::from_str(
            r#"{"chat_response":{"chatbot_response":"Keep the area dry."},"suggested_actions":["ask_specialist"]}"#,
        )
        .unwrap();
        assert_eq!(reply.reply_text(), "Keep the area dry.");
        assert_eq!(reply.actions(), vec!["ask_specialist".to_string()]);
    }
}
