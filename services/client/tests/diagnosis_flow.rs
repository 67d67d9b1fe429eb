//! services/client/tests/diagnosis_flow.rs
//!
//! Runs the HTTP adapter and a patient session against a mock medical-assistant
//! endpoint served by axum.

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use client_lib::{
    adapters::{HttpDiagnosisAdapter, MemoryOrigin},
    config::SessionTimings,
    error::IntakeError,
    session::{PatientSession, UserDetails},
};
use dermassist_core::domain::{ImageHandle, MessageType};
use dermassist_core::ports::{DiagnosisService, PortError, ProgressSink};
use dermassist_core::protocol::{ChatRequest, DiagnosisRequest};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ENDPOINT_PATH: &str = "/api/medical-assistant/";

#[derive(Debug, Clone, Default)]
struct Recorded {
    fields: HashMap<String, String>,
    csrf: Option<String>,
}

#[derive(Default)]
struct MockState {
    requests: Mutex<Vec<Recorded>>,
}

async fn assistant(State(state): State<Arc<MockState>>, request: Request) -> Response {
    let csrf = request
        .headers()
        .get("X-CSRFToken")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.starts_with("multipart/form-data"));

    let mut fields = HashMap::new();
    if is_multipart {
        let mut multipart = match Multipart::from_request(request, &()).await {
            Ok(multipart) => multipart,
            Err(rejection) => return rejection.into_response(),
        };
        while let Ok(Some(field)) = multipart.next_field().await {
            let name = field.name().unwrap_or_default().to_string();
            if name == "image" {
                fields.insert(
                    "image_name".to_string(),
                    field.file_name().unwrap_or_default().to_string(),
                );
                fields.insert(
                    "image_type".to_string(),
                    field.content_type().unwrap_or_default().to_string(),
                );
                let bytes = field.bytes().await.unwrap_or_default();
                fields.insert("image_len".to_string(), bytes.len().to_string());
            } else {
                fields.insert(name, field.text().await.unwrap_or_default());
            }
        }
    } else {
        let Json(body) = match Json::<Value>::from_request(request, &()).await {
            Ok(body) => body,
            Err(rejection) => return rejection.into_response(),
        };
        if let Some(object) = body.as_object() {
            for (key, value) in object {
                fields.insert(key.clone(), value.as_str().unwrap_or_default().to_string());
            }
        }
    }

    let message = fields.get("message").cloned().unwrap_or_default();
    state.requests.lock().unwrap().push(Recorded {
        fields,
        csrf,
    });

    match (is_multipart, message.as_str()) {
        (true, "blurry") => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Image too blurry, please retake the photo." })),
        )
            .into_response(),
        (true, "crash") => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        (true, _) => Json(json!({
            "diagnosis": {
                "predicted_disease": "Eczema",
                "confidence_score": 87.4,
                "chatbot_response": "This looks like eczema."
            },
            "suggested_actions": ["learn_more", "ask_specialist"]
        }))
        .into_response(),
        (false, "boom") => StatusCode::BAD_GATEWAY.into_response(),
        (false, _) => Json(json!({
            "chat_response": { "chatbot_response": "Use a fragrance-free moisturizer." },
            "suggested_actions": []
        }))
        .into_response(),
    }
}

async fn spawn_mock() -> (String, Arc<MockState>) {
    let state = Arc::new(MockState::default());
    let app = Router::new()
        .route(ENDPOINT_PATH, post(assistant))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}{}", addr, ENDPOINT_PATH), state)
}

fn timings() -> SessionTimings {
    SessionTimings {
        typing_interval: Duration::from_millis(1),
        physician_connect_delay: Duration::from_millis(5),
        case_analysis_delay: Duration::from_millis(5),
    }
}

fn photo() -> ImageHandle {
    ImageHandle::new("forearm.jpg", "image/jpeg", vec![0xAB; 40 * 1024])
}

async fn patient(endpoint: &str, csrf: Option<&str>) -> PatientSession {
    let service = Arc::new(
        HttpDiagnosisAdapter::new(endpoint, csrf.map(str::to_string), Some(Duration::from_secs(10)))
            .unwrap(),
    );
    let session = PatientSession::open(Arc::new(MemoryOrigin::new().open_tab()), service, timings()).await;
    session.start().await.unwrap();
    session
}

#[tokio::test]
async fn eczema_diagnosis_end_to_end() {
    let (endpoint, mock) = spawn_mock().await;
    let session = patient(&endpoint, Some("csrf-token-1")).await;

    session.select_image(photo()).await;
    session.set_symptoms("itchy red patches on my forearm").await;
    let submission = session
        .submit_diagnosis(UserDetails {
            user_name: "Ada".into(),
            age: Some(34),
        })
        .await
        .unwrap();

    assert_eq!(submission.result.predicted_disease, "Eczema");
    assert_eq!(submission.result.confidence_score, 87);
    let id = submission.reveal.message_id;
    submission.reveal.finished().await;

    let state = session.state();
    let message = state.message(id).unwrap();
    assert_eq!(message.kind, MessageType::Diagnosis);
    assert_eq!(message.condition.as_deref(), Some("Eczema"));
    assert_eq!(message.confidence, Some(87));
    assert_eq!(message.text, "This looks like eczema.");
    assert_eq!(
        message.suggested_actions,
        vec!["learn_more".to_string(), "ask_specialist".to_string()]
    );

    let requests = mock.requests.lock().unwrap();
    let sent = &requests[0];
    assert_eq!(sent.csrf.as_deref(), Some("csrf-token-1"));
    assert_eq!(sent.fields["message"], "itchy red patches on my forearm");
    assert_eq!(sent.fields["user_name"], "Ada");
    assert_eq!(sent.fields["age"], "34");
    assert_eq!(sent.fields["image_name"], "forearm.jpg");
    assert_eq!(sent.fields["image_type"], "image/jpeg");
    assert_eq!(sent.fields["image_len"], (40 * 1024).to_string());
    assert_eq!(
        sent.fields.get("session_id"),
        state.active_session.as_ref()
    );
}

#[tokio::test]
async fn server_error_message_is_surfaced() {
    let (endpoint, _mock) = spawn_mock().await;
    let session = patient(&endpoint, None).await;
    session.select_image(photo()).await;

    session.set_symptoms("blurry").await;
    let err = session.submit_diagnosis(UserDetails::default()).await.err();
    assert_eq!(
        err,
        Some(IntakeError::Transport(
            "Image too blurry, please retake the photo.".into()
        ))
    );

    session.set_symptoms("crash").await;
    let err = session.submit_diagnosis(UserDetails::default()).await.err();
    assert_eq!(
        err.map(|e| e.to_string()).as_deref(),
        Some("Failed to get diagnosis. Please try again.")
    );
    assert!(session.state().diagnosis.is_none());
}

#[tokio::test]
async fn upload_progress_reaches_completion() {
    let (endpoint, _mock) = spawn_mock().await;
    let adapter = HttpDiagnosisAdapter::new(endpoint, None, None).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink: ProgressSink = {
        let seen = seen.clone();
        Arc::new(move |percent| seen.lock().unwrap().push(percent))
    };

    let reply = adapter
        .diagnose(
            DiagnosisRequest {
                image: photo(),
                symptoms: "dry skin".into(),
                user_name: "Ada".into(),
                age: None,
                session_id: None,
            },
            sink,
        )
        .await
        .unwrap();
    assert!(reply.diagnosis.is_some());

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*seen.last().unwrap(), 100);
}

#[tokio::test]
async fn chat_turn_success_and_failure() {
    let (endpoint, mock) = spawn_mock().await;
    let session = patient(&endpoint, None).await;

    let reveal = session.send_chat("How do I treat it?").await.unwrap();
    let id = reveal.message_id;
    reveal.finished().await;
    assert_eq!(
        session.state().message(id).unwrap().text,
        "Use a fragrance-free moisturizer."
    );

    let reveal = session.send_chat("boom").await.unwrap();
    let id = reveal.message_id;
    reveal.finished().await;
    let state = session.state();
    let message = state.message(id).unwrap();
    assert_eq!(message.kind, MessageType::Error);
    assert_eq!(message.text, "Sorry, I encountered an error. Please try again.");

    let requests = mock.requests.lock().unwrap();
    assert_eq!(requests[0].fields["message"], "How do I treat it?");
    assert_eq!(
        requests[0].fields.get("session_id"),
        state.active_session.as_ref()
    );
    session.shutdown();
}

#[tokio::test]
async fn rejected_chat_maps_to_port_error() {
    let (endpoint, _mock) = spawn_mock().await;
    let adapter = HttpDiagnosisAdapter::new(endpoint, None, None).unwrap();

    let err = adapter
        .chat(ChatRequest {
            message: "boom".into(),
            session_id: "s-1".into(),
        })
        .await
        .err()
        .unwrap();
    assert!(matches!(err, PortError::Rejected { status: 502, message: None }));
}
