//! services/client/src/adapters/http.rs
//!
//! This module contains the adapter for the remote medical-assistant endpoint.
//! It implements the `DiagnosisService` port from the `core` crate on top of `reqwest`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use dermassist_core::ports::{DiagnosisService, PortError, PortResult, ProgressSink};
use dermassist_core::protocol::{ChatReply, ChatRequest, DiagnosisReply, DiagnosisRequest, ErrorBody};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Size of the slices the image is streamed in; progress is reported per slice.
const UPLOAD_CHUNK: usize = 16 * 1024;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `DiagnosisService` port over HTTP.
#[derive(Clone)]
pub struct HttpDiagnosisAdapter {
    client: Client,
    endpoint: String,
    csrf_token: Option<String>,
}

impl HttpDiagnosisAdapter {
    /// Creates a new `HttpDiagnosisAdapter` posting to `endpoint`.
    pub fn new(
        endpoint: impl Into<String>,
        csrf_token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: endpoint.into(),
            csrf_token,
        })
    }

    fn post(&self) -> RequestBuilder {
        let request = self.client.post(&self.endpoint);
        match &self.csrf_token {
            Some(token) => request.header("X-CSRFToken", token),
            None => request,
        }
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

/// Splits `data` into slices, reporting how much has been handed to the
/// connection as each slice is pulled.
fn progress_stream(
    data: Bytes,
    progress: ProgressSink,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let total = data.len();
    let sent = Arc::new(AtomicUsize::new(0));

    let chunks: Vec<Bytes> = (0..total)
        .step_by(UPLOAD_CHUNK)
        .map(|start| data.slice(start..(start + UPLOAD_CHUNK).min(total)))
        .collect();

    if chunks.is_empty() {
        progress(100);
    }

    futures::stream::iter(chunks.into_iter().map(move |chunk| {
        let done = sent.fetch_add(chunk.len(), Ordering::Relaxed) + chunk.len();
        progress(percent(done, total));
        Ok::<Bytes, std::io::Error>(chunk)
    }))
}

/// Decodes a success body, or turns an error status into `PortError::Rejected`
/// carrying the server's `message` when it sent one.
async fn read_json<T: DeserializeOwned>(response: Response) -> PortResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.is_empty());
        warn!("Assistant endpoint answered {}", status);
        return Err(PortError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| PortError::Decode(e.to_string()))
}

fn transport_error(e: reqwest::Error) -> PortError {
    PortError::Transport(e.to_string())
}

//=========================================================================================
// `DiagnosisService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DiagnosisService for HttpDiagnosisAdapter {
    async fn diagnose(
        &self,
        request: DiagnosisRequest,
        progress: ProgressSink,
    ) -> PortResult<DiagnosisReply> {
        let length = request.image.len() as u64;
        let body = Body::wrap_stream(progress_stream(request.image.data.clone(), progress));
        let image = Part::stream_with_length(body, length)
            .file_name(request.image.file_name.clone())
            .mime_str(&request.image.content_type)
            .map_err(|e| PortError::Unexpected(format!("Invalid image content type: {}", e)))?;

        let mut form = Form::new()
            .part("image", image)
            .text("message", request.symptoms)
            .text("user_name", request.user_name)
            .text("age", request.age.map(|a| a.to_string()).unwrap_or_default());
        if let Some(session_id) = request.session_id {
            form = form.text("session_id", session_id);
        }

        debug!("Submitting diagnosis ({} image bytes)", length);
        let response = self
            .post()
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        read_json(response).await
    }

    async fn chat(&self, request: ChatRequest) -> PortResult<ChatReply> {
        debug!("Sending chat turn for session {}", request.session_id);
        let response = self
            .post()
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        read_json(response).await
    }
}
