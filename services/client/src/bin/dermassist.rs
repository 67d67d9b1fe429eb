//! services/client/src/bin/dermassist.rs
//!
//! Terminal front end. `dermassist patient` opens the patient view (intake form
//! and chat); `dermassist doctor` opens the doctor dashboard on the case a
//! patient handed off. Both share state through the configured storage.

use client_lib::{
    adapters::{HttpDiagnosisAdapter, MemoryOrigin, SqliteStorage},
    config::{Config, StorageLocation},
    dashboard::DoctorConsole,
    error::AppError,
    render,
    session::{PatientSession, UserDetails},
    store::Store,
};
use dermassist_core::domain::{ImageHandle, MessageId};
use dermassist_core::ports::KeyValueStorage;
use dermassist_core::presentation::{quick_action_prompt, Layout};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PATIENT_HELP: &str = "\
Commands:
  /image <path>            select a skin image
  /symptoms <text>         describe the symptoms
  /diagnose <name> [age]   submit the case for diagnosis
  /action <name>           ask a suggested quick action
  /doctor                  talk to a physician
  /quit                    leave
Anything else is sent to the assistant.";

const DOCTOR_HELP: &str = "\
Commands:
  /analyze   analyze the case
  /summary   show the patient information
  /quit      leave
Anything else is sent to the patient.";

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    info!("Configuration loaded ({:?} mode)", config.mode);

    // --- 2. Open Origin Storage ---
    let storage: Arc<dyn KeyValueStorage> = match &config.storage {
        StorageLocation::Memory => Arc::new(MemoryOrigin::new().open_tab()),
        StorageLocation::File(path) => {
            Arc::new(SqliteStorage::open(path, config.storage_poll_interval).await?)
        }
    };

    // --- 3. Run the Requested View ---
    match std::env::args().nth(1).as_deref() {
        None | Some("patient") => run_patient(&config, storage).await,
        Some("doctor") => run_doctor(&config, storage).await,
        Some(other) => Err(AppError::Internal(format!(
            "Unknown view '{}': use 'patient' or 'doctor'",
            other
        ))),
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

//=========================================================================================
// Patient View
//=========================================================================================

async fn run_patient(config: &Config, storage: Arc<dyn KeyValueStorage>) -> Result<(), AppError> {
    let service = Arc::new(HttpDiagnosisAdapter::new(
        config.api_base_url.clone(),
        config.csrf_token.clone(),
        config.request_timeout,
    )?);
    let session = PatientSession::open(storage, service, config.timings).await;
    session.start().await?;
    session.resize(config.screen_width).await;
    info!(
        "{:?} layout, content spans {} of {} columns",
        Layout::for_width(config.screen_width),
        Layout::content_width(config.screen_width),
        config.screen_width
    );
    if Layout::for_width(config.screen_width).shows_side_panel() {
        println!("Dermatology Assistant: upload a photo and describe your symptoms.");
    }
    println!("{}", PATIENT_HELP);

    let printer = tokio::spawn(print_transcript(session.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match command {
            "/quit" => break,
            "/help" => println!("{}", PATIENT_HELP),
            "/image" => {
                let path = Path::new(rest);
                match tokio::fs::read(path).await {
                    Ok(data) => {
                        let name = path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| "image".to_string());
                        let url = session
                            .select_image(ImageHandle::new(name, content_type_for(path), data))
                            .await;
                        println!("Image selected ({})", url);
                    }
                    Err(e) => println!("Could not read {}: {}", rest, e),
                }
            }
            "/symptoms" => session.set_symptoms(rest).await,
            "/diagnose" => {
                let mut parts = rest.split_whitespace();
                let details = UserDetails {
                    user_name: parts.next().unwrap_or_default().to_string(),
                    age: parts.next().and_then(|a| a.parse().ok()),
                };

                let mut progress = session.upload_progress();
                let reporter = tokio::spawn(async move {
                    while progress.changed().await.is_ok() {
                        let percent = *progress.borrow_and_update();
                        if percent > 0 {
                            println!("Uploading... {}%", percent);
                        }
                    }
                });
                match session.submit_diagnosis(details).await {
                    Ok(submission) => submission.reveal.finished().await,
                    Err(e) => println!("{}", e),
                }
                reporter.abort();
            }
            "/action" => send_chat(&session, &quick_action_prompt(rest)).await,
            "/doctor" => match session.request_physician().await {
                Some(handoff) => handoff.connected().await,
                None => println!("A physician has already been requested."),
            },
            _ if line.is_empty() => {}
            _ => send_chat(&session, line).await,
        }
    }

    session.shutdown();
    printer.abort();
    Ok(())
}

async fn send_chat(session: &PatientSession, text: &str) {
    match session.send_chat(text).await {
        Ok(reveal) => reveal.finished().await,
        Err(e) => println!("{}", e),
    }
}

/// Prints each message once it has settled, and again if its text changes.
async fn print_transcript(
    mut states: tokio::sync::watch::Receiver<Arc<dermassist_core::ViewState>>,
) {
    let mut printed: HashMap<MessageId, String> = HashMap::new();
    loop {
        {
            let state = states.borrow_and_update().clone();
            for message in state.chat_history.iter().filter(|m| !m.is_typing) {
                if printed.get(&message.id) != Some(&message.text) {
                    println!("{}", render::chat_line(message));
                    printed.insert(message.id, message.text.clone());
                }
            }
        }
        if states.changed().await.is_err() {
            break;
        }
    }
}

//=========================================================================================
// Doctor View
//=========================================================================================

async fn run_doctor(config: &Config, storage: Arc<dyn KeyValueStorage>) -> Result<(), AppError> {
    let store = Store::open(storage).await;
    let Some(console) = DoctorConsole::load(store, &config.timings).await else {
        println!("No Active Patient Case");
        println!("Please wait for a patient to request a consultation.");
        return Ok(());
    };

    println!("{}", render::summary_block(&console.summary()));
    println!("{}", DOCTOR_HELP);
    let follower = console.follow().await?;

    let mut shown = 0;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(config.storage_poll_interval);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                match line {
                    "/quit" => break,
                    "/help" => println!("{}", DOCTOR_HELP),
                    "/summary" => println!("{}", render::summary_block(&console.summary())),
                    "/analyze" => {
                        if console.analyze_case().is_some() {
                            println!("Analyzing...");
                        }
                    }
                    "" => {}
                    text => {
                        if console.send_message(text).await.is_none() {
                            warn!("Ignored an empty reply");
                        }
                    }
                }
            }
            _ = ticker.tick() => {}
        }

        let transcript = console.transcript().await;
        for message in transcript.iter().skip(shown) {
            println!("{}", render::consult_line(message));
        }
        shown = transcript.len();
    }

    console.shutdown();
    follower.abort();
    Ok(())
}
