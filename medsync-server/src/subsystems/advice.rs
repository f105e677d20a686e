//! Advice pipeline shared by HTTP and IPC.
//!
//! create ledger session → build prompt → inference (or fallback) → close
//! session → record activity → parse sections (symptom analysis only).

use medsync_core::activity::Activity;
use medsync_core::imaging::{self, ImageError, ImageUpload};
use medsync_core::{
    build_prompt, parse_sections, Feature, MedsyncError, ParsedSections, PromptInput, UserContext,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::state::AppState;

const LEDGER_EXCERPT_CHARS: usize = 100;

#[derive(Error, Debug)]
pub enum AdviceError {
    #[error("Input text is required for {0}")]
    EmptyInput(Feature),

    #[error("consultation turns go through /consultations/message")]
    ConsultationTurn,

    #[error("A {0} request is already in progress")]
    Busy(Feature),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Consultation(#[from] medsync_core::ConsultationError),

    #[error(transparent)]
    Store(#[from] MedsyncError),
}

#[derive(Debug, Clone, Serialize)]
pub struct AdviceOutcome {
    pub session_id: Uuid,
    pub feature: Feature,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sections: Option<ParsedSections>,
    pub fallback: bool,
}

fn excerpt(text: &str) -> String {
    text.chars().take(LEDGER_EXCERPT_CHARS).collect()
}

/// Text stored as the ledger entry's input.
pub fn ledger_input(feature: Feature, input: &PromptInput) -> String {
    let text = input.text.trim();
    match feature {
        Feature::Translation => format!(
            "Translate to {}: {}...",
            input
                .target_language
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .unwrap_or("English"),
            excerpt(text)
        ),
        Feature::HealthCoaching => format!("Health goals: {}", text),
        Feature::ReportSummary => input
            .context
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "{}".to_string()),
        _ => text.to_string(),
    }
}

fn session_metadata(feature: Feature, input: &PromptInput, error: Option<&str>) -> serde_json::Value {
    let mut metadata = serde_json::json!({ "feature": feature });
    if let Some(obj) = metadata.as_object_mut() {
        if feature == Feature::Translation {
            obj.insert("target_language".to_string(), serde_json::json!(input.target_language));
        }
        if let Some(annotations) = &input.annotations {
            obj.insert("annotations".to_string(), serde_json::json!(annotations));
        }
        if let Some(e) = error {
            obj.insert("error".to_string(), serde_json::json!(e));
        }
    }
    metadata
}

/// Run one advice feature for `user`.
///
/// Consultation turns are refused here; they need an active consultation and
/// go through [`crate::subsystems::consultation::message`].
pub async fn run_feature(
    state: &AppState,
    user: &UserContext,
    feature: Feature,
    input: PromptInput,
) -> Result<AdviceOutcome, AdviceError> {
    if feature == Feature::Consultation {
        return Err(AdviceError::ConsultationTurn);
    }
    if feature.requires_input() && input.text.trim().is_empty() {
        return Err(AdviceError::EmptyInput(feature));
    }

    let _guard = state
        .in_flight
        .try_acquire(user.id, feature)
        .ok_or(AdviceError::Busy(feature))?;

    let session_id = state
        .ledger
        .create_session(user.id, feature.agent_type(), &ledger_input(feature, &input))
        .await?;

    let prompt = build_prompt(feature, &input);
    let advice = state.advisor.advise(feature, &prompt).await;

    let metadata = session_metadata(feature, &input, advice.error.as_deref());
    state
        .ledger
        .update_session(session_id, &advice.text, metadata)
        .await?;

    if let Some((kind, description)) = feature.activity() {
        record_activity(state, user.id, kind, description).await;
    }

    let sections = if feature.has_sections() && !advice.is_fallback() {
        Some(parse_sections(&advice.text))
    } else {
        None
    };

    tracing::info!(
        user_id = %user.id,
        session_id = %session_id,
        feature = %feature,
        fallback = advice.is_fallback(),
        "Advice delivered"
    );

    Ok(AdviceOutcome {
        session_id,
        feature,
        fallback: advice.is_fallback(),
        text: advice.text,
        sections,
    })
}

pub async fn record_activity(
    state: &AppState,
    user_id: Uuid,
    kind: medsync_core::ActivityKind,
    description: &str,
) -> Activity {
    let slot = state.activity.slot(user_id).await;
    let mut feed = slot.lock().await;
    feed.record(kind, description).clone()
}

/// Validate an upload, annotate it and run image analysis over the annotations.
pub async fn analyze_image(
    state: &AppState,
    user: &UserContext,
    upload: ImageUpload,
    description: Option<String>,
) -> Result<(AdviceOutcome, Vec<imaging::ImageAnnotation>), AdviceError> {
    imaging::validate_upload(&upload)?;

    let annotations = imaging::annotate(&upload);
    let annotation_text = imaging::annotation_text(&annotations);
    let text = description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| imaging::describe(&upload.file_name, &annotation_text));

    let input = PromptInput {
        text,
        annotations: Some(annotation_text),
        ..Default::default()
    };
    let outcome = run_feature(state, user, Feature::ImageAnalysis, input).await?;
    Ok((outcome, annotations))
}
