//! Live consultations: mode selection, AI doctor turns and wrap-up.

use chrono::Utc;
use medsync_core::consultation::{format_elapsed, ENDED_DESCRIPTION};
use medsync_core::{
    build_prompt, ActivityKind, ConsultationError, ConsultationMode, ConsultationState, Feature,
    PromptInput, UserContext,
};
use serde::Serialize;
use uuid::Uuid;

use crate::state::AppState;
use crate::subsystems::advice::{record_activity, AdviceError};

#[derive(Debug, Clone, Serialize)]
pub struct ConsultationView {
    pub consultation: ConsultationState,
    /// `MM:SS` since the start, while active.
    pub elapsed: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorReply {
    pub session_id: Uuid,
    pub reply: String,
    pub fallback: bool,
}

fn view(state: &ConsultationState) -> ConsultationView {
    ConsultationView {
        consultation: state.clone(),
        elapsed: state.elapsed_secs(Utc::now()).map(format_elapsed),
    }
}

pub async fn current(state: &AppState, user: &UserContext) -> ConsultationView {
    let Some(slot) = state.consultations.get(user.id).await else {
        return view(&ConsultationState::Idle);
    };
    let consultation = slot.lock().await;
    view(&consultation)
}

pub async fn start(
    state: &AppState,
    user: &UserContext,
    mode: ConsultationMode,
) -> Result<ConsultationView, AdviceError> {
    let snapshot = {
        let slot = state.consultations.slot(user.id).await;
        let mut consultation = slot.lock().await;
        consultation.start(mode, Utc::now())?;
        view(&consultation)
    };

    record_activity(state, user.id, ActivityKind::Consultation, &mode.started_description()).await;
    tracing::info!(user_id = %user.id, mode = %mode, "Consultation started");
    Ok(snapshot)
}

/// One patient message to the AI doctor. The reply is appended to the
/// transcript unless the consultation ended while it was being generated.
pub async fn message(
    state: &AppState,
    user: &UserContext,
    text: &str,
) -> Result<DoctorReply, AdviceError> {
    let _guard = state
        .in_flight
        .try_acquire(user.id, Feature::Consultation)
        .ok_or(AdviceError::Busy(Feature::Consultation))?;

    let slot = state
        .consultations
        .get(user.id)
        .await
        .ok_or(ConsultationError::NotActive)?;
    let asked_at = Utc::now();
    slot.lock().await.record_patient(text, asked_at)?;

    let input = PromptInput {
        text: text.trim().to_string(),
        context: Some(serde_json::json!({ "user": user })),
        ..Default::default()
    };

    // A turn without a ledger entry must not stay in the transcript.
    let session_id = match state
        .ledger
        .create_session(user.id, Feature::Consultation.agent_type(), &input.text)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            slot.lock().await.discard_patient_turn(asked_at);
            return Err(e.into());
        }
    };

    let advice = state
        .advisor
        .advise(Feature::Consultation, &build_prompt(Feature::Consultation, &input))
        .await;

    let mut metadata = serde_json::json!({ "feature": Feature::Consultation });
    if let (Some(obj), Some(e)) = (metadata.as_object_mut(), advice.error.as_deref()) {
        obj.insert("error".to_string(), serde_json::json!(e));
    }
    state
        .ledger
        .update_session(session_id, &advice.text, metadata)
        .await?;

    if let Err(e) = slot.lock().await.record_doctor(&advice.text, Utc::now()) {
        tracing::warn!(user_id = %user.id, error = %e, "Dropping AI doctor reply for ended consultation");
    }

    Ok(DoctorReply {
        session_id,
        fallback: advice.is_fallback(),
        reply: advice.text,
    })
}

/// End the active consultation, discarding its transcript.
pub async fn end(state: &AppState, user: &UserContext) -> Result<ConsultationView, AdviceError> {
    let (duration, snapshot) = {
        let slot = state
            .consultations
            .get(user.id)
            .await
            .ok_or(ConsultationError::NotActive)?;
        let mut consultation = slot.lock().await;
        let duration = consultation.end(Utc::now())?;
        (duration, view(&consultation))
    };

    record_activity(state, user.id, ActivityKind::Consultation, ENDED_DESCRIPTION).await;
    tracing::info!(user_id = %user.id, duration_secs = duration, "Consultation ended");
    Ok(snapshot)
}
