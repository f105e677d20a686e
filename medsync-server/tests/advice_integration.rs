//! End-to-end advice pipeline tests against an in-memory store.
//!
//! Inference is either a wiremock server speaking the chat-completions API or
//! a gated in-process backend used to hold a request open.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use medsync_core::consultation::Speaker;
use medsync_core::inference::UnavailableBackend;
use medsync_core::ipc::MedsyncRequest;
use medsync_core::{
    AgentType, ChatRequest, ConsultationMode, ConsultationState, Feature, GroqClient,
    InferenceBackend, InferenceConfig, InferenceError, LedgerStore, MedsyncConfig, MedsyncError,
    MemoryStore, NewAccount, PromptInput, Role, Session, UserContext,
};
use medsync_server::router;
use medsync_server::subsystems::advice::{self, AdviceError};
use medsync_server::subsystems::consultation;
use medsync_server::AppState;
use tokio::sync::Notify;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn inference_config(base_url: String) -> InferenceConfig {
    InferenceConfig {
        api_key: "test-api-key".to_string(),
        model: "llama-3.1-8b-instant".to_string(),
        base_url,
        timeout_seconds: 5,
    }
}

async fn make_state(backend: Arc<dyn InferenceBackend>) -> (Arc<AppState>, UserContext) {
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::new(MedsyncConfig::default(), store.clone(), store, backend));

    let account = NewAccount {
        email: "amaka@example.com".to_string(),
        name: "Amaka Nwosu".to_string(),
        role: Role::Patient,
        ..Default::default()
    };
    let user = medsync_core::accounts::register(state.profiles.as_ref(), &account)
        .await
        .expect("registration should succeed");
    let ctx = UserContext::from(&user);
    (state, ctx)
}

// ===========================================================================
// Symptom analysis with a mocked completion
// ===========================================================================
#[tokio::test]
async fn test_symptom_analysis_end_to_end() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Likely Condition\nViral infection\nImportant Warning\nSee a doctor if fever exceeds 39C\n"
                }
            }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = GroqClient::with_base_url(inference_config(String::new()), mock_server.uri())
        .expect("client");
    let (state, user) = make_state(Arc::new(client)).await;

    let outcome = advice::run_feature(
        &state,
        &user,
        Feature::SymptomAnalysis,
        PromptInput::text("I have a headache and fever"),
    )
    .await
    .expect("advice should succeed");

    assert!(!outcome.fallback);
    let sections = outcome.sections.expect("symptom analysis returns sections");
    assert_eq!(sections.condition, "Viral infection\n");
    assert_eq!(sections.warning, "See a doctor if fever exceeds 39C\n");
    assert!(sections.remedies.is_empty());
    assert!(sections.foods.is_empty());
    assert!(sections.medications.is_empty());
    assert!(sections.treatment.is_empty());

    let sessions = state.ledger.list_sessions(user.id).await.unwrap();
    assert_eq!(sessions.len(), 1);
    let session = &sessions[0];
    assert_eq!(session.id, outcome.session_id);
    assert_eq!(session.agent_type, AgentType::SymptomChecker);
    assert_eq!(session.input_text, "I have a headache and fever");
    assert!(session.is_closed());
    assert!(!session.is_error());
    assert!(session.ended_at.unwrap() >= session.started_at);

    let feed = state.activity.slot(user.id).await;
    let feed = feed.lock().await;
    assert_eq!(feed.recent()[0].description, "AI symptom analysis completed");
}

// ===========================================================================
// Network failure: fallback text, ledger closed with metadata.error
// ===========================================================================
#[tokio::test]
async fn test_network_error_falls_back_and_closes_session() {
    // Nothing listens on port 9; the connection is refused.
    let client = GroqClient::with_base_url(inference_config(String::new()), "http://127.0.0.1:9".to_string())
        .expect("client");
    let (state, user) = make_state(Arc::new(client)).await;

    let outcome = advice::run_feature(
        &state,
        &user,
        Feature::SymptomAnalysis,
        PromptInput::text("persistent cough"),
    )
    .await
    .expect("fallback is not an error");

    assert!(outcome.fallback);
    assert_eq!(outcome.text, Feature::SymptomAnalysis.fallback());
    assert!(outcome.sections.is_none());

    let sessions = state.ledger.list_sessions(user.id).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].is_closed());
    assert!(sessions[0].metadata["error"].is_string());
    assert_eq!(sessions[0].output_text, Feature::SymptomAnalysis.fallback());
    assert!(state.ledger.open_sessions(user.id).await.unwrap().is_empty());
}

// ===========================================================================
// Duplicate concurrent request for the same feature is rejected
// ===========================================================================

/// Blocks every completion until released.
struct GatedBackend {
    gate: Arc<Notify>,
    entered: Arc<Notify>,
}

#[async_trait]
impl InferenceBackend for GatedBackend {
    async fn complete(&self, _request: &ChatRequest) -> Result<String, InferenceError> {
        self.entered.notify_one();
        self.gate.notified().await;
        Ok("Medication Overview\nTake with food\n".to_string())
    }

    fn name(&self) -> &str {
        "gated"
    }
}

#[tokio::test]
async fn test_duplicate_request_rejected_while_in_flight() {
    let gate = Arc::new(Notify::new());
    let entered = Arc::new(Notify::new());
    let backend = GatedBackend {
        gate: gate.clone(),
        entered: entered.clone(),
    };
    let (state, user) = make_state(Arc::new(backend)).await;

    let first = {
        let state = state.clone();
        let user = user.clone();
        tokio::spawn(async move {
            advice::run_feature(&state, &user, Feature::MedicationCheck, PromptInput::text("metformin")).await
        })
    };

    entered.notified().await;

    let second = advice::run_feature(&state, &user, Feature::MedicationCheck, PromptInput::text("metformin")).await;
    assert!(matches!(second, Err(AdviceError::Busy(Feature::MedicationCheck))));

    gate.notify_one();
    let first = first.await.expect("task").expect("first request succeeds");
    assert!(!first.fallback);

    // Released after completion.
    assert!(!state.in_flight.is_running(user.id, Feature::MedicationCheck));
    let sessions = state.ledger.list_sessions(user.id).await.unwrap();
    assert_eq!(sessions.len(), 1);
}

// ===========================================================================
// Consultation turn with a failing ledger
// ===========================================================================

/// Ledger whose inserts always fail; reads see nothing.
struct RefusingLedger;

#[async_trait]
impl LedgerStore for RefusingLedger {
    async fn insert_session(&self, _session: &Session) -> Result<(), MedsyncError> {
        Err(MedsyncError::Other("ledger unavailable".to_string()))
    }

    async fn close_session(
        &self,
        id: uuid::Uuid,
        _output_text: &str,
        _metadata: serde_json::Value,
        _ended_at: DateTime<Utc>,
    ) -> Result<Session, MedsyncError> {
        Err(MedsyncError::not_found("Session", id))
    }

    async fn sessions_for_user(&self, _user_id: uuid::Uuid) -> Result<Vec<Session>, MedsyncError> {
        Ok(Vec::new())
    }

    async fn open_sessions(&self, _user_id: uuid::Uuid) -> Result<Vec<Session>, MedsyncError> {
        Ok(Vec::new())
    }

    async fn describe(&self) -> Result<String, MedsyncError> {
        Ok("refusing".to_string())
    }
}

#[tokio::test]
async fn test_consultation_turn_dropped_when_ledger_insert_fails() {
    let profiles = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::new(
        MedsyncConfig::default(),
        Arc::new(RefusingLedger),
        profiles,
        Arc::new(UnavailableBackend),
    ));
    let account = NewAccount {
        email: "obinna@example.com".to_string(),
        name: "Obinna Eze".to_string(),
        role: Role::Patient,
        ..Default::default()
    };
    let user = medsync_core::accounts::register(state.profiles.as_ref(), &account)
        .await
        .expect("registration should succeed");
    let user = UserContext::from(&user);

    consultation::start(&state, &user, ConsultationMode::Ai)
        .await
        .expect("consultation starts");

    let result = consultation::message(&state, &user, "I have chest pain").await;
    assert!(matches!(result, Err(AdviceError::Store(_))));

    let view = consultation::current(&state, &user).await;
    let ConsultationState::Active(active) = view.consultation else {
        panic!("consultation should still be active");
    };
    assert_eq!(active.transcript.len(), 1);
    assert_eq!(active.transcript[0].speaker, Speaker::Doctor);

    // The failed turn released its in-flight slot.
    assert!(!state.in_flight.is_running(user.id, Feature::Consultation));
}

// ===========================================================================
// IPC router
// ===========================================================================
#[tokio::test]
async fn test_router_advise_and_list_sessions() {
    let (state, user) = make_state(Arc::new(UnavailableBackend)).await;

    let response = router::handle_request(
        MedsyncRequest::Advise {
            user_id: user.id,
            feature: Feature::Translation,
            input: PromptInput {
                text: "Take one tablet twice daily".to_string(),
                target_language: Some("Igbo".to_string()),
                ..Default::default()
            },
        },
        &state,
    )
    .await;
    assert_eq!(response.status, "ok");
    let data = response.data.unwrap();
    assert_eq!(data["fallback"], true);

    let response = router::handle_request(
        MedsyncRequest::ListSessions {
            user_id: user.id,
            open_only: false,
        },
        &state,
    )
    .await;
    let data = response.data.unwrap();
    assert_eq!(data["count"], 1);
    assert_eq!(
        data["sessions"][0]["input_text"],
        "Translate to Igbo: Take one tablet twice daily..."
    );
    assert_eq!(data["sessions"][0]["agent_type"], "translation");
}

#[tokio::test]
async fn test_router_refuses_consultation_advice() {
    let (state, user) = make_state(Arc::new(UnavailableBackend)).await;

    let response = router::handle_request(
        MedsyncRequest::Advise {
            user_id: user.id,
            feature: Feature::Consultation,
            input: PromptInput::text("I have chest pain"),
        },
        &state,
    )
    .await;
    assert_eq!(response.status, "error");
    assert!(response.error.unwrap().contains("/consultations/message"));

    let sessions = state.ledger.list_sessions(user.id).await.unwrap();
    assert!(sessions.is_empty());

    let direct = advice::run_feature(
        &state,
        &user,
        Feature::Consultation,
        PromptInput::text("I have chest pain"),
    )
    .await;
    assert!(matches!(direct, Err(AdviceError::ConsultationTurn)));
}

#[tokio::test]
async fn test_router_unknown_user_is_error() {
    let (state, _) = make_state(Arc::new(UnavailableBackend)).await;
    let response = router::handle_request(
        MedsyncRequest::Dashboard {
            user_id: uuid::Uuid::new_v4(),
        },
        &state,
    )
    .await;
    assert_eq!(response.status, "error");
}

#[tokio::test]
async fn test_router_ping_and_health() {
    let (state, _) = make_state(Arc::new(UnavailableBackend)).await;
    let pong = router::handle_request(MedsyncRequest::Ping, &state).await;
    assert_eq!(pong.data.unwrap()["pong"], true);

    let health = router::handle_request(MedsyncRequest::Health, &state).await;
    assert_eq!(health.status, "ok");
    assert_eq!(health.data.unwrap()["inference"], "unavailable");
}
