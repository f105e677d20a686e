//! MedSync HTTP REST API
//!
//! Axum-based HTTP server exposing the advice features, the session ledger,
//! dashboards, consultations and the marketplace. Runs alongside the Unix
//! socket IPC server.
//!
//! Each endpoint has a thin axum handler that resolves the caller and
//! delegates to an inner function returning `(StatusCode, serde_json::Value)`;
//! the inner functions are tested directly.
//!
//! The caller is identified by the `x-user-id` header, set by the gateway in
//! front of this service after authentication.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use medsync_core::imaging::{ImageError, ImageUpload};
use medsync_core::{
    accounts, CartError, ConsultationError, ConsultationMode, Currency, DeliveryDetails, Feature,
    MedsyncError, NewAccount, PromptInput, UserContext,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::state::AppState;
use crate::subsystems::advice::{self, AdviceError};
use crate::subsystems::marketplace::PurchaseError;
use crate::subsystems::{consultation, dashboard, marketplace};

pub const USER_HEADER: &str = "x-user-id";

type HttpReply = (StatusCode, serde_json::Value);

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/accounts", post(register_handler))
        .route("/advice/:feature", post(advice_handler))
        .route("/images/analyze", post(image_handler))
        .route("/sessions", get(sessions_handler))
        .route("/dashboard", get(dashboard_handler))
        .route("/consultations", get(consultation_handler))
        .route("/consultations/start", post(consultation_start_handler))
        .route("/consultations/message", post(consultation_message_handler))
        .route("/consultations/end", post(consultation_end_handler))
        .route("/marketplace/items", get(catalog_handler))
        .route("/cart", get(cart_handler))
        .route("/cart/items", post(cart_add_handler))
        .route(
            "/cart/items/:id",
            put(cart_quantity_handler).delete(cart_remove_handler),
        )
        .route("/cart/checkout", post(checkout_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("MedSync HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct AdviceRequest {
    pub input: Option<String>,
    pub context: Option<serde_json::Value>,
    pub target_language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImageAnalyzeRequest {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SessionsQuery {
    #[serde(default)]
    pub open: bool,
}

#[derive(Debug, Deserialize)]
pub struct StartConsultationRequest {
    pub mode: ConsultationMode,
}

#[derive(Debug, Deserialize)]
pub struct ConsultationMessageRequest {
    pub text: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct CatalogQuery {
    pub page: Option<usize>,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CurrencyQuery {
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub item_id: u32,
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(flatten)]
    pub delivery: DeliveryDetails,
    pub currency: Option<String>,
}

// ============================================================================
// Error mapping
// ============================================================================

pub fn error_reply(status: StatusCode, msg: impl Into<String>) -> HttpReply {
    (
        status,
        serde_json::json!({
            "error": msg.into(),
            "status": "error",
        }),
    )
}

fn ok_reply<T: serde::Serialize>(status: StatusCode, value: &T) -> HttpReply {
    match serde_json::to_value(value) {
        Ok(body) => (status, body),
        Err(e) => error_reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Serialization error: {}", e),
        ),
    }
}

pub fn store_error_status(e: &MedsyncError) -> StatusCode {
    match e {
        MedsyncError::NotFound { .. } => StatusCode::NOT_FOUND,
        MedsyncError::Conflict(_) | MedsyncError::AlreadyClosed(_) => StatusCode::CONFLICT,
        MedsyncError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn advice_error_status(e: &AdviceError) -> StatusCode {
    match e {
        AdviceError::EmptyInput(_) | AdviceError::ConsultationTurn => StatusCode::BAD_REQUEST,
        AdviceError::Busy(_) => StatusCode::CONFLICT,
        AdviceError::Image(ImageError::TooLarge(_)) => StatusCode::PAYLOAD_TOO_LARGE,
        AdviceError::Image(ImageError::NotAnImage(_)) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        AdviceError::Consultation(ConsultationError::EmptyMessage) => StatusCode::BAD_REQUEST,
        AdviceError::Consultation(_) => StatusCode::CONFLICT,
        AdviceError::Store(e) => store_error_status(e),
    }
}

fn advice_error_reply(e: AdviceError) -> HttpReply {
    let status = advice_error_status(&e);
    if status.is_server_error() {
        tracing::error!(error = %e, "Advice request failed");
    }
    error_reply(status, e.to_string())
}

fn cart_error_status(e: &CartError) -> StatusCode {
    match e {
        CartError::UnknownItem(_) | CartError::NotInCart(_) => StatusCode::NOT_FOUND,
        CartError::EmptyCart
        | CartError::MissingDelivery(_)
        | CartError::InvalidQuantity(_) => StatusCode::BAD_REQUEST,
    }
}

fn parse_currency(raw: Option<&str>) -> Result<Currency, HttpReply> {
    match raw {
        None => Ok(Currency::default()),
        Some(c) => c
            .parse()
            .map_err(|e: String| error_reply(StatusCode::BAD_REQUEST, e)),
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Resolve the `x-user-id` header into the caller's context.
pub async fn caller_inner(state: &AppState, user_header: Option<&str>) -> Result<UserContext, HttpReply> {
    let raw = match user_header.map(str::trim).filter(|h| !h.is_empty()) {
        Some(h) => h,
        None => {
            return Err(error_reply(
                StatusCode::UNAUTHORIZED,
                format!("{} header is required", USER_HEADER),
            ))
        }
    };
    let id = Uuid::parse_str(raw).map_err(|_| {
        error_reply(
            StatusCode::UNAUTHORIZED,
            format!("{} is not a valid user id", USER_HEADER),
        )
    })?;

    match accounts::resolve_user(state.profiles.as_ref(), id).await {
        Ok(user) => Ok(user),
        Err(MedsyncError::NotFound { .. }) => {
            Err(error_reply(StatusCode::UNAUTHORIZED, "unknown user"))
        }
        Err(e) => {
            tracing::error!(user_id = %id, error = %e, "Failed to resolve caller");
            Err(error_reply(store_error_status(&e), e.to_string()))
        }
    }
}

/// Inner health check: queries the store and reports the inference backend.
pub async fn health_inner(state: &AppState) -> HttpReply {
    match state.ledger.describe().await {
        Ok(store) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": store,
                "inference": state.advisor.backend_name(),
                "socket": state.config.service.socket_path,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "medsync/1",
        "features": Feature::ALL.iter().map(|f| f.as_str()).collect::<Vec<_>>(),
    })
}

pub async fn register_inner(state: &AppState, account: NewAccount) -> HttpReply {
    match accounts::register(state.profiles.as_ref(), &account).await {
        Ok(user) => ok_reply(StatusCode::CREATED, &user),
        Err(e) => {
            let status = store_error_status(&e);
            if status.is_server_error() {
                tracing::error!(error = %e, "Registration failed");
            }
            error_reply(status, e.to_string())
        }
    }
}

pub async fn advice_inner(
    state: &AppState,
    user: &UserContext,
    feature: &str,
    req: AdviceRequest,
) -> HttpReply {
    let feature: Feature = match feature.parse() {
        Ok(f) => f,
        Err(e) => return error_reply(StatusCode::NOT_FOUND, e),
    };
    let input = PromptInput {
        text: req.input.unwrap_or_default(),
        context: req.context,
        target_language: req.target_language,
        annotations: None,
    };

    let start = Instant::now();
    match advice::run_feature(state, user, feature, input).await {
        Ok(outcome) => {
            let (status, mut body) = ok_reply(StatusCode::OK, &outcome);
            if let Some(obj) = body.as_object_mut() {
                obj.insert(
                    "took_ms".to_string(),
                    serde_json::json!(start.elapsed().as_millis() as u64),
                );
            }
            (status, body)
        }
        Err(e) => advice_error_reply(e),
    }
}

pub async fn image_inner(state: &AppState, user: &UserContext, req: ImageAnalyzeRequest) -> HttpReply {
    let upload = ImageUpload {
        file_name: req.file_name,
        mime_type: req.mime_type,
        size_bytes: req.size_bytes,
    };
    match advice::analyze_image(state, user, upload, req.description).await {
        Ok((outcome, annotations)) => ok_reply(
            StatusCode::OK,
            &serde_json::json!({
                "analysis": outcome,
                "annotations": annotations,
            }),
        ),
        Err(e) => advice_error_reply(e),
    }
}

pub async fn sessions_inner(state: &AppState, user: &UserContext, query: SessionsQuery) -> HttpReply {
    let sessions = if query.open {
        state.ledger.open_sessions(user.id).await
    } else {
        state.ledger.list_sessions(user.id).await
    };
    match sessions {
        Ok(sessions) => (
            StatusCode::OK,
            serde_json::json!({
                "count": sessions.len(),
                "sessions": sessions,
            }),
        ),
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Failed to list sessions");
            error_reply(store_error_status(&e), e.to_string())
        }
    }
}

pub async fn dashboard_inner(state: &AppState, user: &UserContext) -> HttpReply {
    ok_reply(StatusCode::OK, &dashboard::build(state, user).await)
}

pub async fn consultation_inner(state: &AppState, user: &UserContext) -> HttpReply {
    ok_reply(StatusCode::OK, &consultation::current(state, user).await)
}

pub async fn consultation_start_inner(
    state: &AppState,
    user: &UserContext,
    req: StartConsultationRequest,
) -> HttpReply {
    match consultation::start(state, user, req.mode).await {
        Ok(view) => ok_reply(StatusCode::OK, &view),
        Err(e) => advice_error_reply(e),
    }
}

pub async fn consultation_message_inner(
    state: &AppState,
    user: &UserContext,
    req: ConsultationMessageRequest,
) -> HttpReply {
    match consultation::message(state, user, &req.text).await {
        Ok(reply) => ok_reply(StatusCode::OK, &reply),
        Err(e) => advice_error_reply(e),
    }
}

pub async fn consultation_end_inner(state: &AppState, user: &UserContext) -> HttpReply {
    match consultation::end(state, user).await {
        Ok(view) => ok_reply(StatusCode::OK, &view),
        Err(e) => advice_error_reply(e),
    }
}

pub fn catalog_inner(query: CatalogQuery) -> HttpReply {
    match parse_currency(query.currency.as_deref()) {
        Ok(currency) => ok_reply(
            StatusCode::OK,
            &marketplace::catalog_page(query.page.unwrap_or(1), currency),
        ),
        Err(reply) => reply,
    }
}

pub async fn cart_inner(state: &AppState, user: &UserContext, query: CurrencyQuery) -> HttpReply {
    match parse_currency(query.currency.as_deref()) {
        Ok(currency) => ok_reply(StatusCode::OK, &marketplace::cart(state, user, currency).await),
        Err(reply) => reply,
    }
}

pub async fn cart_add_inner(
    state: &AppState,
    user: &UserContext,
    query: CurrencyQuery,
    req: AddToCartRequest,
) -> HttpReply {
    let currency = match parse_currency(query.currency.as_deref()) {
        Ok(c) => c,
        Err(reply) => return reply,
    };
    match marketplace::add_item(state, user, req.item_id, currency).await {
        Ok(view) => ok_reply(StatusCode::OK, &view),
        Err(e) => error_reply(cart_error_status(&e), e.to_string()),
    }
}

pub async fn cart_quantity_inner(
    state: &AppState,
    user: &UserContext,
    item_id: u32,
    query: CurrencyQuery,
    req: QuantityRequest,
) -> HttpReply {
    let currency = match parse_currency(query.currency.as_deref()) {
        Ok(c) => c,
        Err(reply) => return reply,
    };
    match marketplace::set_quantity(state, user, item_id, req.quantity, currency).await {
        Ok(view) => ok_reply(StatusCode::OK, &view),
        Err(e) => error_reply(cart_error_status(&e), e.to_string()),
    }
}

pub async fn cart_remove_inner(
    state: &AppState,
    user: &UserContext,
    item_id: u32,
    query: CurrencyQuery,
) -> HttpReply {
    match parse_currency(query.currency.as_deref()) {
        Ok(currency) => ok_reply(
            StatusCode::OK,
            &marketplace::remove_item(state, user, item_id, currency).await,
        ),
        Err(reply) => reply,
    }
}

pub async fn checkout_inner(state: &AppState, user: &UserContext, req: CheckoutRequest) -> HttpReply {
    let currency = match parse_currency(req.currency.as_deref()) {
        Ok(c) => c,
        Err(reply) => return reply,
    };
    match marketplace::checkout(state, user, req.delivery, currency).await {
        Ok(receipt) => ok_reply(StatusCode::OK, &receipt),
        Err(PurchaseError::Cart(e)) => error_reply(cart_error_status(&e), e.to_string()),
        Err(PurchaseError::Store(e)) => {
            tracing::error!(user_id = %user.id, error = %e, "Failed to record purchase");
            error_reply(store_error_status(&e), e.to_string())
        }
    }
}

// ============================================================================
// Axum handler wrappers (thin: resolve the caller, delegate to inner functions)
// ============================================================================

fn user_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(USER_HEADER).and_then(|v| v.to_str().ok())
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(account): Json<NewAccount>,
) -> impl IntoResponse {
    let (status, body) = register_inner(&state, account).await;
    (status, Json(body))
}

pub async fn advice_handler(
    State(state): State<Arc<AppState>>,
    Path(feature): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AdviceRequest>,
) -> impl IntoResponse {
    let (status, body) = match caller_inner(&state, user_header(&headers)).await {
        Ok(user) => advice_inner(&state, &user, &feature, req).await,
        Err(reply) => reply,
    };
    (status, Json(body))
}

pub async fn image_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ImageAnalyzeRequest>,
) -> impl IntoResponse {
    let (status, body) = match caller_inner(&state, user_header(&headers)).await {
        Ok(user) => image_inner(&state, &user, req).await,
        Err(reply) => reply,
    };
    (status, Json(body))
}

pub async fn sessions_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SessionsQuery>,
) -> impl IntoResponse {
    let (status, body) = match caller_inner(&state, user_header(&headers)).await {
        Ok(user) => sessions_inner(&state, &user, query).await,
        Err(reply) => reply,
    };
    (status, Json(body))
}

pub async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) = match caller_inner(&state, user_header(&headers)).await {
        Ok(user) => dashboard_inner(&state, &user).await,
        Err(reply) => reply,
    };
    (status, Json(body))
}

pub async fn consultation_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) = match caller_inner(&state, user_header(&headers)).await {
        Ok(user) => consultation_inner(&state, &user).await,
        Err(reply) => reply,
    };
    (status, Json(body))
}

pub async fn consultation_start_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<StartConsultationRequest>,
) -> impl IntoResponse {
    let (status, body) = match caller_inner(&state, user_header(&headers)).await {
        Ok(user) => consultation_start_inner(&state, &user, req).await,
        Err(reply) => reply,
    };
    (status, Json(body))
}

pub async fn consultation_message_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ConsultationMessageRequest>,
) -> impl IntoResponse {
    let (status, body) = match caller_inner(&state, user_header(&headers)).await {
        Ok(user) => consultation_message_inner(&state, &user, req).await,
        Err(reply) => reply,
    };
    (status, Json(body))
}

pub async fn consultation_end_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) = match caller_inner(&state, user_header(&headers)).await {
        Ok(user) => consultation_end_inner(&state, &user).await,
        Err(reply) => reply,
    };
    (status, Json(body))
}

pub async fn catalog_handler(Query(query): Query<CatalogQuery>) -> impl IntoResponse {
    let (status, body) = catalog_inner(query);
    (status, Json(body))
}

pub async fn cart_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CurrencyQuery>,
) -> impl IntoResponse {
    let (status, body) = match caller_inner(&state, user_header(&headers)).await {
        Ok(user) => cart_inner(&state, &user, query).await,
        Err(reply) => reply,
    };
    (status, Json(body))
}

pub async fn cart_add_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CurrencyQuery>,
    Json(req): Json<AddToCartRequest>,
) -> impl IntoResponse {
    let (status, body) = match caller_inner(&state, user_header(&headers)).await {
        Ok(user) => cart_add_inner(&state, &user, query, req).await,
        Err(reply) => reply,
    };
    (status, Json(body))
}

pub async fn cart_quantity_handler(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<u32>,
    headers: HeaderMap,
    Query(query): Query<CurrencyQuery>,
    Json(req): Json<QuantityRequest>,
) -> impl IntoResponse {
    let (status, body) = match caller_inner(&state, user_header(&headers)).await {
        Ok(user) => cart_quantity_inner(&state, &user, item_id, query, req).await,
        Err(reply) => reply,
    };
    (status, Json(body))
}

pub async fn cart_remove_handler(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<u32>,
    headers: HeaderMap,
    Query(query): Query<CurrencyQuery>,
) -> impl IntoResponse {
    let (status, body) = match caller_inner(&state, user_header(&headers)).await {
        Ok(user) => cart_remove_inner(&state, &user, item_id, query).await,
        Err(reply) => reply,
    };
    (status, Json(body))
}

pub async fn checkout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> impl IntoResponse {
    let (status, body) = match caller_inner(&state, user_header(&headers)).await {
        Ok(user) => checkout_inner(&state, &user, req).await,
        Err(reply) => reply,
    };
    (status, Json(body))
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use medsync_core::inference::UnavailableBackend;
    use medsync_core::{MedsyncConfig, MemoryStore, Role};

    async fn make_state() -> (Arc<AppState>, UserContext) {
        let store = Arc::new(MemoryStore::new());
        let state = Arc::new(AppState::new(
            MedsyncConfig::default(),
            store.clone(),
            store,
            Arc::new(UnavailableBackend),
        ));
        let account = NewAccount {
            email: format!("{}@example.com", Uuid::new_v4()),
            name: "Test Patient".to_string(),
            role: Role::Patient,
            ..Default::default()
        };
        let (status, body) = register_inner(&state, account).await;
        assert_eq!(status, StatusCode::CREATED);
        let id: Uuid = serde_json::from_value(body["id"].clone()).unwrap();
        let user = caller_inner(&state, Some(&id.to_string())).await.unwrap();
        (state, user)
    }

    #[test]
    fn test_version_inner() {
        let v = version_inner();
        assert_eq!(v["protocol"], "medsync/1");
        assert_eq!(v["features"].as_array().unwrap().len(), Feature::ALL.len());
    }

    #[tokio::test]
    async fn test_health_inner_reports_store() {
        let (state, _) = make_state().await;
        let (status, body) = health_inner(&state).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["inference"], "unavailable");
    }

    #[tokio::test]
    async fn test_caller_requires_known_user() {
        let (state, _) = make_state().await;
        let (status, _) = caller_inner(&state, None).await.unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = caller_inner(&state, Some("not-a-uuid")).await.unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) = caller_inner(&state, Some(&Uuid::new_v4().to_string()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unknown user");
    }

    #[tokio::test]
    async fn test_advice_inner_rejects_empty_input() {
        let (state, user) = make_state().await;
        let (status, body) = advice_inner(&state, &user, "symptom_analysis", AdviceRequest::default()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert!(state.ledger.list_sessions(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_advice_inner_unknown_feature() {
        let (state, user) = make_state().await;
        let (status, _) = advice_inner(&state, &user, "astrology", AdviceRequest::default()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_advice_inner_returns_fallback_without_backend() {
        let (state, user) = make_state().await;
        let req = AdviceRequest {
            input: Some("What is hypertension?".to_string()),
            ..Default::default()
        };
        let (status, body) = advice_inner(&state, &user, "term_explanation", req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fallback"], true);
        assert_eq!(body["text"], Feature::TermExplanation.fallback());
        assert!(body.get("sections").is_none());
    }

    #[tokio::test]
    async fn test_advice_inner_busy_returns_conflict() {
        let (state, user) = make_state().await;
        let _guard = state.in_flight.try_acquire(user.id, Feature::MedicationCheck).unwrap();
        let req = AdviceRequest {
            input: Some("ibuprofen".to_string()),
            ..Default::default()
        };
        let (status, _) = advice_inner(&state, &user, "medication_check", req).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_image_inner_rejects_non_image() {
        let (state, user) = make_state().await;
        let req = ImageAnalyzeRequest {
            file_name: "notes.txt".to_string(),
            mime_type: "text/plain".to_string(),
            size_bytes: 100,
            description: None,
        };
        let (status, _) = image_inner(&state, &user, req).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_consultation_flow_inner() {
        let (state, user) = make_state().await;
        let (status, _) = consultation_end_inner(&state, &user).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = consultation_start_inner(
            &state,
            &user,
            StartConsultationRequest { mode: ConsultationMode::Ai },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["consultation"]["state"], "active");
        assert_eq!(body["elapsed"], "00:00");

        let (status, body) = consultation_message_inner(
            &state,
            &user,
            ConsultationMessageRequest { text: "I have chest pain".to_string() },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], Feature::Consultation.fallback());

        let (_, body) = consultation_inner(&state, &user).await;
        // welcome, patient message, reply
        assert_eq!(body["consultation"]["transcript"].as_array().unwrap().len(), 3);

        let (status, body) = consultation_end_inner(&state, &user).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["consultation"]["state"], "ended");
    }

    #[test]
    fn test_catalog_inner_pages_and_currency() {
        let (status, body) = catalog_inner(CatalogQuery {
            page: Some(2),
            currency: Some("USD".to_string()),
        });
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_pages"], 2);
        assert_eq!(body["items"][0]["id"], 13);
        assert_eq!(body["items"][0]["price"]["currency"], "USD");

        let (status, _) = catalog_inner(CatalogQuery {
            page: None,
            currency: Some("EUR".to_string()),
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cart_and_checkout_inner() {
        let (state, user) = make_state().await;
        let (status, body) =
            cart_add_inner(&state, &user, CurrencyQuery::default(), AddToCartRequest { item_id: 1 }).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"]["minor"], 50_000);

        let (status, _) =
            cart_add_inner(&state, &user, CurrencyQuery::default(), AddToCartRequest { item_id: 404 }).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let missing = CheckoutRequest {
            delivery: DeliveryDetails {
                name: "Ada".to_string(),
                ..Default::default()
            },
            currency: None,
        };
        let (status, _) = checkout_inner(&state, &user, missing).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let complete = CheckoutRequest {
            delivery: DeliveryDetails {
                name: "Ada".to_string(),
                phone: "08000000000".to_string(),
                address: "1 Allen Avenue, Ikeja".to_string(),
            },
            currency: None,
        };
        let (status, body) = checkout_inner(&state, &user, complete).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"]["minor"], 50_000);

        let (_, cart) = cart_inner(&state, &user, CurrencyQuery::default()).await;
        assert_eq!(cart["item_count"], 0);

        let sessions = state.ledger.list_sessions(user.id).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].agent_type, medsync_core::AgentType::Purchase);
    }

    #[tokio::test]
    async fn test_register_inner_conflict() {
        let (state, user) = make_state().await;
        let account = NewAccount {
            email: user.email.clone(),
            name: "Someone Else".to_string(),
            ..Default::default()
        };
        let (status, _) = register_inner(&state, account).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
