use crate::state::AppState;
use crate::subsystems::{advice, dashboard};
use medsync_core::accounts;
use medsync_core::ipc::{MedsyncRequest, MedsyncResponse};

pub async fn handle_request(request: MedsyncRequest, state: &AppState) -> MedsyncResponse {
    match request {
        MedsyncRequest::Ping => MedsyncResponse::pong(),
        MedsyncRequest::Health => match state.ledger.describe().await {
            Ok(store) => MedsyncResponse::ok(serde_json::json!({
                "status": "healthy",
                "store": store,
                "inference": state.advisor.backend_name(),
            })),
            Err(e) => MedsyncResponse::err(format!("Store health check failed: {}", e)),
        },
        MedsyncRequest::Advise {
            user_id,
            feature,
            input,
        } => {
            let user = match accounts::resolve_user(state.profiles.as_ref(), user_id).await {
                Ok(u) => u,
                Err(e) => return MedsyncResponse::err(e.to_string()),
            };
            match advice::run_feature(state, &user, feature, input).await {
                Ok(outcome) => match serde_json::to_value(&outcome) {
                    Ok(data) => MedsyncResponse::ok(data),
                    Err(e) => MedsyncResponse::err(format!("Serialization error: {}", e)),
                },
                Err(advice::AdviceError::Busy(_)) => {
                    MedsyncResponse::err("request already in progress")
                }
                Err(e) => MedsyncResponse::err(e.to_string()),
            }
        }
        MedsyncRequest::ListSessions { user_id, open_only } => {
            let sessions = if open_only {
                state.ledger.open_sessions(user_id).await
            } else {
                state.ledger.list_sessions(user_id).await
            };
            match sessions {
                Ok(sessions) => MedsyncResponse::ok(serde_json::json!({
                    "count": sessions.len(),
                    "sessions": sessions,
                })),
                Err(e) => MedsyncResponse::err(e.to_string()),
            }
        }
        MedsyncRequest::Dashboard { user_id } => {
            let user = match accounts::resolve_user(state.profiles.as_ref(), user_id).await {
                Ok(u) => u,
                Err(e) => return MedsyncResponse::err(e.to_string()),
            };
            match serde_json::to_value(dashboard::build(state, &user).await) {
                Ok(data) => MedsyncResponse::ok(data),
                Err(e) => MedsyncResponse::err(format!("Serialization error: {}", e)),
            }
        }
    }
}
