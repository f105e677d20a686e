//! Session ledger: one `agent_sessions` record per AI interaction.
//!
//! A record is created before the inference call with an empty output and
//! closed exactly once afterwards with the real output, or the fallback text
//! plus `metadata.error`.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::MedsyncError;
use crate::models::{AgentType, Session};
use crate::store::LedgerStore;

#[derive(Clone)]
pub struct SessionLedger {
    store: Arc<dyn LedgerStore>,
}

impl SessionLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn create_session(
        &self,
        user_id: Uuid,
        agent_type: AgentType,
        input_text: &str,
    ) -> Result<Uuid, MedsyncError> {
        let session = Session::open(user_id, agent_type, input_text);
        self.store.insert_session(&session).await?;
        tracing::debug!(session_id = %session.id, agent_type = %agent_type, "Opened ledger session");
        Ok(session.id)
    }

    pub async fn update_session(
        &self,
        session_id: Uuid,
        output_text: &str,
        metadata: serde_json::Value,
    ) -> Result<Session, MedsyncError> {
        let session = self
            .store
            .close_session(session_id, output_text, metadata, Utc::now())
            .await?;
        tracing::debug!(
            session_id = %session_id,
            error = session.is_error(),
            "Closed ledger session"
        );
        Ok(session)
    }

    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, MedsyncError> {
        self.store.sessions_for_user(user_id).await
    }

    /// Sessions left open by a crash between create and update. Diagnostic only.
    pub async fn open_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, MedsyncError> {
        self.store.open_sessions(user_id).await
    }

    pub async fn describe(&self) -> Result<String, MedsyncError> {
        self.store.describe().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ledger() -> SessionLedger {
        SessionLedger::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_create_then_update_yields_one_closed_record() {
        let ledger = ledger();
        let user = Uuid::new_v4();

        let id = ledger
            .create_session(user, AgentType::SymptomChecker, "fever and cough")
            .await
            .unwrap();
        ledger
            .update_session(id, "Likely Condition\nFlu\n", serde_json::json!({}))
            .await
            .unwrap();

        let sessions = ledger.list_sessions(user).await.unwrap();
        assert_eq!(sessions.len(), 1);
        let s = &sessions[0];
        assert_eq!(s.id, id);
        assert!(!s.output_text.is_empty());
        assert!(s.ended_at.unwrap() >= s.started_at);
        assert_eq!(s.input_text, "fever and cough");
    }

    #[tokio::test]
    async fn test_second_update_is_rejected() {
        let ledger = ledger();
        let id = ledger
            .create_session(Uuid::new_v4(), AgentType::Translation, "Translate to French: hi...")
            .await
            .unwrap();
        ledger.update_session(id, "salut", serde_json::json!({})).await.unwrap();

        let result = ledger.update_session(id, "bonjour", serde_json::json!({})).await;
        assert!(matches!(result, Err(MedsyncError::AlreadyClosed(_))));
    }

    #[tokio::test]
    async fn test_update_unknown_session_fails() {
        let result = ledger()
            .update_session(Uuid::new_v4(), "text", serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(MedsyncError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_scoped_to_user() {
        let ledger = ledger();
        let user = Uuid::new_v4();
        let first = ledger.create_session(user, AgentType::HealthCoach, "a").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = ledger.create_session(user, AgentType::MedicationCheck, "b").await.unwrap();
        ledger
            .create_session(Uuid::new_v4(), AgentType::HealthCoach, "other user")
            .await
            .unwrap();

        let ids: Vec<Uuid> = ledger.list_sessions(user).await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[tokio::test]
    async fn test_open_sessions_lists_unclosed_only() {
        let ledger = ledger();
        let user = Uuid::new_v4();
        let closed = ledger.create_session(user, AgentType::TermExplanation, "x").await.unwrap();
        let open = ledger.create_session(user, AgentType::TermExplanation, "y").await.unwrap();
        ledger
            .update_session(closed, "fallback", serde_json::json!({ "error": "timeout" }))
            .await
            .unwrap();

        let sessions = ledger.open_sessions(user).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, open);

        let all = ledger.list_sessions(user).await.unwrap();
        assert!(all.iter().any(|s| s.id == closed && s.is_error()));
    }
}
