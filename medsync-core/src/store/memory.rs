use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{LedgerStore, ProfileStore};
use crate::accounts::NewAccount;
use crate::error::MedsyncError;
use crate::models::{
    Appointment, AppointmentView, DoctorProfile, PatientProfile, Role, Session, User,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    patients: HashMap<Uuid, PatientProfile>,
    doctors: HashMap<Uuid, DoctorProfile>,
    appointments: Vec<Appointment>,
    sessions: Vec<Session>,
}

/// In-process store with the same semantics as [`super::PgStore`].
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_appointment(&self, appointment: Appointment) {
        self.tables.write().await.appointments.push(appointment);
    }
}

fn sorted_newest_first(mut sessions: Vec<Session>) -> Vec<Session> {
    sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    sessions
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<(), MedsyncError> {
        let mut tables = self.tables.write().await;
        if tables.sessions.iter().any(|s| s.id == session.id) {
            return Err(MedsyncError::Conflict(format!("session {} already exists", session.id)));
        }
        tables.sessions.push(session.clone());
        Ok(())
    }

    async fn close_session(
        &self,
        id: Uuid,
        output_text: &str,
        metadata: serde_json::Value,
        ended_at: DateTime<Utc>,
    ) -> Result<Session, MedsyncError> {
        let mut tables = self.tables.write().await;
        let session = tables
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| MedsyncError::not_found("session", id))?;

        if session.is_closed() {
            return Err(MedsyncError::AlreadyClosed(id));
        }

        session.output_text = output_text.to_string();
        session.metadata = metadata;
        session.ended_at = Some(ended_at.max(session.started_at));
        Ok(session.clone())
    }

    async fn sessions_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, MedsyncError> {
        let tables = self.tables.read().await;
        let sessions = tables
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        Ok(sorted_newest_first(sessions))
    }

    async fn open_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, MedsyncError> {
        let tables = self.tables.read().await;
        let sessions = tables
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && !s.is_closed())
            .cloned()
            .collect();
        Ok(sorted_newest_first(sessions))
    }

    async fn describe(&self) -> Result<String, MedsyncError> {
        let tables = self.tables.read().await;
        Ok(format!("in-memory ({} sessions)", tables.sessions.len()))
    }
}

fn view(appointment: &Appointment, counterpart_id: Uuid, tables: &Tables) -> AppointmentView {
    let counterpart_name = tables
        .users
        .get(&counterpart_id)
        .map(|u| u.name.clone())
        .unwrap_or_default();
    let specialty = tables
        .doctors
        .get(&appointment.doctor_id)
        .map(|d| d.specialty.clone())
        .unwrap_or_default();

    AppointmentView {
        id: appointment.id,
        counterpart_id,
        counterpart_name,
        specialty,
        scheduled_at: appointment.scheduled_at,
        status: appointment.status,
        notes: appointment.notes.clone(),
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, MedsyncError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn register(&self, account: &NewAccount) -> Result<User, MedsyncError> {
        let mut tables = self.tables.write().await;
        let email = account.email.trim().to_lowercase();

        if tables.users.values().any(|u| u.email == email) {
            return Err(MedsyncError::Conflict(format!("email {} is already registered", email)));
        }

        let user = account.to_user(Utc::now());
        if tables.users.contains_key(&user.id) {
            return Err(MedsyncError::Conflict(format!("user {} already exists", user.id)));
        }

        match user.role {
            Role::Patient => {
                if let Some(profile) = account.patient_profile(user.id) {
                    tables.patients.insert(user.id, profile);
                }
            }
            Role::Doctor => {
                if let Some(profile) = account.doctor_profile(user.id) {
                    tables.doctors.insert(user.id, profile);
                }
            }
            Role::Admin => {}
        }

        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn patient_profile(&self, user_id: Uuid) -> Result<Option<PatientProfile>, MedsyncError> {
        Ok(self.tables.read().await.patients.get(&user_id).cloned())
    }

    async fn doctor_profile(&self, user_id: Uuid) -> Result<Option<DoctorProfile>, MedsyncError> {
        Ok(self.tables.read().await.doctors.get(&user_id).cloned())
    }

    async fn appointments_for_patient(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<AppointmentView>, MedsyncError> {
        let tables = self.tables.read().await;
        let mut views: Vec<AppointmentView> = tables
            .appointments
            .iter()
            .filter(|a| a.patient_id == patient_id)
            .map(|a| view(a, a.doctor_id, &tables))
            .collect();
        views.sort_by_key(|v| v.scheduled_at);
        Ok(views)
    }

    async fn appointments_for_doctor(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<AppointmentView>, MedsyncError> {
        let tables = self.tables.read().await;
        let mut views: Vec<AppointmentView> = tables
            .appointments
            .iter()
            .filter(|a| a.doctor_id == doctor_id)
            .map(|a| view(a, a.patient_id, &tables))
            .collect();
        views.sort_by_key(|v| v.scheduled_at);
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentType, AppointmentStatus};
    use chrono::{Duration, NaiveDate};

    fn patient_account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            name: "Ada Obi".to_string(),
            role: Role::Patient,
            dob: NaiveDate::from_ymd_opt(1990, 4, 12),
            gender: Some("female".to_string()),
            ..Default::default()
        }
    }

    fn doctor_account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            name: "Dr. Sarah Johnson".to_string(),
            role: Role::Doctor,
            specialty: Some("Cardiology".to_string()),
            languages: vec!["en".to_string(), "yo".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_close_session_once() {
        let store = MemoryStore::new();
        let session = Session::open(Uuid::new_v4(), AgentType::TermExplanation, "hypertension");
        store.insert_session(&session).await.unwrap();

        let closed = store
            .close_session(session.id, "High blood pressure", serde_json::json!({}), Utc::now())
            .await
            .unwrap();
        assert_eq!(closed.output_text, "High blood pressure");
        assert!(closed.ended_at.is_some());

        let again = store
            .close_session(session.id, "overwrite", serde_json::json!({}), Utc::now())
            .await;
        assert!(matches!(again, Err(MedsyncError::AlreadyClosed(id)) if id == session.id));
    }

    #[tokio::test]
    async fn test_close_unknown_session_is_not_found() {
        let store = MemoryStore::new();
        let result = store
            .close_session(Uuid::new_v4(), "x", serde_json::json!({}), Utc::now())
            .await;
        assert!(matches!(result, Err(MedsyncError::NotFound { entity: "session", .. })));
    }

    #[tokio::test]
    async fn test_close_clamps_ended_at() {
        let store = MemoryStore::new();
        let session = Session::open(Uuid::new_v4(), AgentType::HealthCoach, "run 5k");
        store.insert_session(&session).await.unwrap();

        let closed = store
            .close_session(
                session.id,
                "plan",
                serde_json::json!({}),
                session.started_at - Duration::seconds(30),
            )
            .await
            .unwrap();
        assert_eq!(closed.ended_at, Some(session.started_at));
    }

    #[tokio::test]
    async fn test_register_patient_writes_profile() {
        let store = MemoryStore::new();
        let user = store.register(&patient_account("Ada@Example.com")).await.unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.locale, "en");

        let profile = store.patient_profile(user.id).await.unwrap().unwrap();
        assert_eq!(profile.gender, "female");
    }

    #[tokio::test]
    async fn test_register_patient_without_dob_skips_profile() {
        let store = MemoryStore::new();
        let mut account = patient_account("nodob@example.com");
        account.dob = None;
        let user = store.register(&account).await.unwrap();
        assert!(store.patient_profile(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        store.register(&patient_account("dup@example.com")).await.unwrap();
        let result = store.register(&patient_account("DUP@example.com")).await;
        assert!(matches!(result, Err(MedsyncError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_appointment_views_join_names() {
        let store = MemoryStore::new();
        let patient = store.register(&patient_account("p@example.com")).await.unwrap();
        let doctor = store.register(&doctor_account("d@example.com")).await.unwrap();

        let now = Utc::now();
        for (offset, status) in [(48, AppointmentStatus::Scheduled), (24, AppointmentStatus::Completed)] {
            store
                .add_appointment(Appointment {
                    id: Uuid::new_v4(),
                    patient_id: patient.id,
                    doctor_id: doctor.id,
                    scheduled_at: now + Duration::hours(offset),
                    duration_minutes: 30,
                    status,
                    notes: None,
                    metadata: serde_json::json!({}),
                })
                .await;
        }

        let for_patient = store.appointments_for_patient(patient.id).await.unwrap();
        assert_eq!(for_patient.len(), 2);
        assert!(for_patient[0].scheduled_at < for_patient[1].scheduled_at);
        assert_eq!(for_patient[0].counterpart_name, "Dr. Sarah Johnson");
        assert_eq!(for_patient[0].specialty, "Cardiology");

        let for_doctor = store.appointments_for_doctor(doctor.id).await.unwrap();
        assert_eq!(for_doctor[0].counterpart_name, "Ada Obi");
        assert_eq!(for_doctor[0].counterpart_id, patient.id);
    }
}
