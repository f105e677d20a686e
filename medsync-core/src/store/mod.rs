//! Persistence seams.
//!
//! - **LedgerStore**: the `agent_sessions` table
//! - **ProfileStore**: users, patient and doctor profiles, appointments
//!
//! `PgStore` implements both against Postgres; `MemoryStore` keeps everything
//! in process for tests and `--ephemeral` runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::accounts::NewAccount;
use crate::error::MedsyncError;
use crate::models::{AppointmentView, DoctorProfile, PatientProfile, Session, User};

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), MedsyncError>;

    /// Close an open session. `ended_at` is raised to `started_at` if it is
    /// earlier. Fails with `NotFound` for an unknown id and `AlreadyClosed`
    /// when the session already has an output.
    async fn close_session(
        &self,
        id: Uuid,
        output_text: &str,
        metadata: serde_json::Value,
        ended_at: DateTime<Utc>,
    ) -> Result<Session, MedsyncError>;

    /// Most recent `started_at` first.
    async fn sessions_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, MedsyncError>;

    /// Sessions of this user that were never closed.
    async fn open_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, MedsyncError>;

    /// Short description of the backing store for health output.
    async fn describe(&self) -> Result<String, MedsyncError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, MedsyncError>;

    /// Write the user row and its dependent profile row together.
    async fn register(&self, account: &NewAccount) -> Result<User, MedsyncError>;

    async fn patient_profile(&self, user_id: Uuid) -> Result<Option<PatientProfile>, MedsyncError>;

    async fn doctor_profile(&self, user_id: Uuid) -> Result<Option<DoctorProfile>, MedsyncError>;

    /// Patient's appointments, soonest first, with the doctor's name and specialty.
    async fn appointments_for_patient(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<AppointmentView>, MedsyncError>;

    /// Doctor's appointments, soonest first, with the patient's name.
    async fn appointments_for_doctor(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<AppointmentView>, MedsyncError>;
}
