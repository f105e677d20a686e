use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{LedgerStore, ProfileStore};
use crate::accounts::NewAccount;
use crate::error::MedsyncError;
use crate::models::{AppointmentView, DoctorProfile, PatientProfile, Role, Session, User};

/// Postgres-backed store over the schema in `migrations/0001_init.sql`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// Enum columns are TEXT with CHECK constraints; rows are read as strings and
// parsed so an unexpected value surfaces as a decode error, not a panic.

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    agent_type: String,
    input_text: String,
    output_text: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
}

impl TryFrom<SessionRow> for Session {
    type Error = MedsyncError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: row.id,
            user_id: row.user_id,
            agent_type: row.agent_type.parse().map_err(MedsyncError::Other)?,
            input_text: row.input_text,
            output_text: row.output_text,
            started_at: row.started_at,
            ended_at: row.ended_at,
            metadata: row.metadata,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    role: String,
    name: String,
    locale: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = MedsyncError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            email: row.email,
            role: row.role.parse().map_err(MedsyncError::Other)?,
            name: row.name,
            locale: row.locale,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AppointmentRow {
    id: Uuid,
    counterpart_id: Uuid,
    counterpart_name: Option<String>,
    specialty: Option<String>,
    scheduled_at: DateTime<Utc>,
    status: String,
    notes: Option<String>,
}

impl TryFrom<AppointmentRow> for AppointmentView {
    type Error = MedsyncError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(AppointmentView {
            id: row.id,
            counterpart_id: row.counterpart_id,
            counterpart_name: row.counterpart_name.unwrap_or_default(),
            specialty: row.specialty.unwrap_or_default(),
            scheduled_at: row.scheduled_at,
            status: row.status.parse().map_err(MedsyncError::Other)?,
            notes: row.notes,
        })
    }
}

const SESSION_COLUMNS: &str =
    "id, user_id, agent_type, input_text, output_text, started_at, ended_at, metadata";

fn into_sessions(rows: Vec<SessionRow>) -> Result<Vec<Session>, MedsyncError> {
    rows.into_iter().map(Session::try_from).collect()
}

fn into_views(rows: Vec<AppointmentRow>) -> Result<Vec<AppointmentView>, MedsyncError> {
    rows.into_iter().map(AppointmentView::try_from).collect()
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn insert_session(&self, session: &Session) -> Result<(), MedsyncError> {
        sqlx::query(
            r#"
            INSERT INTO agent_sessions (id, user_id, agent_type, input_text, output_text, started_at, ended_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.agent_type.as_str())
        .bind(&session.input_text)
        .bind(&session.output_text)
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(&session.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn close_session(
        &self,
        id: Uuid,
        output_text: &str,
        metadata: serde_json::Value,
        ended_at: DateTime<Utc>,
    ) -> Result<Session, MedsyncError> {
        let updated = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE agent_sessions
            SET output_text = $2, metadata = $3, ended_at = GREATEST($4, started_at)
            WHERE id = $1 AND ended_at IS NULL
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(id)
        .bind(output_text)
        .bind(&metadata)
        .bind(ended_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Session::try_from(row);
        }

        // Nothing updated: either the id is unknown or the session is closed.
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM agent_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Err(MedsyncError::AlreadyClosed(id)),
            None => Err(MedsyncError::not_found("session", id)),
        }
    }

    async fn sessions_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, MedsyncError> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM agent_sessions WHERE user_id = $1 ORDER BY started_at DESC",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        into_sessions(rows)
    }

    async fn open_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, MedsyncError> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM agent_sessions WHERE user_id = $1 AND ended_at IS NULL ORDER BY started_at DESC",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        into_sessions(rows)
    }

    async fn describe(&self) -> Result<String, MedsyncError> {
        Ok(crate::db::health_check(&self.pool).await?)
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, MedsyncError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, role, name, locale, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn register(&self, account: &NewAccount) -> Result<User, MedsyncError> {
        let user = account.to_user(Utc::now());

        let mut tx = self.pool.begin().await?;

        let taken: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
            .bind(&user.email)
            .fetch_optional(&mut *tx)
            .await?;
        if taken.is_some() {
            return Err(MedsyncError::Conflict(format!(
                "email {} is already registered",
                user.email
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO users (id, email, role, name, locale, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.name)
        .bind(&user.locale)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await?;

        match user.role {
            Role::Patient => {
                if let Some(profile) = account.patient_profile(user.id) {
                    sqlx::query(
                        r#"
                        INSERT INTO patients (user_id, dob, gender, medical_history, preferences)
                        VALUES ($1, $2, $3, $4, $5)
                        "#,
                    )
                    .bind(profile.user_id)
                    .bind(profile.dob)
                    .bind(&profile.gender)
                    .bind(&profile.medical_history)
                    .bind(&profile.preferences)
                    .execute(&mut *tx)
                    .await?;
                }
            }
            Role::Doctor => {
                if let Some(profile) = account.doctor_profile(user.id) {
                    sqlx::query(
                        r#"
                        INSERT INTO doctors (user_id, specialty, languages, license_number, profile_data, is_verified)
                        VALUES ($1, $2, $3, $4, $5, $6)
                        "#,
                    )
                    .bind(profile.user_id)
                    .bind(&profile.specialty)
                    .bind(&profile.languages)
                    .bind(&profile.license_number)
                    .bind(&profile.profile_data)
                    .bind(profile.is_verified)
                    .execute(&mut *tx)
                    .await?;
                }
            }
            Role::Admin => {}
        }

        tx.commit().await?;

        tracing::info!(user_id = %user.id, role = user.role.as_str(), "Registered account");
        Ok(user)
    }

    async fn patient_profile(&self, user_id: Uuid) -> Result<Option<PatientProfile>, MedsyncError> {
        let profile = sqlx::query_as::<_, PatientProfile>(
            "SELECT user_id, dob, gender, medical_history, preferences FROM patients WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn doctor_profile(&self, user_id: Uuid) -> Result<Option<DoctorProfile>, MedsyncError> {
        let profile = sqlx::query_as::<_, DoctorProfile>(
            r#"
            SELECT user_id, specialty, languages, license_number, profile_data, is_verified
            FROM doctors WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn appointments_for_patient(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<AppointmentView>, MedsyncError> {
        let rows = sqlx::query_as::<_, AppointmentRow>(
            r#"
            SELECT a.id, a.doctor_id AS counterpart_id, u.name AS counterpart_name,
                   d.specialty, a.scheduled_at, a.status, a.notes
            FROM appointments a
            LEFT JOIN users u ON u.id = a.doctor_id
            LEFT JOIN doctors d ON d.user_id = a.doctor_id
            WHERE a.patient_id = $1
            ORDER BY a.scheduled_at ASC
            "#,
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;
        into_views(rows)
    }

    async fn appointments_for_doctor(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<AppointmentView>, MedsyncError> {
        let rows = sqlx::query_as::<_, AppointmentRow>(
            r#"
            SELECT a.id, a.patient_id AS counterpart_id, u.name AS counterpart_name,
                   d.specialty, a.scheduled_at, a.status, a.notes
            FROM appointments a
            LEFT JOIN users u ON u.id = a.patient_id
            LEFT JOIN doctors d ON d.user_id = a.doctor_id
            WHERE a.doctor_id = $1
            ORDER BY a.scheduled_at ASC
            "#,
        )
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await?;
        into_views(rows)
    }
}
