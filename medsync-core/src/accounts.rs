//! Account registration and caller identity resolution.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MedsyncError;
use crate::models::{DoctorProfile, PatientProfile, Role, User, UserContext};
use crate::store::ProfileStore;

/// Registration request. `id` is the identity provider's user id when known.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewAccount {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub dob: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub license_number: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl NewAccount {
    pub fn validate(&self) -> Result<(), MedsyncError> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(MedsyncError::Validation("a valid email is required".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(MedsyncError::Validation("name is required".to_string()));
        }
        if let Some(dob) = self.dob {
            if dob > Utc::now().date_naive() {
                return Err(MedsyncError::Validation("date of birth is in the future".to_string()));
            }
        }
        Ok(())
    }

    pub fn to_user(&self, created_at: DateTime<Utc>) -> User {
        User {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            email: self.email.trim().to_lowercase(),
            role: self.role,
            name: self.name.trim().to_string(),
            locale: non_blank(&self.locale).unwrap_or("en").to_string(),
            created_at,
        }
    }

    /// Patient row, written only when both date of birth and gender were given.
    pub fn patient_profile(&self, user_id: Uuid) -> Option<PatientProfile> {
        if self.role != Role::Patient {
            return None;
        }
        let dob = self.dob?;
        let gender = non_blank(&self.gender)?;
        Some(PatientProfile {
            user_id,
            dob,
            gender: gender.to_string(),
            medical_history: serde_json::json!({}),
            preferences: serde_json::json!({}),
        })
    }

    /// Doctor row, written only when a specialty was given. New doctors start unverified.
    pub fn doctor_profile(&self, user_id: Uuid) -> Option<DoctorProfile> {
        if self.role != Role::Doctor {
            return None;
        }
        let specialty = non_blank(&self.specialty)?;
        Some(DoctorProfile {
            user_id,
            specialty: specialty.to_string(),
            languages: self.languages.clone(),
            license_number: non_blank(&self.license_number).map(str::to_string),
            profile_data: serde_json::json!({}),
            is_verified: false,
        })
    }
}

pub async fn register(store: &dyn ProfileStore, account: &NewAccount) -> Result<User, MedsyncError> {
    account.validate()?;
    store.register(account).await
}

/// Resolve an authenticated user id into the context passed to every operation.
pub async fn resolve_user(store: &dyn ProfileStore, id: Uuid) -> Result<UserContext, MedsyncError> {
    let user = store
        .find_user(id)
        .await?
        .ok_or_else(|| MedsyncError::not_found("user", id))?;
    Ok(UserContext::from(&user))
}
