//! Role-dependent dashboards. Store read failures degrade to empty data.

use chrono::Utc;
use medsync_core::activity::Activity;
use medsync_core::models::{AppointmentView, DoctorProfile, PatientProfile, Role};
use medsync_core::{DashboardStats, UserContext};
use serde::Serialize;

use crate::state::AppState;

pub const DOCTOR_SUGGESTIONS: [&str; 4] = [
    "Consider checking blood pressure",
    "Recommend chest X-ray",
    "Suggest follow-up in 2 weeks",
    "Review current medications",
];

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dashboard {
    Patient {
        user: UserContext,
        profile: Option<PatientProfile>,
        stats: DashboardStats,
        recent_activity: Vec<Activity>,
        appointments: Vec<AppointmentView>,
    },
    Doctor {
        user: UserContext,
        profile: Option<DoctorProfile>,
        appointments: Vec<AppointmentView>,
        patient_count: usize,
        ai_suggestions: Vec<String>,
    },
}

pub async fn build(state: &AppState, user: &UserContext) -> Dashboard {
    match user.role {
        Role::Doctor => doctor(state, user).await,
        // Admins see the patient view.
        Role::Patient | Role::Admin => patient(state, user).await,
    }
}

async fn patient(state: &AppState, user: &UserContext) -> Dashboard {
    let appointments = match state.profiles.appointments_for_patient(user.id).await {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to load appointments");
            Vec::new()
        }
    };

    let profile = match state.profiles.patient_profile(user.id).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to load patient profile");
            None
        }
    };

    let slot = state.activity.slot(user.id).await;
    let feed = slot.lock().await;

    let settings = &state.config.dashboard;
    let stats = DashboardStats::new(settings.base_health_score, settings.active_medications)
        .with_appointments(&appointments, Utc::now())
        .with_activity(&feed);

    Dashboard::Patient {
        user: user.clone(),
        profile,
        stats,
        recent_activity: feed.recent(),
        appointments,
    }
}

async fn doctor(state: &AppState, user: &UserContext) -> Dashboard {
    let appointments = match state.profiles.appointments_for_doctor(user.id).await {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to load doctor appointments");
            Vec::new()
        }
    };

    let profile = match state.profiles.doctor_profile(user.id).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to load doctor profile");
            None
        }
    };

    let mut patients: Vec<_> = appointments.iter().map(|a| a.counterpart_id).collect();
    patients.sort();
    patients.dedup();

    Dashboard::Doctor {
        user: user.clone(),
        profile,
        patient_count: patients.len(),
        appointments,
        ai_suggestions: DOCTOR_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use medsync_core::inference::UnavailableBackend;
    use medsync_core::models::{Appointment, AppointmentStatus};
    use medsync_core::{accounts, ActivityKind, MedsyncConfig, MemoryStore, NewAccount};
    use std::sync::Arc;
    use uuid::Uuid;

    async fn setup() -> (AppState, Arc<MemoryStore>, UserContext, UserContext) {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(
            MedsyncConfig::default(),
            store.clone(),
            store.clone(),
            Arc::new(UnavailableBackend),
        );
        let patient = accounts::register(
            store.as_ref(),
            &NewAccount {
                email: "ngozi@example.com".to_string(),
                name: "Ngozi Eze".to_string(),
                role: Role::Patient,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let doctor = accounts::register(
            store.as_ref(),
            &NewAccount {
                email: "dr.ade@example.com".to_string(),
                name: "Dr. Tunde Ade".to_string(),
                role: Role::Doctor,
                specialty: Some("General Practice".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        (state, store, UserContext::from(&patient), UserContext::from(&doctor))
    }

    fn appointment(patient: Uuid, doctor: Uuid, days: i64, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: patient,
            doctor_id: doctor,
            scheduled_at: Utc::now() + Duration::days(days),
            duration_minutes: 30,
            status,
            notes: None,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_patient_dashboard_counts_appointments_and_activity() {
        let (state, store, patient, doctor) = setup().await;
        store
            .add_appointment(appointment(patient.id, doctor.id, 3, AppointmentStatus::Scheduled))
            .await;
        store
            .add_appointment(appointment(patient.id, doctor.id, -10, AppointmentStatus::Completed))
            .await;
        crate::subsystems::advice::record_activity(
            &state,
            patient.id,
            ActivityKind::SymptomCheck,
            "AI symptom analysis completed",
        )
        .await;

        match build(&state, &patient).await {
            Dashboard::Patient {
                stats,
                recent_activity,
                appointments,
                ..
            } => {
                assert_eq!(appointments.len(), 2);
                assert_eq!(appointments[0].counterpart_name, "Dr. Tunde Ade");
                assert_eq!(stats.completed_consultations, 1);
                assert_eq!(stats.upcoming_consultations, 1);
                assert!(stats.next_appointment.is_some());
                assert_eq!(recent_activity.len(), 1);
            }
            other => panic!("expected patient dashboard, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_doctor_dashboard_counts_distinct_patients() {
        let (state, store, patient, doctor) = setup().await;
        store
            .add_appointment(appointment(patient.id, doctor.id, 1, AppointmentStatus::Scheduled))
            .await;
        store
            .add_appointment(appointment(patient.id, doctor.id, 8, AppointmentStatus::Scheduled))
            .await;

        match build(&state, &doctor).await {
            Dashboard::Doctor {
                appointments,
                patient_count,
                ai_suggestions,
                profile,
                ..
            } => {
                assert_eq!(appointments.len(), 2);
                assert_eq!(appointments[0].counterpart_name, "Ngozi Eze");
                assert_eq!(patient_count, 1);
                assert_eq!(ai_suggestions.len(), DOCTOR_SUGGESTIONS.len());
                assert_eq!(profile.unwrap().specialty, "General Practice");
            }
            other => panic!("expected doctor dashboard, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_admin_gets_patient_view() {
        let (state, _, patient, _) = setup().await;
        let admin = UserContext {
            role: Role::Admin,
            ..patient
        };
        let value = serde_json::to_value(build(&state, &admin).await).unwrap();
        assert_eq!(value["kind"], "patient");
    }
}
