//! Recent-activity feed and dashboard statistics.
//!
//! The feed is per user, in memory only, and keeps the five newest entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::models::{AppointmentStatus, AppointmentView};

pub const ACTIVITY_CAPACITY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    SymptomCheck,
    MedicationCheck,
    TermExplanation,
    HealthCoaching,
    PhotoDiagnosis,
    ReportSummary,
    Translation,
    Consultation,
    Purchase,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: Uuid,
    pub kind: ActivityKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityFeed {
    entries: VecDeque<Activity>,
    recorded: u32,
}

impl ActivityFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new entry to the front, evicting the oldest beyond capacity.
    pub fn record(&mut self, kind: ActivityKind, description: impl Into<String>) -> &Activity {
        self.entries.push_front(Activity {
            id: Uuid::new_v4(),
            kind,
            description: description.into(),
            timestamp: Utc::now(),
        });
        self.entries.truncate(ACTIVITY_CAPACITY);
        self.recorded = self.recorded.saturating_add(1);
        &self.entries[0]
    }

    /// Newest first.
    pub fn recent(&self) -> Vec<Activity> {
        self.entries.iter().cloned().collect()
    }

    /// Total entries ever recorded, including evicted ones.
    pub fn recorded(&self) -> u32 {
        self.recorded
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Overview cards for the patient dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardStats {
    pub total_consultations: u32,
    pub completed_consultations: u32,
    pub upcoming_consultations: u32,
    pub health_score: u8,
    pub active_medications: u32,
    pub next_appointment: Option<DateTime<Utc>>,
}

impl DashboardStats {
    pub fn new(base_health_score: u8, active_medications: u32) -> Self {
        Self {
            total_consultations: 0,
            completed_consultations: 0,
            upcoming_consultations: 0,
            health_score: base_health_score.min(100),
            active_medications,
            next_appointment: None,
        }
    }

    /// Count appointments by status and pick the earliest scheduled one still ahead.
    pub fn with_appointments(mut self, appointments: &[AppointmentView], now: DateTime<Utc>) -> Self {
        self.total_consultations = appointments.len() as u32;
        self.completed_consultations = appointments
            .iter()
            .filter(|a| a.status == AppointmentStatus::Completed)
            .count() as u32;
        self.upcoming_consultations = appointments
            .iter()
            .filter(|a| a.status == AppointmentStatus::Scheduled)
            .count() as u32;
        self.next_appointment = appointments
            .iter()
            .filter(|a| a.status == AppointmentStatus::Scheduled && a.scheduled_at >= now)
            .map(|a| a.scheduled_at)
            .min();
        self
    }

    /// Each recorded activity counts as a consultation and adds a point of
    /// health score, capped at 100.
    pub fn with_activity(mut self, feed: &ActivityFeed) -> Self {
        self.total_consultations = self.total_consultations.saturating_add(feed.recorded());
        let score = u32::from(self.health_score).saturating_add(feed.recorded());
        self.health_score = score.min(100) as u8;
        self
    }
}
