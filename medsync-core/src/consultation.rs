//! Live consultation state per user.
//!
//! ```text
//! Idle ──start──▶ Active ──end──▶ Ended
//!                   ▲               │
//!                   └─────start─────┘
//! ```
//!
//! Messages are only accepted while an AI-mode consultation is active.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const AI_WELCOME: &str = "Hello! I'm Dr. MedSync AI, your virtual physician. I'm here to help you with your health concerns. Please tell me what's bothering you today, and I'll provide you with a comprehensive assessment and treatment recommendations.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationMode {
    Human,
    Ai,
}

impl ConsultationMode {
    pub fn label(&self) -> &'static str {
        match self {
            ConsultationMode::Human => "Human",
            ConsultationMode::Ai => "AI",
        }
    }

    /// Activity feed line for a consultation start.
    pub fn started_description(&self) -> String {
        format!("{} doctor consultation started", self.label())
    }
}

impl fmt::Display for ConsultationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsultationMode::Human => f.write_str("human"),
            ConsultationMode::Ai => f.write_str("ai"),
        }
    }
}

impl FromStr for ConsultationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(ConsultationMode::Human),
            "ai" => Ok(ConsultationMode::Ai),
            other => Err(format!("unknown consultation mode: {}", other)),
        }
    }
}

pub const ENDED_DESCRIPTION: &str = "Consultation ended";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Patient,
    Doctor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveConsultation {
    pub mode: ConsultationMode,
    pub started_at: DateTime<Utc>,
    pub transcript: Vec<TranscriptEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConsultationState {
    #[default]
    Idle,
    Active(ActiveConsultation),
    Ended {
        mode: ConsultationMode,
        duration_secs: i64,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConsultationError {
    #[error("A consultation is already in progress")]
    AlreadyActive,

    #[error("No consultation is in progress")]
    NotActive,

    #[error("Messages are only accepted during an AI consultation")]
    NotAiMode,

    #[error("Message is empty")]
    EmptyMessage,
}

impl ConsultationState {
    pub fn is_active(&self) -> bool {
        matches!(self, ConsultationState::Active(_))
    }

    pub fn start(
        &mut self,
        mode: ConsultationMode,
        now: DateTime<Utc>,
    ) -> Result<&ActiveConsultation, ConsultationError> {
        if self.is_active() {
            return Err(ConsultationError::AlreadyActive);
        }

        let mut transcript = Vec::new();
        if mode == ConsultationMode::Ai {
            transcript.push(TranscriptEntry {
                speaker: Speaker::Doctor,
                message: AI_WELCOME.to_string(),
                at: now,
            });
        }

        *self = ConsultationState::Active(ActiveConsultation {
            mode,
            started_at: now,
            transcript,
        });

        match self {
            ConsultationState::Active(active) => Ok(active),
            _ => Err(ConsultationError::NotActive),
        }
    }

    fn active_ai_mut(&mut self) -> Result<&mut ActiveConsultation, ConsultationError> {
        match self {
            ConsultationState::Active(active) if active.mode == ConsultationMode::Ai => Ok(active),
            ConsultationState::Active(_) => Err(ConsultationError::NotAiMode),
            _ => Err(ConsultationError::NotActive),
        }
    }

    /// Append the patient's message to an AI consultation.
    pub fn record_patient(&mut self, message: &str, now: DateTime<Utc>) -> Result<(), ConsultationError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ConsultationError::EmptyMessage);
        }
        let active = self.active_ai_mut()?;
        active.transcript.push(TranscriptEntry {
            speaker: Speaker::Patient,
            message: message.to_string(),
            at: now,
        });
        Ok(())
    }

    /// Take back the patient message recorded at `at` when it is still the last
    /// transcript entry. Returns whether anything was removed.
    pub fn discard_patient_turn(&mut self, at: DateTime<Utc>) -> bool {
        let ConsultationState::Active(active) = self else {
            return false;
        };
        match active.transcript.last() {
            Some(entry) if entry.speaker == Speaker::Patient && entry.at == at => {
                active.transcript.pop();
                true
            }
            _ => false,
        }
    }

    /// Append the AI doctor's reply. Fails if the consultation ended meanwhile.
    pub fn record_doctor(&mut self, message: &str, now: DateTime<Utc>) -> Result<(), ConsultationError> {
        let active = self.active_ai_mut()?;
        active.transcript.push(TranscriptEntry {
            speaker: Speaker::Doctor,
            message: message.to_string(),
            at: now,
        });
        Ok(())
    }

    /// End the consultation, discarding its transcript. Returns the duration in seconds.
    pub fn end(&mut self, now: DateTime<Utc>) -> Result<i64, ConsultationError> {
        let (mode, started_at) = match self {
            ConsultationState::Active(active) => (active.mode, active.started_at),
            _ => return Err(ConsultationError::NotActive),
        };
        let duration_secs = (now - started_at).num_seconds().max(0);
        *self = ConsultationState::Ended { mode, duration_secs };
        Ok(duration_secs)
    }

    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        match self {
            ConsultationState::Active(active) => Some((now - active.started_at).num_seconds().max(0)),
            _ => None,
        }
    }
}

/// `MM:SS`, minutes not wrapped at the hour.
pub fn format_elapsed(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_ai_consultation_opens_with_welcome() {
        let mut state = ConsultationState::default();
        let active = state.start(ConsultationMode::Ai, Utc::now()).unwrap();
        assert_eq!(active.transcript.len(), 1);
        assert_eq!(active.transcript[0].speaker, Speaker::Doctor);
        assert_eq!(active.transcript[0].message, AI_WELCOME);
    }

    #[test]
    fn test_human_consultation_has_empty_transcript_and_rejects_messages() {
        let mut state = ConsultationState::default();
        let active = state.start(ConsultationMode::Human, Utc::now()).unwrap();
        assert!(active.transcript.is_empty());
        assert_eq!(
            state.record_patient("hello", Utc::now()),
            Err(ConsultationError::NotAiMode)
        );
    }

    #[test]
    fn test_discard_patient_turn_only_removes_matching_tail() {
        let mut state = ConsultationState::default();
        state.start(ConsultationMode::Ai, Utc::now()).unwrap();

        let at = Utc::now();
        state.record_patient("I have chest pain", at).unwrap();
        assert!(!state.discard_patient_turn(at + Duration::seconds(1)));
        assert!(state.discard_patient_turn(at));
        assert!(!state.discard_patient_turn(at));

        let ConsultationState::Active(active) = &state else {
            panic!("consultation should still be active");
        };
        assert_eq!(active.transcript.len(), 1);
        assert_eq!(active.transcript[0].speaker, Speaker::Doctor);

        state.end(Utc::now()).unwrap();
        assert!(!state.discard_patient_turn(at));
    }

    #[test]
    fn test_transitions() {
        let mut state = ConsultationState::default();
        assert_eq!(state.end(Utc::now()), Err(ConsultationError::NotActive));

        let start = Utc::now();
        state.start(ConsultationMode::Ai, start).unwrap();
        assert_eq!(
            state.start(ConsultationMode::Human, start).err(),
            Some(ConsultationError::AlreadyActive)
        );

        state.record_patient("I feel dizzy", start).unwrap();
        state.record_doctor("How long has this lasted?", start).unwrap();

        let duration = state.end(start + Duration::seconds(125)).unwrap();
        assert_eq!(duration, 125);
        assert_eq!(
            state,
            ConsultationState::Ended {
                mode: ConsultationMode::Ai,
                duration_secs: 125
            }
        );
        assert_eq!(state.record_doctor("late reply", Utc::now()), Err(ConsultationError::NotActive));

        // A new consultation can follow an ended one.
        assert!(state.start(ConsultationMode::Human, Utc::now()).is_ok());
    }

    #[test]
    fn test_empty_message_rejected() {
        let mut state = ConsultationState::default();
        state.start(ConsultationMode::Ai, Utc::now()).unwrap();
        assert_eq!(state.record_patient("   ", Utc::now()), Err(ConsultationError::EmptyMessage));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(65), "01:05");
        assert_eq!(format_elapsed(3600), "60:00");
    }

    #[test]
    fn test_mode_descriptions() {
        assert_eq!(ConsultationMode::Ai.started_description(), "AI doctor consultation started");
        assert_eq!(ConsultationMode::Human.started_description(), "Human doctor consultation started");
        assert_eq!("ai".parse::<ConsultationMode>(), Ok(ConsultationMode::Ai));
    }
}
