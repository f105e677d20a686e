use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which AI feature (or marketplace action) produced a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    SymptomChecker,
    HealthCoach,
    Translation,
    MedicationCheck,
    TermExplanation,
    PhotoDiagnosis,
    Consultation,
    ReportSummary,
    Purchase,
}

impl AgentType {
    pub const ALL: [AgentType; 9] = [
        AgentType::SymptomChecker,
        AgentType::HealthCoach,
        AgentType::Translation,
        AgentType::MedicationCheck,
        AgentType::TermExplanation,
        AgentType::PhotoDiagnosis,
        AgentType::Consultation,
        AgentType::ReportSummary,
        AgentType::Purchase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::SymptomChecker => "symptom_checker",
            AgentType::HealthCoach => "health_coach",
            AgentType::Translation => "translation",
            AgentType::MedicationCheck => "medication_check",
            AgentType::TermExplanation => "term_explanation",
            AgentType::PhotoDiagnosis => "photo_diagnosis",
            AgentType::Consultation => "consultation",
            AgentType::ReportSummary => "report_summary",
            AgentType::Purchase => "purchase",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentType::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown agent type: {}", s))
    }
}

/// One ledger entry in `agent_sessions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub agent_type: AgentType,
    pub input_text: String,
    pub output_text: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl Session {
    pub fn open(user_id: Uuid, agent_type: AgentType, input_text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            agent_type,
            input_text: input_text.to_string(),
            output_text: String::new(),
            started_at: Utc::now(),
            ended_at: None,
            metadata: serde_json::json!({}),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.ended_at.is_some()
    }

    /// True when the inference behind this entry failed and a fallback was stored.
    pub fn is_error(&self) -> bool {
        self.metadata.get("error").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_type_round_trips_through_str() {
        for agent in AgentType::ALL {
            assert_eq!(agent.as_str().parse::<AgentType>().unwrap(), agent);
        }
        assert!("wizard".parse::<AgentType>().is_err());
    }

    #[test]
    fn test_agent_type_serde_matches_column_value() {
        let json = serde_json::to_string(&AgentType::SymptomChecker).unwrap();
        assert_eq!(json, "\"symptom_checker\"");
    }

    #[test]
    fn test_open_session_has_no_output() {
        let s = Session::open(Uuid::new_v4(), AgentType::Translation, "hola");
        assert!(s.output_text.is_empty());
        assert!(!s.is_closed());
        assert!(!s.is_error());
    }
}
