//! Prompt templates for every AI feature.
//!
//! Each [`Feature`] owns a fixed system persona, a user-message template that
//! names the headings the answer must use, model parameters, and the fallback
//! text shown when the inference call fails. Everything here is pure.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::activity::ActivityKind;
use crate::models::AgentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    SymptomAnalysis,
    ImageAnalysis,
    MedicationCheck,
    TermExplanation,
    HealthCoaching,
    ReportSummary,
    Consultation,
    Translation,
}

/// Sampling parameters sent with a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Feature {
    pub const ALL: [Feature; 8] = [
        Feature::SymptomAnalysis,
        Feature::ImageAnalysis,
        Feature::MedicationCheck,
        Feature::TermExplanation,
        Feature::HealthCoaching,
        Feature::ReportSummary,
        Feature::Consultation,
        Feature::Translation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::SymptomAnalysis => "symptom_analysis",
            Feature::ImageAnalysis => "image_analysis",
            Feature::MedicationCheck => "medication_check",
            Feature::TermExplanation => "term_explanation",
            Feature::HealthCoaching => "health_coaching",
            Feature::ReportSummary => "report_summary",
            Feature::Consultation => "consultation",
            Feature::Translation => "translation",
        }
    }

    pub fn agent_type(&self) -> AgentType {
        match self {
            Feature::SymptomAnalysis => AgentType::SymptomChecker,
            Feature::ImageAnalysis => AgentType::PhotoDiagnosis,
            Feature::MedicationCheck => AgentType::MedicationCheck,
            Feature::TermExplanation => AgentType::TermExplanation,
            Feature::HealthCoaching => AgentType::HealthCoach,
            Feature::ReportSummary => AgentType::ReportSummary,
            Feature::Consultation => AgentType::Consultation,
            Feature::Translation => AgentType::Translation,
        }
    }

    pub fn params(&self) -> ModelParams {
        let (temperature, max_tokens) = match self {
            Feature::SymptomAnalysis => (0.3, 1500),
            Feature::ImageAnalysis => (0.3, 1200),
            Feature::MedicationCheck => (0.3, 1200),
            Feature::TermExplanation => (0.3, 1000),
            Feature::HealthCoaching => (0.4, 1500),
            Feature::ReportSummary => (0.3, 1500),
            Feature::Consultation => (0.4, 1200),
            Feature::Translation => (0.3, 512),
        };
        ModelParams {
            temperature,
            max_tokens,
        }
    }

    /// Text returned instead of a completion when inference fails.
    pub fn fallback(&self) -> &'static str {
        match self {
            Feature::SymptomAnalysis => "I'm currently experiencing connectivity issues. Please try again in a moment. For immediate medical concerns, please consult a healthcare professional.",
            Feature::ImageAnalysis => "Image analysis is temporarily unavailable. Please try again later or consult with a healthcare professional for proper medical image evaluation.",
            Feature::MedicationCheck => "Medication information is temporarily unavailable. Please consult your pharmacist or healthcare provider for accurate medication guidance.",
            Feature::TermExplanation => "Medical term explanation is temporarily unavailable. Please try again later or consult medical resources.",
            Feature::HealthCoaching => "Health coaching is temporarily unavailable. Please try again later. In the meantime, focus on basic healthy habits like regular exercise, balanced nutrition, and adequate sleep.",
            Feature::ReportSummary => "Health report generation is temporarily unavailable. Please try again later or consult with your healthcare provider for a comprehensive health assessment.",
            Feature::Consultation => "I'm experiencing connectivity issues. For immediate medical concerns, please contact emergency services or visit your nearest healthcare facility.",
            Feature::Translation => "Translation is temporarily unavailable. Please try again later or ask a qualified medical interpreter.",
        }
    }

    /// Whether the answer is expected under the six symptom headings.
    pub fn has_sections(&self) -> bool {
        matches!(self, Feature::SymptomAnalysis)
    }

    /// Whether the feature can run without free-text input (it works from context).
    pub fn requires_input(&self) -> bool {
        !matches!(self, Feature::ReportSummary)
    }

    /// Dashboard activity recorded after the feature runs. Consultation turns
    /// are not recorded individually; starting and ending one is.
    pub fn activity(&self) -> Option<(ActivityKind, &'static str)> {
        let entry = match self {
            Feature::SymptomAnalysis => (ActivityKind::SymptomCheck, "AI symptom analysis completed"),
            Feature::ImageAnalysis => (ActivityKind::PhotoDiagnosis, "Medical image analyzed with AI"),
            Feature::MedicationCheck => {
                (ActivityKind::MedicationCheck, "Medication interaction check completed")
            }
            Feature::TermExplanation => (ActivityKind::TermExplanation, "Medical term explained"),
            Feature::HealthCoaching => {
                (ActivityKind::HealthCoaching, "Personalized health plan generated")
            }
            Feature::ReportSummary => (ActivityKind::ReportSummary, "Health report summary generated"),
            Feature::Translation => (ActivityKind::Translation, "Medical text translated"),
            Feature::Consultation => return None,
        };
        Some(entry)
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            Feature::SymptomAnalysis => "You are Dr. MedSync, an expert AI medical assistant. Analyze symptoms and provide comprehensive medical insights in a structured format. Use clear headings and bullet points. Avoid using asterisks (**) in your response. Always recommend consulting healthcare professionals for serious concerns.",
            Feature::ImageAnalysis => "You are Dr. MedSync, a medical imaging specialist AI. Analyze medical images based on descriptions and computer vision annotations. Provide detailed insights about detected anomalies and body parts. Use clear formatting without asterisks.",
            Feature::MedicationCheck => "You are Dr. MedSync, a pharmaceutical specialist AI. Provide comprehensive medication information including interactions, dosages, and safety guidelines. Use clear formatting without asterisks.",
            Feature::TermExplanation => "You are Dr. MedSync, a medical education specialist. Explain medical terms in simple, understandable language with practical examples. Use clear formatting without asterisks.",
            Feature::HealthCoaching => "You are Dr. MedSync, a certified health coach and wellness expert. Create personalized health plans with specific, actionable recommendations. Use clear formatting without asterisks. Provide practical, evidence-based advice.",
            Feature::ReportSummary => "You are Dr. MedSync, a medical report specialist. Generate comprehensive health summaries from medical data with clear insights and recommendations. Use clear formatting without asterisks.",
            Feature::Consultation => CONSULTATION_SYSTEM,
            Feature::Translation => "You are Dr. MedSync, a certified medical translator. Translate medical text faithfully, keeping drug names, dosages and units unchanged. Use clear formatting without asterisks. Only provide the translation.",
        }
    }

    /// Section headings the user message asks for, in order.
    pub fn headings(&self) -> &'static [&'static str] {
        match self {
            Feature::SymptomAnalysis => &[
                "Likely Condition",
                "Natural Remedies",
                "Healing Foods & Diet",
                "Recommended Medications",
                "How to Take Treatment",
                "Important Warning",
            ],
            Feature::ImageAnalysis => &[
                "Body Part Identification",
                "Detected Anomalies",
                "Clinical Observations",
                "Recommended Actions",
                "Important Disclaimers",
            ],
            Feature::MedicationCheck => &[
                "Medication Overview",
                "Common Uses",
                "Dosage Guidelines",
                "Potential Side Effects",
                "Drug Interactions",
                "Safety Precautions",
                "When to Consult Doctor",
            ],
            Feature::TermExplanation => &[
                "Simple Definition",
                "What It Means for Patients",
                "Common Causes",
                "Related Symptoms",
                "When to Be Concerned",
                "Practical Examples",
            ],
            Feature::HealthCoaching => &[
                "Personalized Health Assessment",
                "Daily Action Plan",
                "Nutrition Recommendations",
                "Exercise Guidelines",
                "Lifestyle Modifications",
                "Progress Tracking Tips",
                "Motivational Strategies",
                "Weekly Milestones",
            ],
            Feature::ReportSummary => &[
                "Overall Health Assessment",
                "Vital Signs Analysis",
                "Risk Factors Identified",
                "Health Trends",
                "Recommendations",
                "Follow-up Actions",
                "Lifestyle Suggestions",
                "When to Seek Medical Care",
            ],
            Feature::Consultation => &[
                "Empathetic acknowledgment",
                "Relevant questions or assessment",
                "Preliminary diagnosis/classification",
                "Specific treatment recommendations",
                "Prevention advice",
                "When to seek immediate care",
            ],
            Feature::Translation => &[],
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown feature: {}", s))
    }
}

const CONSULTATION_SYSTEM: &str = "You are Dr. MedSync AI, a General Physician AI Doctor conducting a live voice consultation with a patient.

Your role:
- Listen to patient concerns with empathy
- Ask relevant follow-up questions
- Classify ailments accurately
- Explain causes and prevention
- Recommend specific treatments including:
  * Healing foods (specific fruits, vegetables with quantities)
  * Exercises (with clear step-by-step instructions)
  * Medications (with exact dosage, frequency, and interaction warnings)
- Provide voice-friendly responses
- Use clear, conversational language without asterisks
- Give practical, real-world examples
- Consider medication interactions and contraindications

Always prioritize patient safety and recommend professional medical care when needed.";

/// Feature input. `text` is the user's free text; the rest is optional context.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PromptInput {
    #[serde(default)]
    pub text: String,
    /// Profile, medical history or vitals, rendered as JSON.
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub target_language: Option<String>,
    /// Computer-vision annotation summary for image analysis.
    #[serde(default)]
    pub annotations: Option<String>,
}

impl PromptInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

fn context_json(context: &Option<serde_json::Value>) -> String {
    context
        .as_ref()
        .and_then(|v| serde_json::to_string(v).ok())
        .unwrap_or_else(|| "{}".to_string())
}

fn bullet_list(headings: &[&str]) -> String {
    headings
        .iter()
        .map(|h| format!("- {}", h))
        .collect::<Vec<_>>()
        .join("\n")
}

fn numbered_list(headings: &[&str]) -> String {
    headings
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{}. {}", i + 1, h))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(feature: Feature, input: &PromptInput) -> Prompt {
    let text = input.text.trim();
    let headings = feature.headings();

    let user = match feature {
        Feature::SymptomAnalysis => format!(
            "Please analyze these symptoms and provide a comprehensive medical assessment: {}\n\nFormat your response with clear sections:\n{}",
            text,
            bullet_list(headings)
        ),
        Feature::ImageAnalysis => format!(
            "Analyze this medical image:\n\nImage Description: {}\nComputer Vision Annotations: {}\n\nPlease provide:\n{}\n\nRemember: This is preliminary analysis only. Professional medical evaluation is essential.",
            text,
            input.annotations.as_deref().unwrap_or("").trim(),
            numbered_list(headings)
        ),
        Feature::MedicationCheck => format!(
            "Provide detailed information about this medication: {}\n\nInclude:\n{}",
            text,
            bullet_list(headings)
        ),
        Feature::TermExplanation => format!(
            "Please explain this medical term in simple language: {}\n\nInclude:\n{}",
            text,
            bullet_list(headings)
        ),
        Feature::HealthCoaching => format!(
            "Create a personalized health coaching plan for these goals: {}\n\nUser Profile: {}\n\nPlease provide:\n{}\n\nMake recommendations specific and actionable with real-world examples.",
            text,
            context_json(&input.context),
            bullet_list(headings)
        ),
        Feature::ReportSummary => format!(
            "Generate a comprehensive health report summary from this data: {}\n\nInclude:\n{}",
            context_json(&input.context),
            bullet_list(headings)
        ),
        Feature::Consultation => format!(
            "Patient says: \"{}\"\n\nMedical History: {}\n\nPlease respond as an AI doctor conducting a live consultation. Provide:\n{}\n\nProvide real-world, practical examples and be specific about quantities, timing, and precautions.",
            text,
            context_json(&input.context),
            numbered_list(headings)
        ),
        Feature::Translation => format!(
            "Translate the following medical text to {}. Only provide the translation:\n\n{}",
            input
                .target_language
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .unwrap_or("English"),
            text
        ),
    };

    Prompt {
        system: feature.system_prompt().to_string(),
        user,
    }
}
