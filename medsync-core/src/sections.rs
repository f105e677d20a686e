//! Section parser for free-text symptom analyses.
//!
//! The model is asked to answer under a fixed set of headings. This module
//! walks the completion line by line and files every non-heading line under
//! the most recent heading it recognised:
//!
//! ```text
//! NONE ──"likely condition"/"diagnosis"──▶ CONDITION
//!      ──"natural remedies"/…───────────▶ REMEDIES   (any state → any state,
//!      ──"healing foods"/"diet"─────────▶ FOODS       only on heading lines)
//!      ── …
//! ```
//!
//! Heading detection is plain lower-case substring containment, checked in a
//! fixed order; the first matching row of [`SECTION_KEYWORDS`] wins.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKey {
    Condition,
    Remedies,
    Foods,
    Medications,
    Treatment,
    Warning,
}

impl SectionKey {
    pub const ALL: [SectionKey; 6] = [
        SectionKey::Condition,
        SectionKey::Remedies,
        SectionKey::Foods,
        SectionKey::Medications,
        SectionKey::Treatment,
        SectionKey::Warning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKey::Condition => "condition",
            SectionKey::Remedies => "remedies",
            SectionKey::Foods => "foods",
            SectionKey::Medications => "medications",
            SectionKey::Treatment => "treatment",
            SectionKey::Warning => "warning",
        }
    }

    /// Heading shown above the section.
    pub fn title(&self) -> &'static str {
        match self {
            SectionKey::Condition => "Likely Condition",
            SectionKey::Remedies => "Natural Remedies",
            SectionKey::Foods => "Healing Foods & Diet",
            SectionKey::Medications => "Recommended Medications",
            SectionKey::Treatment => "How to Take Treatment",
            SectionKey::Warning => "Important Warning",
        }
    }

    /// Text shown in place of an empty section.
    pub fn placeholder(&self) -> &'static str {
        match self {
            SectionKey::Condition => "Condition not specified",
            SectionKey::Remedies => "Natural remedies not specified",
            SectionKey::Foods => "Dietary recommendations not specified",
            SectionKey::Medications => "Medications not specified",
            SectionKey::Treatment => "Treatment instructions not specified",
            SectionKey::Warning => {
                "Always consult healthcare professionals for proper diagnosis and treatment."
            }
        }
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heading cues, in precedence order. Keywords are lower-case.
pub const SECTION_KEYWORDS: [(SectionKey, [&str; 2]); 6] = [
    (SectionKey::Condition, ["likely condition", "diagnosis"]),
    (SectionKey::Remedies, ["natural remedies", "natural treatment"]),
    (SectionKey::Foods, ["healing foods", "diet"]),
    (SectionKey::Medications, ["recommended medications", "medication"]),
    (SectionKey::Treatment, ["how to take", "treatment"]),
    (SectionKey::Warning, ["warning", "important"]),
];

/// A completion split into its six sections. Each field holds the section's
/// lines, trimmed and newline-terminated; absent sections are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSections {
    pub condition: String,
    pub remedies: String,
    pub foods: String,
    pub medications: String,
    pub treatment: String,
    pub warning: String,
}

impl ParsedSections {
    pub fn get(&self, key: SectionKey) -> &str {
        match key {
            SectionKey::Condition => &self.condition,
            SectionKey::Remedies => &self.remedies,
            SectionKey::Foods => &self.foods,
            SectionKey::Medications => &self.medications,
            SectionKey::Treatment => &self.treatment,
            SectionKey::Warning => &self.warning,
        }
    }

    fn get_mut(&mut self, key: SectionKey) -> &mut String {
        match key {
            SectionKey::Condition => &mut self.condition,
            SectionKey::Remedies => &mut self.remedies,
            SectionKey::Foods => &mut self.foods,
            SectionKey::Medications => &mut self.medications,
            SectionKey::Treatment => &mut self.treatment,
            SectionKey::Warning => &mut self.warning,
        }
    }

    /// Section text, or its placeholder when the model left it out.
    pub fn display(&self, key: SectionKey) -> &str {
        let text = self.get(key);
        if text.is_empty() {
            key.placeholder()
        } else {
            text
        }
    }

    pub fn is_empty(&self) -> bool {
        SectionKey::ALL.iter().all(|k| self.get(*k).is_empty())
    }
}

/// Classify a single trimmed line as a heading, if it contains any cue.
pub fn classify_heading(line: &str) -> Option<SectionKey> {
    let lower = line.to_lowercase();
    SECTION_KEYWORDS
        .iter()
        .find(|(_, cues)| cues.iter().any(|cue| lower.contains(cue)))
        .map(|(key, _)| *key)
}

pub fn parse_sections(text: &str) -> ParsedSections {
    let mut sections = ParsedSections::default();
    let mut cursor: Option<SectionKey> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(key) = classify_heading(trimmed) {
            cursor = Some(key);
            continue;
        }

        if let Some(key) = cursor {
            let body = sections.get_mut(key);
            body.push_str(trimmed);
            body.push('\n');
        }
    }

    sections
}
