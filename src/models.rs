//! Data models for the clinical panel.
//!
//! This module contains the core data structures shared by the knowledge
//! base, the agent panel and the report generator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::literature::Evidence;

/// Syndromic classification of a cleft case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyndromeType {
    /// Cleft is part of a wider genetic syndrome
    Syndromic,
    /// Isolated cleft
    #[serde(alias = "non-syndromic", alias = "nonsyndromic")]
    NonSyndromic,
    /// Not yet classified, or the classifier could not decide
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for SyndromeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyndromeType::Syndromic => write!(f, "syndromic"),
            SyndromeType::NonSyndromic => write!(f, "non_syndromic"),
            SyndromeType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Confidence bucket attached to a candidate syndrome.
///
/// Variant order gives `Low < Medium < High`. Deserialization accepts any
/// value: labels are matched case-insensitively and everything else is `Low`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Low,
    Medium,
    High,
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(value.as_str().map(Confidence::from_label).unwrap_or_default())
    }
}

impl Confidence {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Confidence::High,
            "medium" => Confidence::Medium,
            _ => Confidence::Low,
        }
    }

    /// Bucket a symptom match percentage: `>70` high, `>40` medium, else low.
    pub fn from_match_percentage(percentage: f64) -> Self {
        if percentage > 70.0 {
            Confidence::High
        } else if percentage > 40.0 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "Low"),
            Confidence::Medium => write!(f, "Medium"),
            Confidence::High => write!(f, "High"),
        }
    }
}

/// A syndrome the patient may have, as named by the knowledge base or the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PossibleSyndrome {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub confidence: Confidence,
}

/// Treat an explicit `null` like a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Patient record as supplied by the caller (JSON file or CLI flags).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientInput {
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub medical_history: Option<String>,
    #[serde(default)]
    pub family_history: Option<String>,
}

impl PatientInput {
    /// Convert into a context ready for enrichment. Symptoms are trimmed and deduplicated.
    pub fn into_context(self) -> PatientContext {
        PatientContext {
            symptoms: self
                .symptoms
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            age: self.age,
            gender: self.gender,
            medical_history: self.medical_history.filter(|h| !h.trim().is_empty()),
            family_history: self.family_history.filter(|h| !h.trim().is_empty()),
            syndrome_type: SyndromeType::Unknown,
            possible_syndromes: Vec::new(),
        }
    }
}

/// Patient data as seen by the panel. Recruitment fills in the derived fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientContext {
    pub symptoms: BTreeSet<String>,
    pub age: String,
    pub gender: String,
    pub medical_history: Option<String>,
    pub family_history: Option<String>,
    /// Derived during recruitment.
    #[serde(default)]
    pub syndrome_type: SyndromeType,
    /// Derived during recruitment, best candidate first.
    #[serde(default)]
    pub possible_syndromes: Vec<PossibleSyndrome>,
}

impl PatientContext {
    /// Symptoms joined for prompt text.
    pub fn symptom_list(&self) -> String {
        self.symptoms
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Age for display, or "unknown".
    pub fn age_or_unknown(&self) -> &str {
        non_empty_or(&self.age, "unknown")
    }

    /// Gender for display, or "unknown".
    pub fn gender_or_unknown(&self) -> &str {
        non_empty_or(&self.gender, "unknown")
    }

    /// The best-ranked candidate syndrome name, if any.
    pub fn leading_syndrome(&self) -> Option<&str> {
        self.possible_syndromes.first().map(|s| s.name.as_str())
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

/// Reference record describing one syndrome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyndromeRecord {
    /// Identifier; on load this is taken from the catalog key.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub symptoms: BTreeSet<String>,
    #[serde(default)]
    pub genes: Vec<String>,
    #[serde(default)]
    pub inheritance: String,
    #[serde(default)]
    pub prevalence: String,
    #[serde(default)]
    pub references: Vec<String>,
}

/// One step of a treatment timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineStep {
    #[serde(alias = "age")]
    pub age_window: String,
    #[serde(alias = "treatment")]
    pub action: String,
}

/// Treatment guideline for a condition or syndrome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentGuideline {
    /// Identifier; on load this is taken from the catalog key.
    #[serde(default)]
    pub condition_id: String,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub timeline: Vec<TimelineStep>,
    #[serde(default)]
    pub follow_up: Vec<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

/// A syndrome candidate produced by symptom matching.
#[derive(Debug, Clone, Serialize)]
pub struct SyndromeMatch {
    pub id: String,
    pub record: SyndromeRecord,
    /// Number of input symptoms found in the syndrome's symptom set.
    pub matched_count: usize,
    /// Size of the syndrome's symptom set.
    pub total_count: usize,
    pub match_percentage: f64,
}

impl SyndromeMatch {
    pub fn confidence(&self) -> Confidence {
        Confidence::from_match_percentage(self.match_percentage)
    }

    pub fn to_possible_syndrome(&self) -> PossibleSyndrome {
        PossibleSyndrome {
            name: self.record.name.clone(),
            confidence: self.confidence(),
        }
    }
}

/// Overall status of an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Success,
    Error,
}

/// Result of one coordination cycle over the active panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationOutcome {
    pub status: AnalysisStatus,
    pub message: String,
    /// Per-agent answer keyed by agent id. Failed agents hold an error string.
    pub results: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrated_result: Option<String>,
    /// Ids whose slot holds an error string instead of an analysis.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_agents: Vec<String>,
}

impl CoordinationOutcome {
    /// Outcome for a cycle with nobody to ask.
    pub fn no_agents(message: impl Into<String>) -> Self {
        Self {
            status: AnalysisStatus::Error,
            message: message.into(),
            results: BTreeMap::new(),
            integrated_result: None,
            failed_agents: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AnalysisStatus::Success
    }
}

/// A recruited specialist, as shown in reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelMember {
    pub id: String,
    pub role: String,
    pub expertise: String,
}

/// Everything produced for one patient.
#[derive(Debug, Clone, Serialize)]
pub struct PanelAnalysis {
    pub patient: PatientContext,
    /// Knowledge-base candidates, best first.
    pub candidates: Vec<SyndromeMatch>,
    pub panel: Vec<PanelMember>,
    pub outcome: CoordinationOutcome,
    /// Literature and database records for the leading candidate.
    #[serde(skip_serializing_if = "Evidence::is_empty")]
    pub evidence: Evidence,
}

/// Metadata about the panel report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Date and time of the analysis.
    pub analysis_date: DateTime<Utc>,
    /// Model answering as the specialists.
    pub specialist_model: String,
    /// Model classifying and integrating.
    pub coordinator_model: String,
    /// Number of specialists consulted.
    pub agents_consulted: usize,
    /// Number of specialists whose call failed.
    pub agents_failed: usize,
    /// Duration of the analysis in seconds.
    pub duration_seconds: f64,
}

/// The complete panel report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub analysis: PanelAnalysis,
}
