//! The coordinator: classifies the case, names the specialists to consult
//! and merges their findings into one assessment.

use crate::llm::{ChatMessage, InferenceClient, InferenceError, ModelSettings};
use crate::models::{null_as_default, Confidence, PatientContext, PossibleSyndrome, SyndromeType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Structured answer to the classification prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default, deserialize_with = "null_as_default")]
    pub syndrome_type: SyndromeType,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default, deserialize_with = "null_as_default")]
    pub possible_syndromes: Vec<PossibleSyndrome>,
    /// Roles the coordinator wants on the panel.
    #[serde(default, deserialize_with = "null_as_default")]
    pub activated_agents: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reasoning: String,
}

impl Classification {
    /// Conservative answer used when the coordinator cannot be understood.
    pub fn fallback(roles: &[String], reason: impl Into<String>) -> Self {
        Self {
            syndrome_type: SyndromeType::Unknown,
            confidence: Confidence::Low,
            possible_syndromes: Vec::new(),
            activated_agents: roles.to_vec(),
            reasoning: reason.into(),
        }
    }
}

/// One specialist's contribution to the integration prompt.
#[derive(Debug, Clone)]
pub struct Finding<'a> {
    pub role: &'a str,
    pub expertise: &'a str,
    pub result: &'a str,
}

/// Coordinator state: its own transcript and the roles to fall back to.
pub struct Coordinator {
    settings: ModelSettings,
    client: Arc<dyn InferenceClient>,
    transcript: Vec<ChatMessage>,
    fallback_roles: Vec<String>,
}

impl Coordinator {
    pub fn new(
        settings: ModelSettings,
        client: Arc<dyn InferenceClient>,
        fallback_roles: Vec<String>,
    ) -> Self {
        Self {
            settings,
            client,
            transcript: Vec::new(),
            fallback_roles,
        }
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn reset(&mut self) {
        self.transcript.clear();
    }

    /// Classify the case. Never fails: call or parse errors yield
    /// [`Classification::fallback`].
    /// `roster` pairs each available role with its description.
    pub async fn classify(
        &mut self,
        context: &PatientContext,
        roster: &[(&str, &str)],
    ) -> Classification {
        let prompt = build_classification_prompt(context, roster);

        let response = match self.ask(prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Classification call failed: {}", e);
                return Classification::fallback(
                    &self.fallback_roles,
                    format!("Classification call failed: {}", e),
                );
            }
        };

        match parse_classification(&response) {
            Ok(classification) => {
                info!(
                    "Case classified as {} ({} confidence), coordinator named {} agents",
                    classification.syndrome_type,
                    classification.confidence,
                    classification.activated_agents.len()
                );
                classification
            }
            Err(e) => {
                warn!("Could not parse classification: {}", e);
                Classification::fallback(
                    &self.fallback_roles,
                    format!("Failed to parse classification: {}", e),
                )
            }
        }
    }

    /// Merge specialist findings into one free-text assessment.
    pub async fn integrate(
        &mut self,
        query: &str,
        findings: &[Finding<'_>],
    ) -> Result<String, InferenceError> {
        let prompt = build_integration_prompt(query, findings);
        self.ask(prompt).await
    }

    async fn ask(&mut self, prompt: String) -> Result<String, InferenceError> {
        self.transcript.push(ChatMessage::user(prompt));
        let response = self
            .client
            .complete(&self.settings, &self.transcript)
            .await?;
        self.transcript.push(ChatMessage::assistant(response.clone()));
        Ok(response)
    }
}

/// Prompt asking for syndrome classification and panel selection.
pub fn build_classification_prompt(context: &PatientContext, roster: &[(&str, &str)]) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "As a cleft lip and palate diagnostic specialist, analyse the patient below and decide \
         whether the cleft is syndromic or non-syndromic.\n\n",
    );
    prompt.push_str(&format!("Symptoms: {}\n", context.symptom_list()));
    prompt.push_str(&format!("Age: {}\n", context.age_or_unknown()));
    prompt.push_str(&format!("Gender: {}\n", context.gender_or_unknown()));
    prompt.push_str(&format!(
        "Medical history: {}\n",
        context.medical_history.as_deref().unwrap_or("none")
    ));
    prompt.push_str(&format!(
        "Family history: {}\n",
        context.family_history.as_deref().unwrap_or("none")
    ));

    if !context.possible_syndromes.is_empty() {
        prompt.push_str("\nKnowledge base candidates:\n");
        for candidate in &context.possible_syndromes {
            prompt.push_str(&format!(
                "- {} ({} confidence)\n",
                candidate.name, candidate.confidence
            ));
        }
    }

    prompt.push_str("\nAnswer the following:\n");
    prompt.push_str("1. Is this syndromic or non-syndromic? Give your reasoning.\n");
    prompt.push_str(
        "2. If syndromic, list up to three likely syndromes with a confidence of high, medium or low.\n",
    );
    prompt.push_str("3. Which specialists should be consulted? Choose roles from:\n");
    for (role, description) in roster {
        if description.is_empty() {
            prompt.push_str(&format!("   - {}\n", role));
        } else {
            prompt.push_str(&format!("   - {}: {}\n", role, description));
        }
    }
    prompt.push('\n');
    prompt.push_str("Respond with a single JSON object with these fields:\n");
    prompt.push_str(
        r#"{"syndrome_type": "syndromic" | "non_syndromic", "confidence": "high" | "medium" | "low", "possible_syndromes": [{"name": "...", "confidence": "high"}], "activated_agents": ["..."], "reasoning": "..."}"#,
    );
    prompt.push('\n');
    prompt
}

/// Parse the coordinator's classification, tolerating code fences and
/// surrounding prose.
pub fn parse_classification(response: &str) -> Result<Classification, serde_json::Error> {
    let json = extract_json(response);
    debug!("Parsing classification JSON ({} bytes)", json.len());
    serde_json::from_str(json)
}

fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let body = &trimmed[start + "```json".len()..];
        let end = body.find("```").unwrap_or(body.len());
        return body[..end].trim();
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Prompt asking the coordinator to merge the panel's findings.
pub fn build_integration_prompt(query: &str, findings: &[Finding<'_>]) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "As coordinator of a multi-specialist cleft lip and palate panel, integrate the \
         specialist analyses below into a final diagnosis and treatment recommendation.\n\n",
    );
    prompt.push_str("Original query:\n");
    prompt.push_str(query.trim());
    prompt.push_str("\n\nSpecialist analyses:\n");

    for finding in findings {
        prompt.push_str(&format!(
            "\n### {} ({})\n{}\n",
            finding.role, finding.expertise, finding.result
        ));
    }

    prompt.push_str("\nPlease provide:\n");
    prompt.push_str("1. Final diagnosis (syndromic/non-syndromic, specific syndrome)\n");
    prompt.push_str("2. Confidence and supporting evidence\n");
    prompt.push_str("3. Treatment recommendations\n");
    prompt.push_str("4. Further investigations\n\n");
    prompt.push_str("Structure the answer so a clinician can use it directly.\n");
    prompt
}
