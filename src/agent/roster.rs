//! Specialist profiles: the built-in panel and extra agents from config.

use crate::agent::specialist::{ActivationCondition, Agent};
use crate::llm::{InferenceClient, ModelSettings};
use crate::models::SyndromeType;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Role of the catch-all specialist used when classification fails.
pub const GENERAL_SPECIALIST: &str = "Cleft Lip and Palate Specialist";

/// Declarative activation rule, as written in config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionSpec {
    SymptomPresent { symptom: String },
    SyndromeType { syndrome_type: SyndromeType },
    /// At least one of `symptoms` is present.
    AnySymptom { symptoms: Vec<String> },
    /// The patient has a recorded family history.
    FamilyHistory,
}

impl From<&ConditionSpec> for ActivationCondition {
    fn from(spec: &ConditionSpec) -> Self {
        match spec {
            ConditionSpec::SymptomPresent { symptom } => ActivationCondition::symptom(symptom),
            ConditionSpec::SyndromeType { syndrome_type } => {
                ActivationCondition::SyndromeType(*syndrome_type)
            }
            ConditionSpec::AnySymptom { symptoms } => {
                let symptoms = symptoms.clone();
                ActivationCondition::custom(format!("any of {}", symptoms.join("/")), move |c| {
                    symptoms.iter().any(|s| c.symptoms.contains(s))
                })
            }
            ConditionSpec::FamilyHistory => {
                ActivationCondition::custom("family history", |c| {
                    c.family_history
                        .as_deref()
                        .map_or(false, |h| !h.trim().is_empty())
                })
            }
        }
    }
}

/// Everything needed to build one [`Agent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Registry key.
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub expertise: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Overrides the panel's specialist model.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub conditions: Vec<ConditionSpec>,
    /// A disabled profile removes any agent registered under the same id.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl AgentProfile {
    /// Build the agent, filling unset model fields from `defaults`.
    pub fn build(&self, defaults: &ModelSettings, client: Arc<dyn InferenceClient>) -> Agent {
        let settings = ModelSettings::new(
            self.model.clone().unwrap_or_else(|| defaults.model.clone()),
            self.temperature.unwrap_or(defaults.temperature),
        );

        let mut agent = Agent::new(
            self.role.clone(),
            self.expertise.clone(),
            self.description.clone(),
            settings,
            client,
        );
        if let Some(prompt) = &self.system_prompt {
            agent = agent.with_system_prompt(prompt.clone());
        }
        self.conditions
            .iter()
            .fold(agent, |agent, condition| agent.with_condition(condition.into()))
    }
}

fn syndromic() -> ConditionSpec {
    ConditionSpec::SyndromeType {
        syndrome_type: SyndromeType::Syndromic,
    }
}

fn symptom(name: &str) -> ConditionSpec {
    ConditionSpec::SymptomPresent {
        symptom: name.to_string(),
    }
}

fn specialist_prompt(intro: &str, knowledge: &[&str], focus: &str, duty: &str) -> String {
    let mut prompt = format!("{}\n\nYour expertise covers:\n", intro);
    for (i, item) in knowledge.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, item));
    }
    prompt.push_str("\nWhen answering:\n");
    prompt.push_str("1. Base the analysis and advice on this patient's specifics\n");
    prompt.push_str("2. Use precise but accessible clinical language\n");
    prompt.push_str("3. Give evidence-based treatment recommendations\n");
    prompt.push_str(&format!("4. {}\n", focus));
    prompt.push_str(&format!("\n{}\n", duty));
    prompt
}

/// The built-in five-specialist panel.
pub fn default_profiles() -> Vec<AgentProfile> {
    vec![
        AgentProfile {
            id: "cleft".to_string(),
            role: GENERAL_SPECIALIST.to_string(),
            expertise: "Cleft classification and treatment".to_string(),
            description: "Classifies, diagnoses and plans treatment for clefts, especially non-syndromic cases".to_string(),
            system_prompt: Some(specialist_prompt(
                "You are an experienced cleft lip and palate specialist focused on cleft classification, diagnosis and treatment planning.",
                &[
                    "Cleft classification (unilateral/bilateral, complete/incomplete)",
                    "Diagnostic criteria and assessment methods",
                    "Treatment of non-syndromic clefts",
                    "Timing and technique of repair surgery",
                    "Post-operative care and speech therapy",
                ],
                "Consider age, cleft type and severity, and recommend multidisciplinary care where needed",
                "Your main task is to characterise the cleft and recommend treatment for non-syndromic cases.",
            )),
            model: None,
            temperature: None,
            conditions: vec![ConditionSpec::SyndromeType {
                syndrome_type: SyndromeType::NonSyndromic,
            }],
            enabled: true,
        },
        AgentProfile {
            id: "craniofacial".to_string(),
            role: "Craniofacial Surgeon".to_string(),
            expertise: "Craniofacial anomalies and reconstruction".to_string(),
            description: "Assesses and plans surgery for craniofacial anomalies associated with clefts".to_string(),
            system_prompt: Some(specialist_prompt(
                "You are an experienced craniofacial surgeon focused on craniofacial anomalies associated with cleft lip and palate.",
                &[
                    "Classification of craniofacial malformations",
                    "Mandibular and midface hypoplasia",
                    "Distraction osteogenesis and orthognathic surgery",
                    "Staged reconstruction planning",
                    "Airway management in craniofacial syndromes",
                ],
                "Consider growth stage and functional priorities such as airway and feeding",
                "Your main task is to assess craniofacial involvement and plan surgical reconstruction.",
            )),
            model: None,
            temperature: None,
            conditions: vec![syndromic(), symptom("craniofacial_anomaly")],
            enabled: true,
        },
        AgentProfile {
            id: "genetic".to_string(),
            role: "Geneticist".to_string(),
            expertise: "Genetic syndromes and counselling".to_string(),
            description: "Identifies syndromic causes and advises on testing and recurrence risk".to_string(),
            system_prompt: Some(specialist_prompt(
                "You are an experienced clinical geneticist focused on syndromes that include cleft lip and palate.",
                &[
                    "Syndrome recognition from phenotype",
                    "Genes and inheritance patterns of cleft syndromes",
                    "Choice of genetic tests",
                    "Recurrence risk and genetic counselling",
                    "Family history interpretation",
                ],
                "Weigh family history and name the tests that would confirm or exclude each candidate",
                "Your main task is to identify the likely syndrome and advise on genetic testing and counselling.",
            )),
            model: None,
            temperature: None,
            conditions: vec![syndromic()],
            enabled: true,
        },
        AgentProfile {
            id: "otology".to_string(),
            role: "Otologist".to_string(),
            expertise: "Ear anomalies and hearing".to_string(),
            description: "Analyses and treats ear anomalies associated with clefts, especially in syndromic cases".to_string(),
            system_prompt: Some(specialist_prompt(
                "You are an experienced otologist focused on ear anomalies associated with cleft lip and palate.",
                &[
                    "Classification and diagnosis of ear malformations",
                    "Hearing assessment in cleft patients",
                    "Management of otitis media and hearing loss",
                    "Ear reconstruction techniques",
                    "Hearing rehabilitation and assistive devices",
                ],
                "Consider age, anomaly type and severity, and stress hearing protection",
                "Your main task is to analyse ear anomalies and recommend otological treatment, particularly for syndromic patients.",
            )),
            model: None,
            temperature: None,
            conditions: vec![syndromic(), symptom("ear_anomaly")],
            enabled: true,
        },
        AgentProfile {
            id: "ophthalmology".to_string(),
            role: "Ophthalmologist".to_string(),
            expertise: "Eye anomalies and vision".to_string(),
            description: "Analyses and treats eye anomalies associated with clefts, especially in syndromic cases".to_string(),
            system_prompt: Some(specialist_prompt(
                "You are an experienced ophthalmologist focused on eye anomalies associated with cleft lip and palate.",
                &[
                    "Ocular findings in cleft syndromes",
                    "High myopia and retinal detachment risk",
                    "Eyelid and orbital anomalies",
                    "Vision screening in children",
                    "Surgical and optical management",
                ],
                "Consider age and flag findings that need urgent review",
                "Your main task is to analyse eye anomalies and recommend ophthalmic follow-up, particularly for syndromic patients.",
            )),
            model: None,
            temperature: None,
            conditions: vec![syndromic(), symptom("eye_anomaly")],
            enabled: true,
        },
    ]
}
