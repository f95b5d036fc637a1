//! A single specialist agent and the rules deciding when it takes part.

use crate::llm::{ChatMessage, InferenceClient, InferenceError, ModelSettings};
use crate::models::{PatientContext, SyndromeType};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type Predicate = Arc<dyn Fn(&PatientContext) -> bool + Send + Sync>;

/// A rule over the patient context. An agent activates only when all of its
/// conditions hold.
#[derive(Clone)]
pub enum ActivationCondition {
    /// The named symptom is among the patient's symptoms.
    SymptomPresent(String),
    /// The case was classified as the given type.
    SyndromeType(SyndromeType),
    /// Arbitrary predicate, labelled for logs.
    Custom { label: String, predicate: Predicate },
}

impl ActivationCondition {
    pub fn symptom(symptom: impl Into<String>) -> Self {
        ActivationCondition::SymptomPresent(symptom.into())
    }

    pub fn custom<F>(label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&PatientContext) -> bool + Send + Sync + 'static,
    {
        ActivationCondition::Custom {
            label: label.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn is_satisfied(&self, context: &PatientContext) -> bool {
        match self {
            ActivationCondition::SymptomPresent(symptom) => context.symptoms.contains(symptom),
            ActivationCondition::SyndromeType(expected) => context.syndrome_type == *expected,
            ActivationCondition::Custom { predicate, .. } => predicate(context),
        }
    }
}

impl fmt::Debug for ActivationCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationCondition::SymptomPresent(s) => write!(f, "SymptomPresent({})", s),
            ActivationCondition::SyndromeType(t) => write!(f, "SyndromeType({})", t),
            ActivationCondition::Custom { label, .. } => write!(f, "Custom({})", label),
        }
    }
}

/// One specialist on the panel.
pub struct Agent {
    role: String,
    expertise: String,
    description: String,
    settings: ModelSettings,
    system_prompt: Option<String>,
    transcript: Vec<ChatMessage>,
    conditions: Vec<ActivationCondition>,
    client: Arc<dyn InferenceClient>,
}

impl Agent {
    pub fn new(
        role: impl Into<String>,
        expertise: impl Into<String>,
        description: impl Into<String>,
        settings: ModelSettings,
        client: Arc<dyn InferenceClient>,
    ) -> Self {
        Self {
            role: role.into(),
            expertise: expertise.into(),
            description: description.into(),
            settings,
            system_prompt: None,
            transcript: Vec::new(),
            conditions: Vec::new(),
            client,
        }
    }

    /// Seed the transcript with a system prompt. It survives [`Agent::reset_transcript`].
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self.reset_transcript();
        self
    }

    pub fn with_condition(mut self, condition: ActivationCondition) -> Self {
        self.add_activation_condition(condition);
        self
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn expertise(&self) -> &str {
        &self.expertise
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn conditions(&self) -> &[ActivationCondition] {
        &self.conditions
    }

    pub fn add_activation_condition(&mut self, condition: ActivationCondition) {
        self.conditions.push(condition);
    }

    /// Whether this agent should join the panel for `context`.
    ///
    /// An agent without conditions never activates on its own.
    pub fn check_activation(&self, context: &PatientContext) -> bool {
        if self.conditions.is_empty() {
            return false;
        }

        for condition in &self.conditions {
            if !condition.is_satisfied(context) {
                debug!("{}: condition {:?} not met", self.role, condition);
                return false;
            }
        }
        true
    }

    /// Drop everything but the system prompt.
    pub fn reset_transcript(&mut self) {
        self.transcript.clear();
        if let Some(prompt) = &self.system_prompt {
            self.transcript.push(ChatMessage::system(prompt.clone()));
        }
    }

    /// Ask this specialist `query` with the full transcript as context.
    ///
    /// On failure the user turn stays in the transcript and no assistant turn
    /// is recorded.
    pub async fn analyze(&mut self, query: &str) -> Result<String, InferenceError> {
        self.transcript.push(ChatMessage::user(query));
        let response = self
            .client
            .complete(&self.settings, &self.transcript)
            .await?;
        self.transcript.push(ChatMessage::assistant(response.clone()));
        Ok(response)
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("role", &self.role)
            .field("expertise", &self.expertise)
            .field("model", &self.settings.model)
            .field("conditions", &self.conditions)
            .field("transcript_len", &self.transcript.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedClient;
    use crate::llm::Speaker;

    fn context(symptoms: &[&str], syndrome_type: SyndromeType) -> PatientContext {
        PatientContext {
            symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
            syndrome_type,
            ..PatientContext::default()
        }
    }

    fn agent(client: Arc<dyn InferenceClient>) -> Agent {
        Agent::new(
            "Geneticist",
            "Genetic syndromes",
            "Evaluates heritable causes",
            ModelSettings::new("test-model", 0.7),
            client,
        )
    }

    #[test]
    fn test_no_conditions_never_activates() {
        let a = agent(Arc::new(ScriptedClient::constant("ok")));
        assert!(!a.check_activation(&context(&[], SyndromeType::Unknown)));
        assert!(!a.check_activation(&context(&["cleft_lip"], SyndromeType::Syndromic)));
    }

    #[test]
    fn test_syndrome_type_mismatch() {
        let a = agent(Arc::new(ScriptedClient::constant("ok")))
            .with_condition(ActivationCondition::SyndromeType(SyndromeType::Syndromic));
        assert!(!a.check_activation(&context(&[], SyndromeType::NonSyndromic)));
        assert!(a.check_activation(&context(&[], SyndromeType::Syndromic)));
    }

    #[test]
    fn test_all_conditions_required() {
        let a = agent(Arc::new(ScriptedClient::constant("ok")))
            .with_condition(ActivationCondition::SyndromeType(SyndromeType::Syndromic))
            .with_condition(ActivationCondition::symptom("ear_anomaly"))
            .with_condition(ActivationCondition::custom("has family history", |c| {
                c.family_history.is_some()
            }));

        let mut ctx = context(&["ear_anomaly", "cleft_palate"], SyndromeType::Syndromic);
        ctx.family_history = Some("mother affected".to_string());
        assert!(a.check_activation(&ctx));

        let mut missing_symptom = ctx.clone();
        missing_symptom.symptoms.remove("ear_anomaly");
        assert!(!a.check_activation(&missing_symptom));

        let mut wrong_type = ctx.clone();
        wrong_type.syndrome_type = SyndromeType::Unknown;
        assert!(!a.check_activation(&wrong_type));

        let mut custom_false = ctx.clone();
        custom_false.family_history = None;
        assert!(!a.check_activation(&custom_false));
    }

    #[tokio::test]
    async fn test_analyze_appends_turns() {
        let client = Arc::new(ScriptedClient::constant("assessment"));
        let mut a = agent(client.clone()).with_system_prompt("You are a geneticist.");

        let reply = a.analyze("Assess this case").await.unwrap();
        assert_eq!(reply, "assessment");

        let roles: Vec<Speaker> = a.transcript().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Speaker::System, Speaker::User, Speaker::Assistant]);

        // The capability sees the transcript up to and including the query.
        let sent = &client.transcripts()[0];
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].content, "Assess this case");
    }

    #[tokio::test]
    async fn test_analyze_propagates_failure() {
        let client = Arc::new(ScriptedClient::new(|_, _| {
            Err(InferenceError::Timeout(5))
        }));
        let mut a = agent(client);

        let result = a.analyze("Assess").await;
        assert!(matches!(result, Err(InferenceError::Timeout(5))));
        assert_eq!(a.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_keeps_system_prompt() {
        let mut a = agent(Arc::new(ScriptedClient::constant("ok")))
            .with_system_prompt("You are a geneticist.");
        a.analyze("first").await.unwrap();
        a.analyze("second").await.unwrap();
        assert_eq!(a.transcript().len(), 5);

        a.reset_transcript();
        assert_eq!(a.transcript(), &[ChatMessage::system("You are a geneticist.")]);
    }
}
