//! End-to-end patient analysis over the knowledge base, the panel and the
//! literature services.

use crate::agent::AgentManager;
use crate::analysis::{possible_syndromes, top_candidates, TOP_CANDIDATES};
use crate::knowledge::KnowledgeBase;
use crate::literature::{Evidence, LiteratureClient};
use crate::models::{
    CoordinationOutcome, PanelAnalysis, PatientContext, PatientInput, SyndromeMatch, SyndromeType,
    TreatmentGuideline,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Default number of records fetched per literature lookup.
pub const LITERATURE_RESULTS: usize = 3;

pub struct PanelSystem {
    knowledge: KnowledgeBase,
    manager: AgentManager,
    literature: Option<Arc<dyn LiteratureClient>>,
    literature_results: usize,
}

impl PanelSystem {
    pub fn new(knowledge: KnowledgeBase, manager: AgentManager) -> Self {
        Self {
            knowledge,
            manager,
            literature: None,
            literature_results: LITERATURE_RESULTS,
        }
    }

    pub fn with_literature(mut self, client: Arc<dyn LiteratureClient>, max_results: usize) -> Self {
        self.literature = Some(client);
        self.literature_results = max_results;
        self
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn manager(&self) -> &AgentManager {
        &self.manager
    }

    /// Best knowledge-base candidates for `symptoms`. No inference involved.
    pub fn match_symptoms(&self, symptoms: &BTreeSet<String>) -> Vec<SyndromeMatch> {
        top_candidates(&self.knowledge.search_syndromes(symptoms), TOP_CANDIDATES)
    }

    pub fn treatment_guideline(&self, condition_id: &str) -> Option<&TreatmentGuideline> {
        self.knowledge.get_guideline(condition_id)
    }

    /// Run the full panel over one patient.
    ///
    /// The outcome has error status when nobody was recruited or integration
    /// failed; the analysis itself is always returned.
    pub async fn analyze_patient(&mut self, input: PatientInput) -> PanelAnalysis {
        let mut context = input.into_context();

        let candidates = self.match_symptoms(&context.symptoms);
        context.possible_syndromes = possible_syndromes(&candidates);
        info!(
            "{} knowledge base candidates for {} symptoms",
            candidates.len(),
            context.symptoms.len()
        );

        let recruited = self.manager.recruit_agents(&mut context).await;
        if recruited.is_empty() {
            warn!("No specialist was activated for this patient");
            return PanelAnalysis {
                patient: context,
                candidates,
                panel: Vec::new(),
                outcome: CoordinationOutcome::no_agents(
                    "No specialist was activated, check the patient data",
                ),
                evidence: Evidence::default(),
            };
        }

        let query = build_patient_query(&context);
        let outcome = self.manager.coordinate_analysis(&query).await;
        let evidence = self.gather_evidence(&context, &candidates).await;

        PanelAnalysis {
            patient: context,
            candidates,
            panel: self.manager.panel(),
            outcome,
            evidence,
        }
    }

    /// Literature for the leading syndrome of a syndromic case.
    async fn gather_evidence(
        &self,
        context: &PatientContext,
        candidates: &[SyndromeMatch],
    ) -> Evidence {
        let Some(client) = &self.literature else {
            return Evidence::default();
        };
        if context.syndrome_type != SyndromeType::Syndromic {
            return Evidence::default();
        }
        let Some(name) = context.leading_syndrome() else {
            return Evidence::default();
        };

        info!("Searching literature for {}", name);
        let limit = self.literature_results;
        let article_query = format!("{} cleft lip palate", name);

        // Variants only when the leading syndrome is a known catalog entry.
        let gene = candidates
            .iter()
            .find(|c| c.record.name == name)
            .and_then(|c| c.record.genes.first());

        let (articles, conditions, variants) = tokio::join!(
            client.search_articles(&article_query, limit),
            client.search_conditions(name, limit),
            async {
                match gene {
                    Some(gene) => client.search_variants(&format!("{}[gene]", gene), limit).await,
                    None => Vec::new(),
                }
            }
        );

        Evidence {
            articles,
            conditions,
            variants,
        }
    }
}

/// Query put to every recruited specialist.
pub fn build_patient_query(context: &PatientContext) -> String {
    let mut query = String::new();
    query.push_str(
        "Please analyse the following cleft lip and palate patient and give a detailed \
         diagnosis and treatment recommendation:\n\n",
    );
    query.push_str("Patient information:\n");
    query.push_str(&format!("- Age: {}\n", context.age_or_unknown()));
    query.push_str(&format!("- Gender: {}\n", context.gender_or_unknown()));
    query.push_str(&format!("- Symptoms: {}\n", context.symptom_list()));
    query.push_str(&format!(
        "- Medical history: {}\n",
        context.medical_history.as_deref().unwrap_or("none")
    ));
    if let Some(family) = &context.family_history {
        query.push_str(&format!("- Family history: {}\n", family));
    }
    if context.syndrome_type != SyndromeType::Unknown {
        query.push_str(&format!("- Classification: {}\n", context.syndrome_type));
    }
    query.push_str("\nPlease answer from the perspective of your own specialty.\n");
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{default_profiles, Coordinator, GENERAL_SPECIALIST};
    use crate::literature::canned::CannedLiterature;
    use crate::literature::Article;
    use crate::llm::scripted::ScriptedClient;
    use crate::llm::{InferenceClient, ModelSettings};
    use crate::models::AnalysisStatus;
    use std::time::Duration;

    fn system(classification: &'static str) -> (PanelSystem, Arc<ScriptedClient>) {
        let client = Arc::new(ScriptedClient::new(move |settings, transcript| {
            let last = transcript.last().map(|m| m.content.as_str()).unwrap_or("");
            if settings.model == "coord" {
                if last.contains("Respond with a single JSON object") {
                    return Ok(classification.to_string());
                }
                return Ok("final assessment".to_string());
            }
            Ok("specialist view".to_string())
        }));
        let dyn_client: Arc<dyn InferenceClient> = client.clone();

        let coordinator = Coordinator::new(
            ModelSettings::new("coord", 0.5),
            dyn_client.clone(),
            vec![GENERAL_SPECIALIST.to_string()],
        );
        let mut manager = AgentManager::new(coordinator, Duration::from_secs(5));
        let defaults = ModelSettings::new("spec", 0.7);
        for profile in default_profiles() {
            manager.register_agent(profile.id.clone(), profile.build(&defaults, dyn_client.clone()));
        }

        (PanelSystem::new(KnowledgeBase::in_memory(), manager), client)
    }

    fn vdw_patient() -> PatientInput {
        PatientInput {
            symptoms: vec![
                "cleft_lip".to_string(),
                "cleft_palate".to_string(),
                "lower_lip_pits".to_string(),
            ],
            age: "6 months".to_string(),
            gender: "female".to_string(),
            medical_history: None,
            family_history: Some("Father has lip pits".to_string()),
        }
    }

    fn article() -> Article {
        Article {
            id: "1".to_string(),
            title: "IRF6 mutations".to_string(),
            authors: vec![],
            journal: String::new(),
            publication_date: String::new(),
            url: "https://pubmed.ncbi.nlm.nih.gov/1/".to_string(),
        }
    }

    #[test]
    fn test_match_symptoms_limits_to_top_three() {
        let (system, _) = system("{}");
        let symptoms: BTreeSet<String> = ["cleft_palate"].iter().map(|s| s.to_string()).collect();
        let matches = system.match_symptoms(&symptoms);
        assert_eq!(matches.len(), 3);
        assert!(system.treatment_guideline("van_der_woude_syndrome").is_some());
        assert!(system.treatment_guideline("nope").is_none());
    }

    #[tokio::test]
    async fn test_syndromic_case_gathers_literature() {
        let (system, _) = system(
            r#"{"syndrome_type": "syndromic", "possible_syndromes": [{"name": "Van der Woude syndrome", "confidence": "high"}], "activated_agents": ["Geneticist"]}"#,
        );
        let literature = Arc::new(CannedLiterature::new(Evidence {
            articles: vec![article()],
            ..Evidence::default()
        }));
        let mut system = system.with_literature(literature.clone(), 3);

        let analysis = system.analyze_patient(vdw_patient()).await;

        assert_eq!(analysis.outcome.status, AnalysisStatus::Success);
        assert_eq!(analysis.candidates[0].id, "van_der_woude_syndrome");
        assert_eq!(analysis.candidates[0].matched_count, 3);
        let panel: Vec<&str> = analysis.panel.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(panel, vec!["genetic"]);
        assert_eq!(analysis.evidence.articles.len(), 1);

        let queries = literature.queries();
        assert!(queries.contains(&"Van der Woude syndrome cleft lip palate".to_string()));
        assert!(queries.contains(&"IRF6[gene]".to_string()));
    }

    #[tokio::test]
    async fn test_non_syndromic_case_skips_literature() {
        let (system, _) = system(r#"{"syndrome_type": "non_syndromic", "activated_agents": []}"#);
        let literature = Arc::new(CannedLiterature::default());
        let mut system = system.with_literature(literature.clone(), 3);

        let analysis = system.analyze_patient(vdw_patient()).await;

        assert!(analysis.outcome.is_success());
        assert_eq!(analysis.panel[0].role, GENERAL_SPECIALIST);
        assert!(literature.queries().is_empty());
        assert!(analysis.evidence.is_empty());
    }

    #[tokio::test]
    async fn test_nobody_recruited_is_error() {
        // Unknown type, no named roles: no default specialist activates.
        let (mut system, client) = system(r#"{"syndrome_type": "unknown", "activated_agents": []}"#);

        let analysis = system.analyze_patient(vdw_patient()).await;

        assert_eq!(analysis.outcome.status, AnalysisStatus::Error);
        assert!(analysis.outcome.results.is_empty());
        assert!(analysis.panel.is_empty());
        // Only the classification call was made.
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn test_patient_query_fields() {
        let context = vdw_patient().into_context();
        let query = build_patient_query(&context);
        assert!(query.contains("- Age: 6 months"));
        assert!(query.contains("cleft_lip, cleft_palate, lower_lip_pits"));
        assert!(query.contains("- Medical history: none"));
        assert!(query.contains("Father has lip pits"));
    }
}
