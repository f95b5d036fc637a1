//! Agent registry, recruitment and concurrent coordination.
//!
//! One analysis cycle runs `Idle → Recruiting → Coordinating → Integrated | Failed`.
//! Recruitment and coordination take `&mut self`, so a manager serves one
//! cycle at a time; concurrent requests need one manager each.

use crate::agent::coordinator::{Coordinator, Finding};
use crate::agent::specialist::Agent;
use crate::models::{AnalysisStatus, CoordinationOutcome, PanelMember, PatientContext};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the manager is in the current analysis cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Recruiting,
    Coordinating,
    Integrated,
    Failed,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CyclePhase::Idle => write!(f, "idle"),
            CyclePhase::Recruiting => write!(f, "recruiting"),
            CyclePhase::Coordinating => write!(f, "coordinating"),
            CyclePhase::Integrated => write!(f, "integrated"),
            CyclePhase::Failed => write!(f, "failed"),
        }
    }
}

/// Owns the specialists and runs analysis cycles over them.
pub struct AgentManager {
    /// Registered agents in registration order.
    agents: Vec<(String, Agent)>,
    /// Ids activated by the last recruitment, in registration order.
    active: Vec<String>,
    coordinator: Coordinator,
    agent_timeout: Duration,
    phase: CyclePhase,
}

impl AgentManager {
    pub fn new(coordinator: Coordinator, agent_timeout: Duration) -> Self {
        Self {
            agents: Vec::new(),
            active: Vec::new(),
            coordinator,
            agent_timeout,
            phase: CyclePhase::Idle,
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Register `agent` under `id`. An existing id is replaced in place.
    pub fn register_agent(&mut self, id: impl Into<String>, agent: Agent) {
        let id = id.into();
        debug!(
            "Registering agent {} ({}, model {}, {} conditions)",
            id,
            agent.role(),
            agent.settings().model,
            agent.conditions().len()
        );

        match self.agents.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = agent,
            None => self.agents.push((id, agent)),
        }
    }

    /// Remove `id` from the registry and from the active set.
    pub fn unregister_agent(&mut self, id: &str) -> Option<Agent> {
        self.active.retain(|active| active != id);
        let position = self.agents.iter().position(|(existing, _)| existing == id)?;
        Some(self.agents.remove(position).1)
    }

    pub fn get_agent(&self, id: &str) -> Option<&Agent> {
        self.agents
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, agent)| agent)
    }

    pub fn agent_ids(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|(id, _)| id.as_str())
    }

    pub fn active_agents(&self) -> &[String] {
        &self.active
    }

    /// The active agents as report entries.
    pub fn panel(&self) -> Vec<PanelMember> {
        self.active
            .iter()
            .filter_map(|id| {
                self.get_agent(id).map(|agent| PanelMember {
                    id: id.clone(),
                    role: agent.role().to_string(),
                    expertise: agent.expertise().to_string(),
                })
            })
            .collect()
    }

    /// Decide which agents take part for `context`, enriching it with the
    /// coordinator's classification.
    ///
    /// An agent joins if the coordinator names its role or its own
    /// activation conditions all hold. Every transcript is reset first, so
    /// nothing carries over from a previous patient.
    pub async fn recruit_agents(&mut self, context: &mut PatientContext) -> Vec<String> {
        self.phase = CyclePhase::Recruiting;
        self.active.clear();
        self.coordinator.reset();
        for (_, agent) in self.agents.iter_mut() {
            agent.reset_transcript();
        }

        if self.agents.is_empty() {
            warn!("No agents registered, nothing to recruit");
            return Vec::new();
        }

        let roster: Vec<(&str, &str)> = self
            .agents
            .iter()
            .map(|(_, agent)| (agent.role(), agent.description()))
            .collect();
        debug!(
            "Classifying with {} over {} roles",
            self.coordinator.settings().model,
            roster.len()
        );
        let classification = self.coordinator.classify(context, &roster).await;

        context.syndrome_type = classification.syndrome_type;
        if !classification.possible_syndromes.is_empty() {
            context.possible_syndromes = classification.possible_syndromes.clone();
        }

        for (id, agent) in &self.agents {
            let named = classification
                .activated_agents
                .iter()
                .any(|role| role.trim().eq_ignore_ascii_case(agent.role()));

            if named || agent.check_activation(context) {
                debug!("Activating {} (named by coordinator: {})", id, named);
                self.active.push(id.clone());
            }
        }

        info!(
            "Recruited {} of {} agents: {:?}",
            self.active.len(),
            self.agents.len(),
            self.active
        );
        self.active.clone()
    }

    /// Put `query` to every active agent concurrently and integrate the answers.
    ///
    /// Failed or timed-out agents get an error string in their slot; the
    /// others are unaffected.
    pub async fn coordinate_analysis(&mut self, query: &str) -> CoordinationOutcome {
        if self.active.is_empty() {
            self.phase = CyclePhase::Failed;
            return CoordinationOutcome::no_agents(
                "No active agents, recruit agents before coordinating",
            );
        }

        self.phase = CyclePhase::Coordinating;
        info!("Dispatching query to {} agents", self.active.len());

        let timeout = self.agent_timeout;
        let active = &self.active;
        let calls = self
            .agents
            .iter_mut()
            .filter(|entry| active.contains(&entry.0))
            .map(|(id, agent)| {
                let id = id.clone();
                async move {
                    let result = match tokio::time::timeout(timeout, agent.analyze(query)).await {
                        Ok(Ok(text)) => Ok(text),
                        Ok(Err(e)) => Err(format!("Analysis failed: {}", e)),
                        Err(_) => Err(format!(
                            "Analysis failed: no response within {}s",
                            timeout.as_secs_f64()
                        )),
                    };
                    (id, result)
                }
            });

        let settled = join_all(calls).await;

        let mut results = BTreeMap::new();
        let mut failed_agents = Vec::new();
        for (id, result) in settled {
            let text = match result {
                Ok(text) => text,
                Err(error) => {
                    warn!("Agent {} failed: {}", id, error);
                    failed_agents.push(id.clone());
                    error
                }
            };
            results.insert(id, text);
        }

        let findings: Vec<Finding<'_>> = self
            .agents
            .iter()
            .filter_map(|(id, agent)| {
                results.get(id).map(|result| Finding {
                    role: agent.role(),
                    expertise: agent.expertise(),
                    result,
                })
            })
            .collect();

        match self.coordinator.integrate(query, &findings).await {
            Ok(integrated) => {
                self.phase = CyclePhase::Integrated;
                info!(
                    "Integration complete ({} agents, {} failed)",
                    results.len(),
                    failed_agents.len()
                );
                CoordinationOutcome {
                    status: AnalysisStatus::Success,
                    message: "Analysis complete".to_string(),
                    results,
                    integrated_result: Some(integrated),
                    failed_agents,
                }
            }
            Err(e) => {
                self.phase = CyclePhase::Failed;
                warn!("Integration failed: {}", e);
                CoordinationOutcome {
                    status: AnalysisStatus::Error,
                    message: format!("Integration failed: {}", e),
                    results,
                    integrated_result: None,
                    failed_agents,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::specialist::ActivationCondition;
    use crate::llm::scripted::ScriptedClient;
    use crate::llm::{ChatMessage, InferenceClient, InferenceError, ModelSettings, Speaker};
    use crate::models::SyndromeType;
    use std::sync::Arc;

    const CLASSIFY_MARKER: &str = "Respond with a single JSON object";

    /// Coordinator model is "coord"; agents whose system prompt contains
    /// "broken" fail, everyone else answers with their system prompt.
    fn panel_client(classification: &'static str) -> Arc<ScriptedClient> {
        Arc::new(ScriptedClient::new(move |settings, transcript| {
            let last = transcript.last().map(|m| m.content.as_str()).unwrap_or("");
            if settings.model == "coord" {
                if last.contains(CLASSIFY_MARKER) {
                    return Ok(classification.to_string());
                }
                return Ok("integrated report".to_string());
            }
            let system = transcript.first().map(|m| m.content.clone()).unwrap_or_default();
            if system.contains("broken") {
                return Err(InferenceError::Api {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(format!("answer from {}", system))
        }))
    }

    fn manager(client: Arc<dyn InferenceClient>) -> AgentManager {
        let coordinator = Coordinator::new(
            ModelSettings::new("coord", 0.5),
            client,
            vec!["fallback".to_string()],
        );
        AgentManager::new(coordinator, Duration::from_millis(200))
    }

    fn agent(role: &str, client: Arc<dyn InferenceClient>) -> Agent {
        Agent::new(
            role,
            format!("{} expertise", role),
            "",
            ModelSettings::new("spec", 0.7),
            client,
        )
        .with_system_prompt(role.to_string())
    }

    fn always() -> ActivationCondition {
        ActivationCondition::custom("always", |_| true)
    }

    #[tokio::test]
    async fn test_empty_active_set_makes_no_calls() {
        let client = panel_client("{}");
        let mut m = manager(client.clone());
        m.register_agent("x", agent("foo", client.clone()));

        let outcome = m.coordinate_analysis("query").await;
        assert_eq!(outcome.status, AnalysisStatus::Error);
        assert!(outcome.results.is_empty());
        assert!(outcome.integrated_result.is_none());
        assert_eq!(client.calls(), 0);
        assert_eq!(m.phase(), CyclePhase::Failed);
    }

    #[tokio::test]
    async fn test_name_match_or_predicate_match() {
        let client = panel_client(r#"{"syndrome_type": "syndromic", "activated_agents": ["foo"]}"#);
        let mut m = manager(client.clone());
        m.register_agent("x", agent("foo", client.clone()));
        m.register_agent("y", agent("bar", client.clone()).with_condition(always()));
        m.register_agent("z", agent("baz", client.clone()));

        let mut context = PatientContext::default();
        let recruited = m.recruit_agents(&mut context).await;

        assert_eq!(recruited, vec!["x", "y"]);
        assert_eq!(context.syndrome_type, SyndromeType::Syndromic);
        assert_eq!(m.phase(), CyclePhase::Recruiting);
    }

    #[tokio::test]
    async fn test_recruitment_keeps_caller_candidates_when_coordinator_names_none() {
        let client = panel_client(
            r#"{"syndrome_type": "non_syndromic", "possible_syndromes": [], "activated_agents": []}"#,
        );
        let mut m = manager(client.clone());
        m.register_agent(
            "cleft",
            agent("cleft", client.clone())
                .with_condition(ActivationCondition::SyndromeType(SyndromeType::NonSyndromic)),
        );

        let mut context = PatientContext::default();
        context.possible_syndromes = vec![crate::models::PossibleSyndrome {
            name: "Van der Woude syndrome".to_string(),
            confidence: crate::models::Confidence::Medium,
        }];

        let recruited = m.recruit_agents(&mut context).await;
        assert_eq!(recruited, vec!["cleft"]);
        assert_eq!(context.leading_syndrome(), Some("Van der Woude syndrome"));
    }

    #[tokio::test]
    async fn test_unparseable_classification_uses_fallback_roles() {
        let client = panel_client("no idea");
        let mut m = manager(client.clone());
        m.register_agent("general", agent("fallback", client.clone()));
        m.register_agent("other", agent("other", client.clone()));

        let mut context = PatientContext::default();
        let recruited = m.recruit_agents(&mut context).await;
        assert_eq!(recruited, vec!["general"]);
        assert_eq!(context.syndrome_type, SyndromeType::Unknown);
    }

    #[tokio::test]
    async fn test_one_failure_keeps_all_slots() {
        let client = panel_client(r#"{"activated_agents": ["a", "b", "broken"]}"#);
        let mut m = manager(client.clone());
        m.register_agent("a", agent("a", client.clone()));
        m.register_agent("b", agent("b", client.clone()));
        m.register_agent("c", agent("broken", client.clone()));

        let mut context = PatientContext::default();
        m.recruit_agents(&mut context).await;
        let outcome = m.coordinate_analysis("assess").await;

        assert!(outcome.is_success());
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.failed_agents, vec!["c"]);
        assert!(outcome.results["c"].starts_with("Analysis failed"));
        assert_eq!(outcome.results["a"], "answer from a");
        assert_eq!(outcome.results["b"], "answer from b");
        assert_eq!(outcome.integrated_result.as_deref(), Some("integrated report"));
        assert_eq!(m.phase(), CyclePhase::Integrated);
    }

    #[tokio::test]
    async fn test_slow_agent_times_out() {
        let client = Arc::new(
            ScriptedClient::new(|settings, transcript| {
                let last = transcript.last().map(|m| m.content.as_str()).unwrap_or("");
                if settings.model == "coord" && last.contains(CLASSIFY_MARKER) {
                    return Ok(r#"{"activated_agents": ["quick", "slow"]}"#.to_string());
                }
                Ok("done".to_string())
            })
            .stall_when("stall here", Duration::from_secs(5)),
        );
        let mut m = manager(client.clone());
        m.register_agent("quick", agent("quick", client.clone()));
        m.register_agent(
            "slow",
            agent("slow", client.clone()).with_system_prompt("stall here"),
        );

        let mut context = PatientContext::default();
        m.recruit_agents(&mut context).await;
        let outcome = m.coordinate_analysis("assess").await;

        assert_eq!(outcome.results["quick"], "done");
        assert!(outcome.results["slow"].contains("no response within"));
        assert_eq!(outcome.failed_agents, vec!["slow"]);
    }

    #[tokio::test]
    async fn test_agents_answer_concurrently() {
        let stall = Duration::from_millis(400);
        let client = Arc::new(
            ScriptedClient::new(|settings, transcript| {
                let last = transcript.last().map(|m| m.content.as_str()).unwrap_or("");
                if settings.model == "coord" && last.contains(CLASSIFY_MARKER) {
                    return Ok(r#"{"activated_agents": ["first", "second", "third"]}"#.to_string());
                }
                Ok("done".to_string())
            })
            .stall_when("stall here", stall),
        );
        let coordinator = Coordinator::new(
            ModelSettings::new("coord", 0.5),
            client.clone(),
            vec!["fallback".to_string()],
        );
        let mut m = AgentManager::new(coordinator, Duration::from_secs(5));
        for role in ["first", "second", "third"] {
            m.register_agent(role, agent(role, client.clone()).with_system_prompt("stall here"));
        }

        let mut context = PatientContext::default();
        m.recruit_agents(&mut context).await;
        let started = std::time::Instant::now();
        let outcome = m.coordinate_analysis("assess").await;
        let elapsed = started.elapsed();

        assert!(outcome.is_success());
        assert!(outcome.failed_agents.is_empty());
        assert_eq!(outcome.results.len(), 3);
        // One stall, not three back to back.
        assert!(elapsed >= stall);
        assert!(elapsed < stall * 2, "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_integration_prompt_in_registration_order() {
        let client = panel_client(r#"{"activated_agents": ["zeta", "alpha"]}"#);
        let mut m = manager(client.clone());
        m.register_agent("z", agent("zeta", client.clone()));
        m.register_agent("a", agent("alpha", client.clone()));

        let mut context = PatientContext::default();
        m.recruit_agents(&mut context).await;
        m.coordinate_analysis("assess").await;

        let prompt = &m
            .coordinator()
            .transcript()
            .iter()
            .rev()
            .find(|msg| msg.role == Speaker::User)
            .unwrap()
            .content;
        let zeta = prompt.find("### zeta").unwrap();
        let alpha = prompt.find("### alpha").unwrap();
        assert!(zeta < alpha);
    }

    #[tokio::test]
    async fn test_integration_failure_is_error_result() {
        let client = Arc::new(ScriptedClient::new(|settings, transcript| {
            let last = transcript.last().map(|m| m.content.as_str()).unwrap_or("");
            if settings.model == "coord" {
                if last.contains(CLASSIFY_MARKER) {
                    return Ok(r#"{"activated_agents": ["a"]}"#.to_string());
                }
                return Err(InferenceError::Timeout(1));
            }
            Ok("fine".to_string())
        }));
        let mut m = manager(client.clone());
        m.register_agent("a", agent("a", client.clone()));

        let mut context = PatientContext::default();
        m.recruit_agents(&mut context).await;
        let outcome = m.coordinate_analysis("assess").await;

        assert_eq!(outcome.status, AnalysisStatus::Error);
        assert_eq!(outcome.results["a"], "fine");
        assert!(outcome.integrated_result.is_none());
        assert_eq!(m.phase(), CyclePhase::Failed);
    }

    #[tokio::test]
    async fn test_transcripts_reset_between_patients() {
        let client = panel_client(r#"{"activated_agents": ["a"]}"#);
        let mut m = manager(client.clone());
        m.register_agent("a", agent("a", client.clone()));

        for _ in 0..2 {
            let mut context = PatientContext::default();
            m.recruit_agents(&mut context).await;
            m.coordinate_analysis("assess").await;
        }

        let transcript = m.get_agent("a").unwrap().transcript();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[0], ChatMessage::system("a"));
        // Classification and integration, nothing from the first patient.
        assert_eq!(m.coordinator().transcript().len(), 4);
    }

    #[tokio::test]
    async fn test_unregister_removes_from_active() {
        let client = panel_client(r#"{"activated_agents": ["a", "b"]}"#);
        let mut m = manager(client.clone());
        m.register_agent("a", agent("a", client.clone()));
        m.register_agent("b", agent("b", client.clone()));

        let mut context = PatientContext::default();
        m.recruit_agents(&mut context).await;
        assert_eq!(m.active_agents(), &["a", "b"]);

        assert!(m.unregister_agent("a").is_some());
        assert_eq!(m.active_agents(), &["b"]);
        assert!(m.get_agent("a").is_none());
        assert!(m.unregister_agent("a").is_none());
    }

    #[tokio::test]
    async fn test_empty_registry_recruits_nobody() {
        let client = panel_client("{}");
        let mut m = manager(client.clone());

        let mut context = PatientContext::default();
        assert!(m.recruit_agents(&mut context).await.is_empty());
        assert_eq!(client.calls(), 0);

        let outcome = m.coordinate_analysis("assess").await;
        assert_eq!(outcome.status, AnalysisStatus::Error);
    }

    #[test]
    fn test_register_replaces_in_place() {
        let client = panel_client("{}");
        let mut m = manager(client.clone());
        m.register_agent("a", agent("first", client.clone()));
        m.register_agent("b", agent("b", client.clone()));
        m.register_agent("a", agent("second", client.clone()));

        let ids: Vec<&str> = m.agent_ids().collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(m.get_agent("a").unwrap().role(), "second");
    }
}
