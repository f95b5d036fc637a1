//! Candidate ranking and outcome statistics.
//!
//! This module turns raw knowledge-base matches and coordination outcomes
//! into the summaries shown in reports.

use crate::models::{
    Confidence, CoordinationOutcome, PatientContext, PossibleSyndrome, SyndromeMatch,
};
use std::collections::{BTreeMap, BTreeSet};

/// Number of knowledge-base candidates carried into an analysis.
pub const TOP_CANDIDATES: usize = 3;

/// Keep the best `n` matches. Input is expected best-first.
pub fn top_candidates(matches: &[SyndromeMatch], n: usize) -> Vec<SyndromeMatch> {
    matches.iter().take(n).cloned().collect()
}

/// Candidate names with their confidence bucket.
pub fn possible_syndromes(matches: &[SyndromeMatch]) -> Vec<PossibleSyndrome> {
    matches.iter().map(SyndromeMatch::to_possible_syndrome).collect()
}

/// Group matches by confidence, highest bucket first when iterated in reverse.
pub fn group_by_confidence(matches: &[SyndromeMatch]) -> BTreeMap<Confidence, Vec<&SyndromeMatch>> {
    let mut grouped: BTreeMap<Confidence, Vec<&SyndromeMatch>> = BTreeMap::new();

    for m in matches {
        grouped.entry(m.confidence()).or_default().push(m);
    }

    grouped
}

/// Patient symptoms that none of the candidates account for.
pub fn unexplained_symptoms<'a>(
    context: &'a PatientContext,
    matches: &[SyndromeMatch],
) -> Vec<&'a str> {
    let explained: BTreeSet<&str> = matches
        .iter()
        .flat_map(|m| m.record.symptoms.iter().map(String::as_str))
        .collect();

    context
        .symptoms
        .iter()
        .map(String::as_str)
        .filter(|s| !explained.contains(s))
        .collect()
}

/// Per-slot counts for one coordination outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeSummary {
    pub consulted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub fn summarize_outcome(outcome: &CoordinationOutcome) -> OutcomeSummary {
    let consulted = outcome.results.len();
    let failed = outcome.failed_agents.len();
    OutcomeSummary {
        consulted,
        succeeded: consulted.saturating_sub(failed),
        failed,
    }
}

/// Generate a text summary for the console.
pub fn generate_summary_text(summary: &OutcomeSummary, candidates: &[SyndromeMatch]) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Specialists consulted: {}", summary.consulted));
    lines.push(format!("- Answered: {}", summary.succeeded));
    lines.push(format!("- Failed: {}", summary.failed));

    if !candidates.is_empty() {
        lines.push(String::new());
        lines.push("Knowledge base candidates:".to_string());
        for m in candidates {
            lines.push(format!(
                "- {}: {}/{} symptoms ({:.1}%, {})",
                m.record.name,
                m.matched_count,
                m.total_count,
                m.match_percentage,
                m.confidence()
            ));
        }
    }

    lines.join("\n")
}
