//! Markdown and JSON report generation.
//!
//! This module renders a complete panel analysis as a Markdown document a
//! clinician can read top to bottom, or as JSON for other tools.

use crate::analysis::{group_by_confidence, summarize_outcome, unexplained_symptoms};
use crate::literature::Evidence;
use crate::models::{
    AnalysisStatus, Confidence, CoordinationOutcome, PanelAnalysis, PanelMember, PatientContext,
    Report, ReportMetadata, SyndromeMatch, TreatmentGuideline,
};
use anyhow::{Context, Result};
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let analysis = &report.analysis;
    let mut output = String::new();

    output.push_str("# Cleft Lip and Palate Panel Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_patient_section(&analysis.patient));
    output.push_str(&generate_candidates_section(&analysis.patient, &analysis.candidates));
    output.push_str(&generate_panel_section(&analysis.panel, &analysis.outcome));
    output.push_str(&generate_assessment_section(&analysis.outcome));
    output.push_str(&generate_findings_section(&analysis.panel, &analysis.outcome));
    output.push_str(&generate_evidence_section(&analysis.evidence));

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Specialist Model:** `{}`\n",
        metadata.specialist_model
    ));
    section.push_str(&format!(
        "- **Coordinator Model:** `{}`\n",
        metadata.coordinator_model
    ));
    section.push_str(&format!(
        "- **Specialists Consulted:** {}\n",
        metadata.agents_consulted
    ));
    if metadata.agents_failed > 0 {
        section.push_str(&format!(
            "- **Specialists Failed:** {}\n",
            metadata.agents_failed
        ));
    }
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_patient_section(patient: &PatientContext) -> String {
    let mut section = String::new();

    section.push_str("## Patient\n\n");
    section.push_str(&format!("- **Age:** {}\n", patient.age_or_unknown()));
    section.push_str(&format!("- **Gender:** {}\n", patient.gender_or_unknown()));
    section.push_str(&format!("- **Symptoms:** {}\n", patient.symptom_list()));
    if let Some(history) = &patient.medical_history {
        section.push_str(&format!("- **Medical History:** {}\n", history));
    }
    if let Some(family) = &patient.family_history {
        section.push_str(&format!("- **Family History:** {}\n", family));
    }
    section.push_str(&format!("- **Classification:** {}\n", patient.syndrome_type));
    section.push('\n');

    section
}

fn confidence_badge(confidence: Confidence) -> &'static str {
    match confidence {
        Confidence::High => "🔴 **HIGH**",
        Confidence::Medium => "🟡 **MEDIUM**",
        Confidence::Low => "🟢 **LOW**",
    }
}

/// Knowledge-base candidates, highest confidence first.
fn generate_candidates_section(patient: &PatientContext, candidates: &[SyndromeMatch]) -> String {
    let mut section = String::new();

    section.push_str("## Syndrome Candidates\n\n");

    if candidates.is_empty() {
        section.push_str("No syndrome in the knowledge base shares a symptom with this patient.\n\n");
    } else {
        section.push_str("| Syndrome | Matched | Match | Confidence | Genes |\n");
        section.push_str("|:---|:---:|:---:|:---|:---|\n");

        for (_, group) in group_by_confidence(candidates).iter().rev() {
            for m in group {
                section.push_str(&format!(
                    "| {} | {}/{} | {:.1}% | {} | {} |\n",
                    m.record.name,
                    m.matched_count,
                    m.total_count,
                    m.match_percentage,
                    confidence_badge(m.confidence()),
                    m.record.genes.join(", ")
                ));
            }
        }
        section.push('\n');
    }

    if !patient.possible_syndromes.is_empty() {
        section.push_str("**Coordinator's differential:** ");
        let names: Vec<String> = patient
            .possible_syndromes
            .iter()
            .map(|s| format!("{} ({})", s.name, s.confidence))
            .collect();
        section.push_str(&names.join(", "));
        section.push_str("\n\n");
    }

    let unexplained = unexplained_symptoms(patient, candidates);
    if !candidates.is_empty() && !unexplained.is_empty() {
        section.push_str(&format!(
            "**Not explained by any candidate:** {}\n\n",
            unexplained.join(", ")
        ));
    }

    section
}

fn generate_panel_section(panel: &[PanelMember], outcome: &CoordinationOutcome) -> String {
    let mut section = String::new();

    section.push_str("## Panel\n\n");

    if panel.is_empty() {
        section.push_str("No specialist was recruited for this patient.\n\n");
        return section;
    }

    let summary = summarize_outcome(outcome);
    section.push_str(&format!(
        "*Consulted: {} | Answered: {} | Failed: {}*\n\n",
        summary.consulted, summary.succeeded, summary.failed
    ));

    section.push_str("| Specialist | Expertise | Status |\n");
    section.push_str("|:---|:---|:---:|\n");
    for member in panel {
        let status = if outcome.failed_agents.contains(&member.id) {
            "❌"
        } else {
            "✅"
        };
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            member.role, member.expertise, status
        ));
    }
    section.push('\n');

    section
}

fn generate_assessment_section(outcome: &CoordinationOutcome) -> String {
    let mut section = String::new();

    section.push_str("## Integrated Assessment\n\n");

    match (&outcome.status, &outcome.integrated_result) {
        (AnalysisStatus::Success, Some(integrated)) => {
            section.push_str(integrated.trim());
            section.push_str("\n\n");
        }
        _ => {
            section.push_str(&format!("> ⚠️ **{}**\n\n", outcome.message));
        }
    }

    section
}

/// Each specialist's answer, in panel order.
fn generate_findings_section(panel: &[PanelMember], outcome: &CoordinationOutcome) -> String {
    if outcome.results.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Specialist Findings\n\n");

    for member in panel {
        let Some(result) = outcome.results.get(&member.id) else {
            continue;
        };
        section.push_str(&format!("### {}\n\n", member.role));
        if outcome.failed_agents.contains(&member.id) {
            section.push_str(&format!("> ❌ {}\n\n", result));
        } else {
            section.push_str(result.trim());
            section.push_str("\n\n");
        }
    }

    section
}

fn generate_evidence_section(evidence: &Evidence) -> String {
    if evidence.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Supporting Evidence\n\n");

    if !evidence.articles.is_empty() {
        section.push_str("### Literature\n\n");
        for article in &evidence.articles {
            section.push_str(&format!("- [{}]({})", article.title, article.url));
            if !article.journal.is_empty() {
                section.push_str(&format!(" *{}*", article.journal));
            }
            if !article.publication_date.is_empty() {
                section.push_str(&format!(", {}", article.publication_date));
            }
            section.push('\n');
        }
        section.push('\n');
    }

    if !evidence.conditions.is_empty() {
        section.push_str("### Conditions (MedGen)\n\n");
        for condition in &evidence.conditions {
            section.push_str(&format!("- [{}]({})\n", condition.name, condition.url));
        }
        section.push('\n');
    }

    if !evidence.variants.is_empty() {
        section.push_str("### Variants (ClinVar)\n\n");
        for variant in &evidence.variants {
            section.push_str(&format!(
                "- [{}]({}) {} {}\n",
                variant.name, variant.url, variant.gene, variant.clinical_significance
            ));
        }
        section.push('\n');
    }

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(
        "*Generated by clp-panel. Decision support only; findings must be reviewed by the treating team.*\n",
    );

    footer
}

/// Render a treatment guideline for the terminal.
pub fn generate_guideline_markdown(guideline: &TreatmentGuideline) -> String {
    let mut output = String::new();

    output.push_str(&format!("# {}\n\n", guideline.title));

    if !guideline.timeline.is_empty() {
        output.push_str("## Timeline\n\n");
        output.push_str("| Age | Action |\n");
        output.push_str("|:---|:---|\n");
        for step in &guideline.timeline {
            output.push_str(&format!("| {} | {} |\n", step.age_window, step.action));
        }
        output.push('\n');
    }

    if !guideline.follow_up.is_empty() {
        output.push_str("## Follow-up\n\n");
        for item in &guideline.follow_up {
            output.push_str(&format!("- {}\n", item));
        }
        output.push('\n');
    }

    if !guideline.references.is_empty() {
        output.push_str("## References\n\n");
        for reference in &guideline.references {
            output.push_str(&format!("- {}\n", reference));
        }
        output.push('\n');
    }

    output
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write the rendered report to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

/// The analysis as shown in a report, with counts filled in.
pub fn build_report(
    analysis: PanelAnalysis,
    specialist_model: &str,
    coordinator_model: &str,
    duration_seconds: f64,
) -> Report {
    let summary = summarize_outcome(&analysis.outcome);
    Report {
        metadata: ReportMetadata {
            analysis_date: chrono::Utc::now(),
            specialist_model: specialist_model.to_string(),
            coordinator_model: coordinator_model.to_string(),
            agents_consulted: summary.consulted,
            agents_failed: summary.failed,
            duration_seconds,
        },
        analysis,
    }
}
