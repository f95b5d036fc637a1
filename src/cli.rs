//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::PatientInput;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// clp-panel - multi-specialist cleft lip and palate analysis
///
/// Matches symptoms against a syndrome knowledge base, recruits a panel of
/// LLM specialists through Ollama and writes an integrated report.
///
/// Examples:
///   clp-panel --symptoms cleft_lip,cleft_palate,lower_lip_pits --age "6 months"
///   clp-panel --patient patient.json --format json -o report.json
///   clp-panel --symptoms cleft_palate,myopia --dry-run
///   clp-panel --guideline van_der_woude_syndrome
///   clp-panel --knowledge-dir ./kb --add-syndrome kabuki.json
///   clp-panel --knowledge-dir ./kb --add-guideline kabuki_guideline.json
///   clp-panel --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Patient record as JSON
    ///
    /// Fields: symptoms (list), age, gender, medical_history, family_history.
    #[arg(
        short,
        long,
        value_name = "FILE",
        required_unless_present_any = ["symptoms", "init_config", "guideline", "add_syndrome", "add_guideline"],
        conflicts_with = "symptoms"
    )]
    pub patient: Option<PathBuf>,

    /// Symptoms (comma-separated)
    ///
    /// Example: --symptoms cleft_lip,cleft_palate,lower_lip_pits
    #[arg(short, long, value_name = "LIST", value_delimiter = ',')]
    pub symptoms: Option<Vec<String>>,

    /// Patient age, free text
    #[arg(long)]
    pub age: Option<String>,

    /// Patient gender
    #[arg(long)]
    pub gender: Option<String>,

    /// Medical history
    #[arg(long, value_name = "TEXT")]
    pub history: Option<String>,

    /// Family history
    #[arg(long, value_name = "TEXT")]
    pub family_history: Option<String>,

    /// Ollama model for the specialists
    ///
    /// Can also be set via CLP_PANEL_MODEL env var or .clp-panel.toml config.
    #[arg(short, long, env = "CLP_PANEL_MODEL")]
    pub model: Option<String>,

    /// Ollama model for classification and integration
    #[arg(long, env = "CLP_PANEL_COORDINATOR_MODEL")]
    pub coordinator_model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Temperature for specialist answers (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// HTTP request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Upper bound in seconds on one specialist's answer
    ///
    /// Specialists that exceed it are reported as failed; the rest of the
    /// panel is unaffected.
    #[arg(long, value_name = "SECS")]
    pub agent_timeout: Option<u64>,

    /// Knowledge base directory
    ///
    /// Created with the built-in catalog if missing.
    #[arg(long, value_name = "DIR")]
    pub knowledge_dir: Option<PathBuf>,

    /// Look up PubMed, MedGen and ClinVar for syndromic cases
    #[arg(long)]
    pub literature: bool,

    /// Output file path for the report
    ///
    /// Default: from config or clp_panel_report.md
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .clp-panel.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Dry run: match symptoms against the knowledge base only
    ///
    /// Prints candidate syndromes and exits. No model is called.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the treatment guideline for a condition id and exit
    #[arg(long, value_name = "ID")]
    pub guideline: Option<String>,

    /// Add a syndrome record (JSON with an "id" field) to the knowledge directory and exit
    #[arg(long, value_name = "FILE")]
    pub add_syndrome: Option<PathBuf>,

    /// Add a treatment guideline (JSON with a "condition_id" field) to the knowledge directory and exit
    #[arg(long, value_name = "FILE", conflicts_with = "add_syndrome")]
    pub add_guideline: Option<PathBuf>,

    /// Generate a default .clp-panel.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Validate Ollama URL format (not needed for dry-run)
        if !self.dry_run {
            if let Some(ref url) = self.ollama_url {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
                }
            }
        }

        // Validate temperature range
        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate timeouts if provided
        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }
        if self.agent_timeout == Some(0) {
            return Err("Agent timeout must be at least 1 second".to_string());
        }

        if let Some(ref symptoms) = self.symptoms {
            if symptoms.iter().all(|s| s.trim().is_empty()) {
                return Err("At least one symptom is required".to_string());
            }
        }

        // Validate patient file if provided
        if let Some(ref path) = self.patient {
            if !path.is_file() {
                return Err(format!("Patient file does not exist: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// The patient described on the command line.
    ///
    /// A `--patient` file is read first; demographic flags fill in or
    /// override its fields.
    pub fn patient_input(&self) -> Result<PatientInput> {
        let mut input = match self.patient {
            Some(ref path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read patient file: {}", path.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse patient file: {}", path.display()))?
            }
            None => PatientInput {
                symptoms: self.symptoms.clone().unwrap_or_default(),
                ..PatientInput::default()
            },
        };

        if let Some(ref age) = self.age {
            input.age = age.clone();
        }
        if let Some(ref gender) = self.gender {
            input.gender = gender.clone();
        }
        if self.history.is_some() {
            input.medical_history = self.history.clone();
        }
        if self.family_history.is_some() {
            input.family_history = self.family_history.clone();
        }

        Ok(input)
    }
}
