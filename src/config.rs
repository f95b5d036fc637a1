//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.clp-panel.toml` files.

use crate::agent::AgentProfile;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE: &str = ".clp-panel.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Knowledge base settings.
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Literature lookup settings.
    #[serde(default)]
    pub literature: LiteratureConfig,

    /// Extra specialists registered after the built-in panel.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<AgentProfile>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "clp_panel_report.md".to_string()
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model answering as the specialists.
    #[serde(default = "default_model")]
    pub name: String,

    /// Model classifying and integrating.
    #[serde(default = "default_model")]
    pub coordinator: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for specialist answers.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Temperature for the coordinator.
    #[serde(default = "default_coordinator_temperature")]
    pub coordinator_temperature: f32,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Upper bound on one specialist's answer during coordination.
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_seconds: u64,

    /// Number of retries on transient failures.
    #[serde(default = "default_retries")]
    pub retries: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            coordinator: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            coordinator_temperature: default_coordinator_temperature(),
            timeout_seconds: default_timeout(),
            agent_timeout_seconds: default_agent_timeout(),
            retries: default_retries(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_coordinator_temperature() -> f32 {
    0.5
}

fn default_timeout() -> u64 {
    300
}

fn default_agent_timeout() -> u64 {
    600 // covers one call plus retries
}

fn default_retries() -> usize {
    2
}

/// Knowledge base settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Directory holding `syndromes.json` and `treatment_guidelines.json`.
    /// The built-in catalog is used in memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Literature lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteratureConfig {
    /// Query PubMed, MedGen and ClinVar for syndromic cases.
    #[serde(default)]
    pub enabled: bool,

    /// Entrez E-utilities base URL.
    #[serde(default = "default_entrez_url")]
    pub base_url: String,

    /// NCBI API key, raises the request rate limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Records fetched per lookup.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_literature_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LiteratureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_entrez_url(),
            api_key: None,
            max_results: default_max_results(),
            timeout_seconds: default_literature_timeout(),
        }
    }
}

fn default_entrez_url() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string()
}

fn default_max_results() -> usize {
    3
}

fn default_literature_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only values given explicitly on the command line override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref coordinator) = args.coordinator_model {
            self.model.coordinator = coordinator.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if let Some(agent_timeout) = args.agent_timeout {
            self.model.agent_timeout_seconds = agent_timeout;
        }

        if let Some(ref dir) = args.knowledge_dir {
            self.knowledge.dir = Some(dir.clone());
        }

        // Flags always override
        if args.literature {
            self.literature.enabled = true;
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
