//! clp-panel - multi-specialist cleft lip and palate analysis
//!
//! A CLI tool that matches a patient's symptoms against a syndrome knowledge
//! base, consults a panel of LLM specialists through Ollama and writes an
//! integrated Markdown or JSON report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, patient file, unknown guideline, etc.)
//!   2 - Analysis finished with an error status (no specialist recruited,
//!       integration failed)

mod agent;
mod analysis;
mod cli;
mod config;
mod knowledge;
mod literature;
mod llm;
mod models;
mod report;
mod system;

use agent::{default_profiles, AgentManager, Coordinator, GENERAL_SPECIALIST};
use anyhow::{anyhow, Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use knowledge::KnowledgeBase;
use literature::{EntrezClient, EntrezConfig};
use llm::ollama::OllamaConfig;
use llm::{InferenceClient, ModelSettings, OllamaClient};
use models::{PatientInput, SyndromeRecord, TreatmentGuideline};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use system::PanelSystem;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("clp-panel v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .clp-panel.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to choose models, a knowledge directory and extra specialists.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the requested command. Returns exit code (0 or 2).
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let knowledge = match config.knowledge.dir {
        Some(ref dir) => {
            info!("Knowledge base: {}", dir.display());
            KnowledgeBase::open(dir)
        }
        None => KnowledgeBase::in_memory(),
    };

    if let Some(ref path) = args.add_syndrome {
        return handle_add_syndrome(knowledge, path);
    }
    if let Some(ref path) = args.add_guideline {
        return handle_add_guideline(knowledge, path);
    }

    let mut system = build_system(&config, knowledge)?;

    if let Some(ref id) = args.guideline {
        return handle_guideline(&system, id);
    }

    let input = args.patient_input()?;

    // Handle --dry-run: knowledge-base matching only
    if args.dry_run {
        return Ok(handle_dry_run(&system, input));
    }

    println!("🩺 Consulting the specialist panel...");
    println!("   Specialist model: {}", config.model.name);
    println!("   Coordinator model: {}", config.model.coordinator);
    println!("   Ollama: {}", config.model.ollama_url);
    println!(
        "   Specialists registered: {}",
        system.manager().agent_ids().count()
    );

    let spinner = if args.quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Recruiting and coordinating specialists...");
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    };

    let panel_analysis = system.analyze_patient(input).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    debug!(
        "Panel cycle ended in phase {} with [{}]",
        system.manager().phase(),
        system.manager().active_agents().join(", ")
    );

    let duration = start_time.elapsed().as_secs_f64();
    let report = report::build_report(
        panel_analysis,
        &config.model.name,
        &config.model.coordinator,
        duration,
    );

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.general.output));
    report::write_report(&output, &output_path)?;

    // Print summary
    let outcome = &report.analysis.outcome;
    let summary = analysis::summarize_outcome(outcome);
    println!("\n📊 Panel Summary:");
    println!("   Classification: {}", report.analysis.patient.syndrome_type);
    for line in analysis::generate_summary_text(&summary, &report.analysis.candidates).lines() {
        println!("   {}", line);
    }
    println!("   Duration: {:.1}s", duration);

    if !outcome.is_success() {
        eprintln!("\n⛔ {} (exit code 2).", outcome.message);
        eprintln!("   Report saved to: {}", output_path.display());
        return Ok(2);
    }

    println!(
        "\n✅ Analysis complete! Report saved to: {}",
        output_path.display()
    );
    Ok(0)
}

/// Wire the inference client, the panel and optional literature lookups.
fn build_system(config: &Config, knowledge: KnowledgeBase) -> Result<PanelSystem> {
    let client: Arc<dyn InferenceClient> = Arc::new(
        OllamaClient::new(OllamaConfig {
            ollama_url: config.model.ollama_url.clone(),
            timeout_seconds: config.model.timeout_seconds,
            retries: config.model.retries,
        })
        .context("Failed to create Ollama client")?,
    );

    let coordinator = Coordinator::new(
        ModelSettings::new(
            config.model.coordinator.clone(),
            config.model.coordinator_temperature,
        ),
        client.clone(),
        vec![GENERAL_SPECIALIST.to_string()],
    );
    let mut manager = AgentManager::new(
        coordinator,
        Duration::from_secs(config.model.agent_timeout_seconds),
    );

    let defaults = ModelSettings::new(config.model.name.clone(), config.model.temperature);
    for profile in default_profiles().iter().chain(config.agents.iter()) {
        if !profile.enabled {
            if manager.unregister_agent(&profile.id).is_some() {
                info!("Specialist {} disabled by config", profile.id);
            }
            continue;
        }
        manager.register_agent(profile.id.clone(), profile.build(&defaults, client.clone()));
    }

    let mut system = PanelSystem::new(knowledge, manager);

    if config.literature.enabled {
        let entrez = EntrezClient::new(EntrezConfig {
            base_url: config.literature.base_url.clone(),
            timeout_seconds: config.literature.timeout_seconds,
            api_key: config.literature.api_key.clone(),
        })
        .context("Failed to create literature client")?;
        system = system.with_literature(Arc::new(entrez), config.literature.max_results);
    }

    Ok(system)
}

/// Handle --guideline: print one treatment guideline.
fn handle_guideline(system: &PanelSystem, id: &str) -> Result<i32> {
    let guideline = system.treatment_guideline(id).ok_or_else(|| {
        let known: Vec<&str> = system.knowledge().guideline_ids().collect();
        anyhow!(
            "No treatment guideline for '{}'. Known ids: {}",
            id,
            known.join(", ")
        )
    })?;

    print!("{}", report::generate_guideline_markdown(guideline));
    Ok(0)
}

/// Read a catalog entry for one of the --add-* commands.
fn read_entry<T: serde::de::DeserializeOwned>(
    knowledge: &KnowledgeBase,
    flag: &str,
    path: &Path,
) -> Result<T> {
    if knowledge.dir().is_none() {
        return Err(anyhow!(
            "{} needs a knowledge directory (--knowledge-dir or [knowledge] dir)",
            flag
        ));
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Handle --add-syndrome: persist one syndrome record into the knowledge directory.
fn handle_add_syndrome(mut knowledge: KnowledgeBase, path: &Path) -> Result<i32> {
    let record: SyndromeRecord = read_entry(&knowledge, "--add-syndrome", path)?;
    if record.id.trim().is_empty() {
        return Err(anyhow!("Syndrome record in {} has no id", path.display()));
    }

    let id = record.id.clone();
    let replacing = knowledge.get_syndrome(&id).is_some();
    knowledge
        .add_syndrome(&id, record)
        .with_context(|| format!("Failed to store syndrome {}", id))?;

    println!(
        "✅ {} {} ({} syndromes, {} indexed symptoms).",
        if replacing { "Replaced" } else { "Stored" },
        id,
        knowledge.syndrome_ids().count(),
        knowledge.index().len()
    );
    Ok(0)
}

/// Handle --add-guideline: persist one treatment guideline into the knowledge directory.
fn handle_add_guideline(mut knowledge: KnowledgeBase, path: &Path) -> Result<i32> {
    let guideline: TreatmentGuideline = read_entry(&knowledge, "--add-guideline", path)?;
    if guideline.condition_id.trim().is_empty() {
        return Err(anyhow!("Guideline in {} has no condition_id", path.display()));
    }

    let id = guideline.condition_id.clone();
    let steps = guideline.timeline.len();
    knowledge
        .add_guideline(&id, guideline)
        .with_context(|| format!("Failed to store guideline {}", id))?;

    println!(
        "✅ Stored guideline {} ({} timeline steps, {} guidelines).",
        id,
        steps,
        knowledge.guideline_ids().count()
    );
    Ok(0)
}

/// Handle --dry-run: print knowledge-base candidates, no model calls.
fn handle_dry_run(system: &PanelSystem, input: PatientInput) -> i32 {
    println!("\n🔍 Dry run: matching symptoms against the knowledge base (no LLM call)...\n");

    let context = input.into_context();
    let candidates = system.match_symptoms(&context.symptoms);
    println!(
        "   Knowledge base: {} syndromes, {} indexed symptoms\n",
        system.knowledge().syndrome_ids().count(),
        system.knowledge().index().len()
    );

    if candidates.is_empty() {
        println!("   No syndrome in the knowledge base shares a symptom with this patient.");
    } else {
        for m in &candidates {
            println!(
                "     🧬 {} - {}/{} symptoms ({:.1}%, {})",
                m.record.name,
                m.matched_count,
                m.total_count,
                m.match_percentage,
                m.confidence()
            );
        }
        let unexplained = analysis::unexplained_symptoms(&context, &candidates);
        if !unexplained.is_empty() {
            println!("\n   Not explained by any candidate: {}", unexplained.join(", "));
        }
    }

    println!("\n✅ Dry run complete. No LLM calls were made.");
    0
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
