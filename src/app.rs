//! Composition root for the `narrate` binary.
//!
//! Wires configuration, the provider client, the voice selector and the
//! pipeline together, and owns everything the operator sees on stdout.

use crate::cli::Cli;
use crate::config::{Config, RunMode};
use crate::error::{NarrateError, Result};
use crate::pipeline::{GenerationPipeline, PipelineConfig, RunReport};
use crate::script::Script;
use crate::synth::openai::OpenAiClient;
use crate::synth::{VoiceAdvisor, format_options};
use crate::voice::VoiceSelector;
use owo_colors::OwoColorize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Load the configuration file (or defaults) and apply environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            if !path.exists() {
                return Err(NarrateError::ConfigFileNotFound {
                    path: path.display().to_string(),
                });
            }
            Config::load(path)?
        }
        None => Config::load_or_default(&Config::default_path())?,
    };
    Ok(config.with_env_overrides())
}

/// Apply command-line overrides on top of file and environment settings.
pub fn apply_cli_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(dir) = &cli.output_dir {
        config.output.dir = dir.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        config.generation.concurrency = concurrency;
    }
    if let Some(script) = &cli.script {
        config.script.path = script.display().to_string();
    }
    if let Some(delay) = cli.request_delay {
        config.generation.request_delay_ms =
            u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    }
    if let Some(mode) = cli.command.as_ref().and_then(|c| c.run_mode()) {
        config.generation.mode = mode;
    }
    config
}

/// Run one generation pass, stopping on Ctrl+C.
///
/// # Errors
/// Invalid configuration, a missing credential, an unusable script, a setup
/// failure, or `Interrupted`.
pub async fn run_generation(config: Config) -> Result<RunReport> {
    config.validate()?;
    let api_key = config.api_key()?;

    let script = Script::load_or_embedded(config.script_path().as_deref())?;
    for warning in script.validate()? {
        warn!("{warning}");
    }

    let client = Arc::new(OpenAiClient::new(config.openai_config(api_key))?);
    let advisor: Arc<dyn VoiceAdvisor> = client.clone();
    let selector = VoiceSelector::new(config.voices.clone(), advisor);
    let pipeline = GenerationPipeline::new(
        PipelineConfig::from_config(&config),
        config.layout(),
        selector,
        client,
    );

    print_banner(&config, &script);

    tokio::select! {
        report = pipeline.run(&script.sections) => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, abandoning in-flight requests");
            Err(NarrateError::Interrupted)
        }
    }
}

fn print_banner(config: &Config, script: &Script) {
    let mode = config.generation.mode;
    info!("narrate {}", crate::version_string());
    info!("Narrator voice: {}", config.voices.narrator);
    info!("Human voice: {}", config.voices.human);
    match mode {
        RunMode::Whole => info!(
            "Artificial Mind voice: classified per section (default {})",
            config.voices.default_ai
        ),
        RunMode::Stitch | RunMode::Chunks => {
            info!("Artificial Mind voices: split across options");
        }
    }
    info!(
        "Generating {} sections into {} ({} mode, script estimate {})",
        script.len(),
        config.output.dir.display(),
        mode,
        format_ms(script.estimated_total_ms())
    );
}

/// Print the durations table and any missing sections.
pub fn print_summary(report: &RunReport) {
    println!();
    println!("{}", "Generated durations".bold());
    for (key, ms) in report.index.iter() {
        println!("  {key:>6}  {ms:>7} ms");
    }

    let total = report.index.total_ms();
    println!(
        "\n{} of {} sections, {} total",
        report.produced(),
        report.sections,
        format_ms(total)
    );
    if report.estimated_ms > 0 {
        println!("Script estimate: {}", format_ms(report.estimated_ms));
    }

    if report.is_complete() {
        println!("{}", "All sections generated".green());
    } else {
        println!(
            "{}",
            format!("{} section(s) missing:", report.missing.len()).yellow()
        );
        for missing in &report.missing {
            println!("  {:>3}  {}", missing.index, missing.reason);
        }
    }
}

/// Print fixed voices and the Artificial Mind options.
pub fn print_voices(config: &Config) {
    let voices = &config.voices;
    println!("Narrator:        {}", voices.narrator.bold());
    println!("Human:           {}", voices.human.bold());
    println!("Default (whole): {}", voices.default_ai.bold());
    println!("Fallback (split): option {}", voices.split_fallback);
    println!("\nArtificial Mind options:");
    for line in format_options(&voices.ai_options).lines() {
        println!("  {line}");
    }
}

/// `m:ss.mmm`
pub fn format_ms(ms: u64) -> String {
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{minutes}:{seconds:02}.{millis:03}")
}
