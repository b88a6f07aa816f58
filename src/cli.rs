//! Command-line interface for narrate
//!
//! Provides argument parsing using clap derive macros.

use crate::config::RunMode;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Pre-generate narration audio for the dialogue script
#[derive(Parser, Debug)]
#[command(
    name = "narrate",
    version,
    about = "Pre-generate narration audio for the dialogue script"
)]
pub struct Cli {
    /// Subcommand to execute (default: generation.mode from the config)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: per-request details, -vv: everything)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output directory (overrides output.dir)
    #[arg(long, global = true, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Sections processed per batch (overrides generation.concurrency)
    #[arg(long, short = 'j', global = true, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Dialogue script file (default: the embedded script)
    #[arg(long, global = true, value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Pause after every synthesis call. Examples: 500ms, 1s
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_delay)]
    pub request_delay: Option<Duration>,
}

/// Parse a pause duration.
///
/// Supports any duration format accepted by `humantime`; a bare number is
/// taken as milliseconds.
fn parse_delay(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → milliseconds
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// One classified voice per section, written as <index>.wav
    Whole,

    /// Split Artificial Mind sections across voices and stitch them into <index>.wav
    Stitch,

    /// Split Artificial Mind sections across voices and keep <index>/<chunk>.wav
    Chunks,

    /// Show the voice assignments
    Voices,

    /// Validate configuration, credential and script
    Check,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

impl Commands {
    /// Run mode selected by a generation subcommand.
    pub fn run_mode(&self) -> Option<RunMode> {
        match self {
            Commands::Whole => Some(RunMode::Whole),
            Commands::Stitch => Some(RunMode::Stitch),
            Commands::Chunks => Some(RunMode::Chunks),
            _ => None,
        }
    }
}
