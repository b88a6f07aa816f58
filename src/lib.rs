//! narrate - batch narration generator
//!
//! Voices a fixed dialogue script through an OpenAI-compatible speech API,
//! one WAV file per section plus a duration index for the presentation site.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
#[cfg(feature = "cli")]
pub mod diagnostics;
pub mod error;
pub mod pipeline;
pub mod script;
pub mod synth;
pub mod voice;

// Composition root - needs the CLI types
#[cfg(feature = "cli")]
pub mod app;

// Provider boundary
pub use synth::{SpeechSynthesizer, VoiceAdvisor, VoiceChunk, VoiceOption};

// Pipeline
pub use pipeline::{DurationIndex, GenerationPipeline, OutputKey, PipelineConfig, RunReport};

// Error handling
pub use error::{NarrateError, Result};

// Config
pub use config::{Config, RunMode};

// Script and voices
pub use script::{DialogueItem, Script, Speaker};
pub use voice::{VoicePlan, VoiceSelector, VoiceTable};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
