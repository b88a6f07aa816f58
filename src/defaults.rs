//! Default configuration constants for narrate.
//!
//! Shared by the config layer, the voice selector and the pipeline so the
//! same values are used wherever a setting is left unspecified.

/// Base URL of the OpenAI-compatible provider.
pub const API_BASE_URL: &str = "https://api.openai.com/v1";

/// Environment variable holding the provider credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Speech synthesis model.
pub const SPEECH_MODEL: &str = "tts-1";

/// Chat model used for single-voice classification.
pub const CLASSIFIER_MODEL: &str = "gpt-4o";

/// Chat model used for structured chunk splitting.
///
/// Must support `json_schema` response formats.
pub const SPLITTER_MODEL: &str = "gpt-4o-2024-08-06";

/// Per-request timeout in seconds.
///
/// Long sections take tens of seconds to synthesize.
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Voice used for every Narrator section.
pub const NARRATOR_VOICE: &str = "ash";

/// Voice used for every Human section.
pub const HUMAN_VOICE: &str = "echo";

/// Voice used when single-voice classification returns an unknown option.
pub const DEFAULT_AI_VOICE: &str = "fable";

/// Option number used when a split response cannot be used.
///
/// Option 2 is the default AI voice in the stock option table.
pub const SPLIT_FALLBACK_OPTION: u32 = 2;

/// Maximum number of sections synthesized at the same time.
pub const CONCURRENCY_LIMIT: usize = 8;

/// Output directory read by the presentation site.
pub const OUTPUT_DIR: &str = "public/split-audio";

/// Name of the persisted duration index.
pub const DURATIONS_FILE: &str = "durations.json";

/// Scratch subdirectory for chunks awaiting stitching.
pub const SCRATCH_DIR: &str = "temp";

/// File extension of every generated audio file.
pub const AUDIO_EXTENSION: &str = "wav";

/// Backoff before the first retry of a failed synthesis call.
pub const RETRY_BACKOFF_MS: u64 = 500;

/// Size of the canonical RIFF/WAVE header written by the provider.
pub const CANONICAL_HEADER_LEN: usize = 44;

/// Token budget for the classification reply (a single number).
pub const CLASSIFY_MAX_TOKENS: u32 = 10;

/// Token budget for the structured split reply.
pub const SPLIT_MAX_TOKENS: u32 = 1000;

/// Sampling temperature for both decision requests.
pub const DECISION_TEMPERATURE: f32 = 0.3;
