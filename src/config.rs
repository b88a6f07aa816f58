use crate::defaults;
use crate::error::{NarrateError, Result};
use crate::pipeline::output::{OutputLayout, is_plain_name};
use crate::synth::openai::OpenAiConfig;
use crate::voice::VoiceTable;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub voices: VoiceTable,
    pub generation: GenerationConfig,
    pub output: OutputConfig,
    pub script: ScriptConfig,
}

/// Speech and decision provider settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub speech_model: String,
    pub classifier_model: String,
    pub splitter_model: String,
    pub timeout_secs: u64,
}

/// Run behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub mode: RunMode,
    /// Items processed per batch
    pub concurrency: usize,
    /// Extra attempts per synthesis call
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Pause after each synthesis call
    pub request_delay_ms: u64,
}

/// Output location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub durations_file: String,
    pub scratch_dir: String,
}

/// Script source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ScriptConfig {
    /// External script file; empty uses the embedded script
    pub path: String,
}

/// How sections are voiced and written.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// One classified voice per section, one file per section.
    Whole,
    /// Split voices, chunks stitched into one file per section.
    #[default]
    Stitch,
    /// Split voices, chunk files kept under a directory per section.
    Chunks,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Whole => write!(f, "whole"),
            RunMode::Stitch => write!(f, "stitch"),
            RunMode::Chunks => write!(f, "chunks"),
        }
    }
}

impl FromStr for RunMode {
    type Err = NarrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whole" => Ok(RunMode::Whole),
            "stitch" => Ok(RunMode::Stitch),
            "chunks" => Ok(RunMode::Chunks),
            other => Err(NarrateError::ConfigInvalidValue {
                key: "generation.mode".to_string(),
                message: format!("unknown mode '{other}' (expected whole, stitch or chunks)"),
            }),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::API_BASE_URL.to_string(),
            api_key_env: defaults::API_KEY_ENV.to_string(),
            speech_model: defaults::SPEECH_MODEL.to_string(),
            classifier_model: defaults::CLASSIFIER_MODEL.to_string(),
            splitter_model: defaults::SPLITTER_MODEL.to_string(),
            timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            concurrency: defaults::CONCURRENCY_LIMIT,
            max_retries: 0,
            retry_backoff_ms: defaults::RETRY_BACKOFF_MS,
            request_delay_ms: 0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(defaults::OUTPUT_DIR),
            durations_file: defaults::DURATIONS_FILE.to_string(),
            scratch_dir: defaults::SCRATCH_DIR.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Returns errors for invalid TOML and unreadable files.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(NarrateError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(NarrateError::Io(e)) => Err(NarrateError::ConfigParse {
                message: format!("cannot read {}: {e}", path.display()),
            }),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - NARRATE_OUTPUT_DIR → output.dir
    /// - NARRATE_CONCURRENCY → generation.concurrency
    /// - NARRATE_MODE → generation.mode
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("NARRATE_OUTPUT_DIR")
            && !dir.is_empty()
        {
            self.output.dir = PathBuf::from(dir);
        }

        if let Ok(concurrency) = std::env::var("NARRATE_CONCURRENCY")
            && !concurrency.is_empty()
        {
            match concurrency.trim().parse() {
                Ok(n) => self.generation.concurrency = n,
                Err(_) => warn!("Ignoring NARRATE_CONCURRENCY={concurrency}: not a number"),
            }
        }

        if let Ok(mode) = std::env::var("NARRATE_MODE")
            && !mode.is_empty()
        {
            match mode.parse() {
                Ok(m) => self.generation.mode = m,
                Err(e) => warn!("Ignoring NARRATE_MODE: {e}"),
            }
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/narrate/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("narrate")
            .join("config.toml")
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| -> Result<()> {
            Err(NarrateError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };

        if self.generation.concurrency == 0 {
            return invalid("generation.concurrency", "must be at least 1");
        }
        if self.voices.ai_options.is_empty() {
            return invalid("voices.ai_options", "at least one option is required");
        }

        let mut seen = HashSet::new();
        for option in &self.voices.ai_options {
            if !seen.insert(option.number) {
                return invalid(
                    "voices.ai_options",
                    &format!("option number {} is used twice", option.number),
                );
            }
            if option.voice.trim().is_empty() {
                return invalid(
                    "voices.ai_options",
                    &format!("option {} has no voice", option.number),
                );
            }
        }

        if self.voices.option_voice(self.voices.split_fallback).is_none() {
            return invalid(
                "voices.split_fallback",
                &format!("option {} does not exist", self.voices.split_fallback),
            );
        }
        for (key, value) in [
            ("voices.narrator", &self.voices.narrator),
            ("voices.human", &self.voices.human),
            ("voices.default_ai", &self.voices.default_ai),
        ] {
            if value.trim().is_empty() {
                return invalid(key, "must not be empty");
            }
        }
        if self.output.dir.as_os_str().is_empty() {
            return invalid("output.dir", "must not be empty");
        }
        for (key, value) in [
            ("output.durations_file", &self.output.durations_file),
            ("output.scratch_dir", &self.output.scratch_dir),
        ] {
            if value.trim().is_empty() {
                return invalid(key, "must not be empty");
            }
            if !is_plain_name(value) {
                return invalid(key, "must be a single name inside output.dir");
            }
        }
        Ok(())
    }

    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        let var = &self.provider.api_key_env;
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(NarrateError::MissingCredential { var: var.clone() }),
        }
    }

    /// Provider client settings with the given key.
    pub fn openai_config(&self, api_key: String) -> OpenAiConfig {
        OpenAiConfig {
            base_url: self.provider.base_url.clone(),
            api_key,
            speech_model: self.provider.speech_model.clone(),
            classifier_model: self.provider.classifier_model.clone(),
            splitter_model: self.provider.splitter_model.clone(),
            timeout: Duration::from_secs(self.provider.timeout_secs),
        }
    }

    pub fn layout(&self) -> OutputLayout {
        OutputLayout::new(
            &self.output.dir,
            &self.output.durations_file,
            &self.output.scratch_dir,
        )
    }

    /// External script file, if one is configured.
    pub fn script_path(&self) -> Option<PathBuf> {
        let path = self.script.path.trim();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::VoiceOption;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_narrate_env() {
        remove_env("NARRATE_OUTPUT_DIR");
        remove_env("NARRATE_CONCURRENCY");
        remove_env("NARRATE_MODE");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.provider.base_url, "https://api.openai.com/v1");
        assert_eq!(config.provider.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.provider.speech_model, "tts-1");
        assert_eq!(config.provider.timeout_secs, 120);

        assert_eq!(config.voices.narrator, "ash");
        assert_eq!(config.voices.human, "echo");
        assert_eq!(config.voices.default_ai, "fable");
        assert_eq!(config.voices.split_fallback, 2);
        assert_eq!(config.voices.ai_options.len(), 4);

        assert_eq!(config.generation.mode, RunMode::Stitch);
        assert_eq!(config.generation.concurrency, 8);
        assert_eq!(config.generation.max_retries, 0);

        assert_eq!(config.output.dir, PathBuf::from("public/split-audio"));
        assert_eq!(config.output.durations_file, "durations.json");
        assert_eq!(config.output.scratch_dir, "temp");
        assert_eq!(config.script_path(), None);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [provider]
            base_url = "http://localhost:8080/v1"
            api_key_env = "LOCAL_TTS_KEY"

            [voices]
            narrator = "alloy"
            split_fallback = 1

            [[voices.ai_options]]
            number = 1
            voice = "onyx"
            description = "deep"

            [generation]
            mode = "chunks"
            concurrency = 3
            max_retries = 2

            [output]
            dir = "out/audio"

            [script]
            path = "my-script.toml"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.provider.base_url, "http://localhost:8080/v1");
        assert_eq!(config.provider.api_key_env, "LOCAL_TTS_KEY");
        assert_eq!(config.provider.speech_model, "tts-1");

        assert_eq!(config.voices.narrator, "alloy");
        assert_eq!(config.voices.human, "echo");
        assert_eq!(
            config.voices.ai_options,
            vec![VoiceOption::new(1, "onyx", "deep")]
        );

        assert_eq!(config.generation.mode, RunMode::Chunks);
        assert_eq!(config.generation.concurrency, 3);
        assert_eq!(config.generation.max_retries, 2);

        assert_eq!(config.output.dir, PathBuf::from("out/audio"));
        assert_eq!(config.output.durations_file, "durations.json");
        assert_eq!(config.script_path(), Some(PathBuf::from("my-script.toml")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_mode_is_an_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[generation]\nmode = \"sometimes\"\n")
            .unwrap();

        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_run_mode_parse_and_display() {
        for mode in [RunMode::Whole, RunMode::Stitch, RunMode::Chunks] {
            assert_eq!(mode.to_string().parse::<RunMode>().unwrap(), mode);
        }
        assert_eq!(" Whole ".parse::<RunMode>().unwrap(), RunMode::Whole);
        assert!("both".parse::<RunMode>().is_err());
    }

    #[test]
    fn test_env_override_output_dir() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_narrate_env();

        set_env("NARRATE_OUTPUT_DIR", "/tmp/narration");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.output.dir, PathBuf::from("/tmp/narration"));
        assert_eq!(config.generation.concurrency, 8); // Not overridden

        clear_narrate_env();
    }

    #[test]
    fn test_env_override_all() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_narrate_env();

        set_env("NARRATE_OUTPUT_DIR", "audio");
        set_env("NARRATE_CONCURRENCY", "2");
        set_env("NARRATE_MODE", "whole");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.output.dir, PathBuf::from("audio"));
        assert_eq!(config.generation.concurrency, 2);
        assert_eq!(config.generation.mode, RunMode::Whole);

        clear_narrate_env();
    }

    #[test]
    fn test_env_override_invalid_values_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_narrate_env();

        set_env("NARRATE_CONCURRENCY", "many");
        set_env("NARRATE_MODE", "loud");
        set_env("NARRATE_OUTPUT_DIR", "");
        let config = Config::default().with_env_overrides();

        assert_eq!(config, Config::default());

        clear_narrate_env();
    }

    #[test]
    fn test_api_key_from_named_variable() {
        let _lock = ENV_LOCK.lock().unwrap();
        let mut config = Config::default();
        config.provider.api_key_env = "NARRATE_TEST_KEY_PRESENT".to_string();

        set_env("NARRATE_TEST_KEY_PRESENT", "sk-test");
        assert_eq!(config.api_key().unwrap(), "sk-test");

        set_env("NARRATE_TEST_KEY_PRESENT", "  ");
        match config.api_key() {
            Err(NarrateError::MissingCredential { var }) => {
                assert_eq!(var, "NARRATE_TEST_KEY_PRESENT")
            }
            other => panic!("expected MissingCredential, got {other:?}"),
        }

        remove_env("NARRATE_TEST_KEY_PRESENT");
        assert!(config.api_key().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut zero = Config::default();
        zero.generation.concurrency = 0;

        let mut no_options = Config::default();
        no_options.voices.ai_options.clear();

        let mut duplicate = Config::default();
        duplicate
            .voices
            .ai_options
            .push(VoiceOption::new(1, "alloy", "again"));

        let mut bad_fallback = Config::default();
        bad_fallback.voices.split_fallback = 9;

        let mut no_default = Config::default();
        no_default.voices.default_ai = String::new();

        let mut no_dir = Config::default();
        no_dir.output.dir = PathBuf::new();

        for (config, key) in [
            (zero, "generation.concurrency"),
            (no_options, "voices.ai_options"),
            (duplicate, "voices.ai_options"),
            (bad_fallback, "voices.split_fallback"),
            (no_default, "voices.default_ai"),
            (no_dir, "output.dir"),
        ] {
            match config.validate() {
                Err(NarrateError::ConfigInvalidValue { key: actual, .. }) => {
                    assert_eq!(actual, key)
                }
                other => panic!("expected {key} to be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_validate_keeps_scratch_and_index_inside_output_dir() {
        for name in [".", "..", "/", "a/b"] {
            let mut scratch = Config::default();
            scratch.output.scratch_dir = name.to_string();
            assert!(
                matches!(
                    scratch.validate(),
                    Err(NarrateError::ConfigInvalidValue { ref key, .. })
                        if key == "output.scratch_dir"
                ),
                "scratch_dir {name:?} accepted"
            );

            let mut durations = Config::default();
            durations.output.durations_file = name.to_string();
            assert!(
                matches!(
                    durations.validate(),
                    Err(NarrateError::ConfigInvalidValue { ref key, .. })
                        if key == "output.durations_file"
                ),
                "durations_file {name:?} accepted"
            );
        }
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [output
            dir = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());

        assert!(matches!(result, Err(NarrateError::Config(_))));
    }

    #[test]
    fn test_default_path_ends_with_narrate_config() {
        let path = Config::default_path();
        assert!(path.ends_with("narrate/config.toml"));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_narrate_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_errors_on_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[output\n").unwrap();

        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_layout_uses_output_section() {
        let mut config = Config::default();
        config.output.dir = PathBuf::from("/srv/audio");
        config.output.durations_file = "lengths.json".to_string();

        let layout = config.layout();
        assert_eq!(layout.durations_path(), PathBuf::from("/srv/audio/lengths.json"));
        assert_eq!(layout.section_path(0), PathBuf::from("/srv/audio/0.wav"));
    }
}
